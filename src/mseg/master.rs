//! Typed master microsegment: stock, energy, carbon, and cost under baseline
//! and efficient assumptions, each split into total and competed markets.

use serde::Serialize;

use crate::error::PrepResult;
use crate::mseg::arith::Combine;
use crate::series::{Value, YearSeries};

macro_rules! impl_combine {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl Combine for $ty {
            fn zip_values(
                &self,
                other: &Self,
                f: &dyn Fn(&Value, &Value) -> PrepResult<Value>,
            ) -> PrepResult<Self> {
                Ok(Self {
                    $($field: self.$field.zip_values(&other.$field, f)?,)+
                })
            }

            fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> Self {
                Self {
                    $($field: self.$field.map_values(f),)+
                }
            }
        }
    };
}

/// Stock of every unit vs. units captured by the measure.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AllMeasure {
    pub all: YearSeries,
    pub measure: YearSeries,
}

/// Baseline vs. efficient case.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BaseEff {
    pub baseline: YearSeries,
    pub efficient: YearSeries,
}

impl BaseEff {
    /// Baseline minus efficient.
    pub fn savings(&self) -> PrepResult<YearSeries> {
        self.baseline.sub_keyvals(&self.efficient)
    }
}

/// Whole market vs. the part that reaches a replacement decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Split<T> {
    pub total: T,
    pub competed: T,
}

impl<T: Combine> Combine for Split<T> {
    fn zip_values(
        &self,
        other: &Self,
        f: &dyn Fn(&Value, &Value) -> PrepResult<Value>,
    ) -> PrepResult<Self> {
        Ok(Self {
            total: self.total.zip_values(&other.total, f)?,
            competed: self.competed.zip_values(&other.competed, f)?,
        })
    }

    fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> Self {
        Self {
            total: self.total.map_values(f),
            competed: self.competed.map_values(f),
        }
    }
}

impl<T> Split<T> {
    /// Applies `f` to both halves.
    pub fn try_map<U>(&self, f: impl Fn(&T) -> PrepResult<U>) -> PrepResult<Split<U>> {
        Ok(Split {
            total: f(&self.total)?,
            competed: f(&self.competed)?,
        })
    }
}

/// Installed (stock), energy, and carbon costs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CostBlock {
    pub stock: Split<BaseEff>,
    pub energy: Split<BaseEff>,
    pub carbon: Split<BaseEff>,
}

/// Aggregate market record of one measure (or one key chain of it).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MasterMseg {
    pub stock: Split<AllMeasure>,
    pub energy: Split<BaseEff>,
    pub carbon: Split<BaseEff>,
    pub cost: CostBlock,
}

impl_combine!(AllMeasure { all, measure });
impl_combine!(BaseEff { baseline, efficient });
impl_combine!(CostBlock { stock, energy, carbon });
impl_combine!(MasterMseg { stock, energy, carbon, cost });

impl MasterMseg {
    /// All-zero record over `years`, the identity for [`Combine::add_keyvals`].
    pub fn zeros(years: &[u32]) -> Self {
        let z = YearSeries::zeros(years);
        let be = || BaseEff {
            baseline: z.clone(),
            efficient: z.clone(),
        };
        let split_be = || Split {
            total: be(),
            competed: be(),
        };
        let am = || AllMeasure {
            all: z.clone(),
            measure: z.clone(),
        };
        Self {
            stock: Split {
                total: am(),
                competed: am(),
            },
            energy: split_be(),
            carbon: split_be(),
            cost: CostBlock {
                stock: split_be(),
                energy: split_be(),
                carbon: split_be(),
            },
        }
    }

    pub fn years(&self) -> Vec<u32> {
        self.stock.total.all.years().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepError;

    const YEARS: [u32; 2] = [2009, 2010];

    fn filled(v: f64) -> MasterMseg {
        MasterMseg::zeros(&YEARS).map_values(&|x| x.add(&Value::Point(v)).unwrap())
    }

    #[test]
    fn zeros_is_additive_identity() {
        let a = filled(2.5);
        let sum = a.add_keyvals(&MasterMseg::zeros(&YEARS));
        assert_eq!(sum.unwrap(), a);
    }

    #[test]
    fn add_and_sub_are_leafwise() {
        let a = filled(3.0);
        let b = filled(1.0);
        let sum = a.add_keyvals(&b).unwrap();
        assert_eq!(sum, filled(4.0));
        assert_eq!(sum.sub_keyvals(&b).unwrap(), a);
    }

    #[test]
    fn mismatched_years_propagate() {
        let a = filled(1.0);
        let b = MasterMseg::zeros(&[2009]);
        assert!(matches!(a.add_keyvals(&b), Err(PrepError::StructureMismatch(_))));
    }

    #[test]
    fn serializes_nested_field_names() {
        let json = serde_json::to_value(MasterMseg::zeros(&[2009])).unwrap();
        assert_eq!(json["stock"]["total"]["measure"]["2009"], 0.0);
        assert_eq!(json["cost"]["carbon"]["competed"]["efficient"]["2009"], 0.0);
    }

    #[test]
    fn savings_is_baseline_minus_efficient() {
        let be = BaseEff {
            baseline: YearSeries::constant(&YEARS, 80.0),
            efficient: YearSeries::constant(&YEARS, 48.0),
        };
        assert_eq!(be.savings().unwrap(), YearSeries::constant(&YEARS, 32.0));
    }
}
