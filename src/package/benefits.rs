//! Package synergy benefits.

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};
use crate::mseg::arith::Combine;
use crate::mseg::master::{BaseEff, CostBlock, MasterMseg, Split};

/// Additional savings and cost reduction gained by packaging measures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Benefits {
    /// Fraction of the remaining baseline-to-efficient gap saved on top.
    #[serde(rename = "energy savings increase", default)]
    pub energy_savings_increase: f64,
    /// Fraction by which efficient installed cost drops.
    #[serde(rename = "cost reduction", default)]
    pub cost_reduction: f64,
}

impl Benefits {
    pub fn is_none(&self) -> bool {
        self.energy_savings_increase == 0.0 && self.cost_reduction == 0.0
    }

    /// # Errors
    ///
    /// Returns `Validation` naming `package` if the energy savings increase is
    /// negative or the cost reduction lies outside [0, 1].
    pub fn validate(&self, package: &str) -> PrepResult<()> {
        let esi = self.energy_savings_increase;
        if esi.is_nan() || esi < 0.0 {
            return Err(PrepError::validation(
                package,
                format!("energy savings increase {} is negative", self.energy_savings_increase),
            ));
        }
        if !(0.0..=1.0).contains(&self.cost_reduction) {
            return Err(PrepError::validation(
                package,
                format!("cost reduction {} is outside [0, 1]", self.cost_reduction),
            ));
        }
        Ok(())
    }
}

fn boost(be: &BaseEff, increase: f64) -> PrepResult<BaseEff> {
    let efficient = be.efficient.zip_with(&be.baseline, |eff, base| {
        eff.zip_with(base, |e, b| (e - (b - e) * increase).max(0.0))
    })?;
    Ok(BaseEff {
        baseline: be.baseline.clone(),
        efficient,
    })
}

/// Applies package benefits to a master-microsegment-shaped record.
///
/// Efficient energy, carbon, and their costs move further from baseline by
/// `energy_savings_increase` times the existing gap, never below zero.
/// Efficient stock cost scales by `1 - cost_reduction`. Stock is unchanged.
///
/// # Errors
///
/// Returns `StructureMismatch` if a baseline/efficient pair is misaligned.
pub fn apply_pkg_benefits(mseg: &MasterMseg, benefits: &Benefits) -> PrepResult<MasterMseg> {
    let increase = benefits.energy_savings_increase;
    let boosted = |s: &Split<BaseEff>| s.try_map(|be| boost(be, increase));
    let stock_cost = mseg.cost.stock.try_map(|be| {
        Ok(BaseEff {
            baseline: be.baseline.clone(),
            efficient: be.efficient.scale_keyvals(1.0 - benefits.cost_reduction),
        })
    })?;
    Ok(MasterMseg {
        stock: mseg.stock.clone(),
        energy: boosted(&mseg.energy)?,
        carbon: boosted(&mseg.carbon)?,
        cost: CostBlock {
            stock: stock_cost,
            energy: boosted(&mseg.cost.energy)?,
            carbon: boosted(&mseg.cost.carbon)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::YearSeries;

    const YEARS: [u32; 1] = [2009];

    fn record(base: f64, eff: f64, cost: f64) -> MasterMseg {
        let mut m = MasterMseg::zeros(&YEARS);
        let be = BaseEff {
            baseline: YearSeries::constant(&YEARS, base),
            efficient: YearSeries::constant(&YEARS, eff),
        };
        m.energy = Split {
            total: be.clone(),
            competed: be.clone(),
        };
        m.carbon = m.energy.clone();
        m.cost.stock.total.baseline = YearSeries::constant(&YEARS, cost);
        m.cost.stock.total.efficient = YearSeries::constant(&YEARS, cost * 1.5);
        m.stock.total.all = YearSeries::constant(&YEARS, 10.0);
        m
    }

    fn eff(m: &MasterMseg) -> f64 {
        m.energy.total.efficient.point(2009).unwrap()
    }

    #[test]
    fn savings_increase_widens_gap() {
        let b = Benefits {
            energy_savings_increase: 0.3,
            cost_reduction: 0.0,
        };
        let out = apply_pkg_benefits(&record(80.0, 48.0, 100.0), &b).unwrap();
        assert!((eff(&out) - 38.4).abs() < 1e-9);
        assert!((out.energy.competed.efficient.point(2009).unwrap() - 38.4).abs() < 1e-9);
        assert_eq!(out.stock, record(80.0, 48.0, 100.0).stock);
    }

    #[test]
    fn efficient_energy_clamps_at_zero() {
        for esi in [0.5, 0.75, 1.0] {
            let b = Benefits {
                energy_savings_increase: esi,
                cost_reduction: 0.0,
            };
            // gap 80 x esi >= efficient 20
            let out = apply_pkg_benefits(&record(100.0, 20.0, 1.0), &b).unwrap();
            assert_eq!(eff(&out), 0.0);
            assert_eq!(out.carbon.total.efficient.point(2009).unwrap(), 0.0);
        }
    }

    #[test]
    fn cost_reduction_is_linear() {
        let input = record(80.0, 48.0, 100.0);
        let none = Benefits::default();
        let same = apply_pkg_benefits(&input, &none).unwrap();
        assert_eq!(same.cost.stock, input.cost.stock);

        let full = Benefits {
            energy_savings_increase: 0.0,
            cost_reduction: 1.0,
        };
        let zeroed = apply_pkg_benefits(&input, &full).unwrap();
        assert_eq!(zeroed.cost.stock.total.efficient.point(2009).unwrap(), 0.0);
        assert_eq!(zeroed.cost.stock.total.baseline, input.cost.stock.total.baseline);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let bad = Benefits {
            energy_savings_increase: 0.1,
            cost_reduction: 1.2,
        };
        assert!(matches!(bad.validate("pkg"), Err(PrepError::Validation { .. })));
        assert!(Benefits::default().validate("pkg").is_ok());
    }

    #[test]
    fn parses_spaced_field_names() {
        let b: Benefits =
            serde_json::from_str(r#"{"energy savings increase": 0.3, "cost reduction": 0.1}"#).unwrap();
        assert_eq!(
            b,
            Benefits {
                energy_savings_increase: 0.3,
                cost_reduction: 0.1
            }
        );
    }
}
