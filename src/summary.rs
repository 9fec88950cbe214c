//! Post-hoc summary statistics of prepared measures and packages.

use std::fmt;

use crate::error::PrepResult;
use crate::measure::Prepared;
use crate::mseg::master::BaseEff;
use crate::params::AdoptionScheme;
use crate::series::Value;

/// Mean and 5th/95th percentiles of a possibly sampled value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stat {
    pub mean: f64,
    pub p5: f64,
    pub p95: f64,
}

impl Stat {
    /// Statistics of `v`; a point value has all three equal.
    pub fn of(v: &Value) -> Self {
        match v {
            Value::Point(x) => Self {
                mean: *x,
                p5: *x,
                p95: *x,
            },
            Value::Draws(d) => {
                let mut sorted = d.clone();
                sorted.sort_by(f64::total_cmp);
                Self {
                    mean: v.mean(),
                    p5: percentile(&sorted, 0.05),
                    p95: percentile(&sorted, 0.95),
                }
            }
        }
    }
}

/// Linearly interpolated percentile of already sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let w = rank - lo as f64;
            sorted[lo] * (1.0 - w) + sorted[hi] * w
        }
    }
}

/// Baseline, efficient, and savings statistics of one quantity in one year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub baseline: Stat,
    pub efficient: Stat,
    pub savings: Stat,
}

impl Quantity {
    fn at(be: &BaseEff, year: u32) -> PrepResult<Self> {
        let baseline = be.baseline.get(year)?;
        let efficient = be.efficient.get(year)?;
        Ok(Self {
            baseline: Stat::of(baseline),
            efficient: Stat::of(efficient),
            savings: Stat::of(&baseline.sub(efficient)?),
        })
    }
}

/// Yearly totals of one measure under one adoption scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub measure: String,
    pub scheme: AdoptionScheme,
    pub year: u32,
    pub captured_stock: Stat,
    pub energy: Quantity,
    pub carbon: Quantity,
    pub stock_cost: Quantity,
    pub energy_cost: Quantity,
    pub carbon_cost: Quantity,
}

/// Summary rows for a set of prepared measures and packages.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    /// Builds one row per item, adoption scheme, and modeled year from the
    /// total (not competed) market. Items without markets are skipped.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if a master record lacks one of its own years.
    pub fn from_prepared(items: &[&dyn Prepared]) -> PrepResult<Self> {
        let mut rows = Vec::new();
        for item in items {
            let Some(markets) = item.markets() else {
                continue;
            };
            for (&scheme, set) in markets {
                let m = &set.master_mseg;
                for year in m.years() {
                    rows.push(SummaryRow {
                        measure: item.name().to_string(),
                        scheme,
                        year,
                        captured_stock: Stat::of(m.stock.total.measure.get(year)?),
                        energy: Quantity::at(&m.energy.total, year)?,
                        carbon: Quantity::at(&m.carbon.total, year)?,
                        stock_cost: Quantity::at(&m.cost.stock.total, year)?,
                        energy_cost: Quantity::at(&m.cost.energy.total, year)?,
                        carbon_cost: Quantity::at(&m.cost.carbon.total, year)?,
                    });
                }
            }
        }
        Ok(Self { rows })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Measure Summary ---")?;
        writeln!(
            f,
            "{:<32} {:<24} {:>6} {:>14} {:>14} {:>14}",
            "measure", "scheme", "year", "energy saved", "carbon saved", "cost saved"
        )?;
        for r in &self.rows {
            let cost_saved = r.energy_cost.savings.mean + r.carbon_cost.savings.mean;
            writeln!(
                f,
                "{:<32} {:<24} {:>6} {:>14.3} {:>14.3} {:>14.2}",
                r.measure,
                r.scheme.as_str(),
                r.year,
                r.energy.savings.mean,
                r.carbon.savings.mean,
                cost_saved
            )?;
        }
        write!(f, "Rows: {}", self.rows.len())
    }
}
