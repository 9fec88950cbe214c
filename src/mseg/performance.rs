//! Relative performance of a measure against its baseline technology.
//!
//! Relative performance is the ratio of measure to baseline energy use for the
//! same service: `0.72` means the measure uses 72% of the baseline energy.

use crate::error::{PrepError, PrepResult};
use crate::series::{Value, YearSeries};

/// Units where a larger number means a more efficient product.
const HIGHER_IS_BETTER: &[&str] = &[
    "EF", "UEF", "CEF", "COP", "AFUE", "SEER", "HSPF", "EER", "IEER", "TE", "lm/W", "R Value",
];

pub const RELATIVE_CONSTANT: &str = "relative savings (constant)";
pub const RELATIVE_DYNAMIC: &str = "relative savings (dynamic)";

/// How a measure's efficiency input is expressed.
#[derive(Debug, Clone, PartialEq)]
pub enum PerfKind {
    /// Absolute level in the named units.
    Absolute(String),
    /// Fractional savings against the baseline of every year.
    RelativeConstant,
    /// Fractional savings against the baseline of a reference year.
    RelativeDynamic,
}

impl PerfKind {
    pub fn parse(units: &str) -> Self {
        match units.trim() {
            RELATIVE_CONSTANT => PerfKind::RelativeConstant,
            RELATIVE_DYNAMIC => PerfKind::RelativeDynamic,
            other => PerfKind::Absolute(other.to_string()),
        }
    }
}

fn higher_is_better(units: &str) -> bool {
    HIGHER_IS_BETTER
        .iter()
        .any(|u| units.trim().eq_ignore_ascii_case(u))
}

/// Year-by-year relative performance of a measure.
///
/// # Errors
///
/// Returns `Validation` naming `measure` when absolute units differ from the
/// baseline's or a dynamic measure lacks a reference year, and `MissingKey`
/// when the reference year is outside the baseline performance series.
pub fn relative_performance(
    measure: &str,
    meas_perf: &Value,
    meas_units: &str,
    base_perf: &YearSeries,
    base_units: &str,
    ref_year: Option<u32>,
) -> PrepResult<YearSeries> {
    let higher = higher_is_better(base_units);
    match PerfKind::parse(meas_units) {
        PerfKind::Absolute(units) => {
            if units != base_units.trim() {
                return Err(PrepError::validation(
                    measure,
                    format!("efficiency units \"{units}\" do not match baseline units \"{base_units}\""),
                ));
            }
            let mut out = YearSeries::new();
            for (y, base) in base_perf.iter() {
                let rp = if higher {
                    base.div_or_zero(meas_perf)?
                } else {
                    meas_perf.div_or_zero(base)?
                };
                out.insert(y, rp);
            }
            Ok(out)
        }
        PerfKind::RelativeConstant => {
            let rp = meas_perf.map(|s| 1.0 - s);
            Ok(base_perf.map(|_| rp.clone()))
        }
        PerfKind::RelativeDynamic => {
            let ref_year = ref_year.ok_or_else(|| {
                PrepError::validation(measure, "dynamic relative savings need energy_efficiency_ref_year")
            })?;
            let base_ref = base_perf.get(ref_year)?.clone();
            let mut out = YearSeries::new();
            for (y, base) in base_perf.iter() {
                let ratio = if higher {
                    base.div_or_zero(&base_ref)?
                } else {
                    base_ref.div_or_zero(base)?
                };
                let rp = meas_perf.zip_with(&ratio, |s, r| ((1.0 - s) * r).min(1.0))?;
                out.insert(y, rp);
            }
            Ok(out)
        }
    }
}
