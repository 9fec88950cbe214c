//! Cost-unit conversion between a measure's cost basis and the baseline's.

use std::collections::BTreeMap;

use crate::config::ConversionEntry;
use crate::error::{PrepError, PrepResult};
use crate::keychain::{KeyChain, Sector};
use crate::params::GlobalParams;
use crate::series::Value;

/// Converts installed costs into a target cost basis.
pub trait CostConverter {
    /// Converts `cost` (in `cost_units`) into `target_units` for `key`.
    ///
    /// Returns the converted cost and the units it is now expressed in.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` when no conversion factor or price index applies,
    /// and `Validation` when either unit string is malformed.
    fn convert_costs(
        &self,
        sector: Sector,
        key: &KeyChain,
        cost: &Value,
        cost_units: &str,
        target_units: &str,
    ) -> PrepResult<(Value, String)>;
}

/// Splits `"2013$/unit"` into `(2013, "unit")`.
pub fn parse_cost_units(units: &str) -> Option<(u32, &str)> {
    let (year, basis) = units.split_once("$/")?;
    let year = year.trim().parse().ok()?;
    let basis = basis.trim();
    if basis.is_empty() {
        None
    } else {
        Some((year, basis))
    }
}

/// Converter backed by the parameter store's conversion table and CPI series.
///
/// Cost-year differences are adjusted by `cpi[target] / cpi[source]`; basis
/// differences use the most specific matching table entry (building type and
/// technology, then building type, then technology, then unrestricted).
#[derive(Debug, Clone, Copy)]
pub struct TableCostConverter<'a> {
    entries: &'a [ConversionEntry],
    cpi: &'a BTreeMap<u32, f64>,
}

impl<'a> TableCostConverter<'a> {
    pub fn new(params: &'a GlobalParams) -> Self {
        Self {
            entries: &params.cost_conversion,
            cpi: &params.cpi,
        }
    }

    fn basis_factor(&self, sector: Sector, key: &KeyChain, from: &str, to: &str) -> PrepResult<f64> {
        if from == to {
            return Ok(1.0);
        }
        let sector_token = format!("all {}", sector.as_str());
        self.entries
            .iter()
            .filter(|e| e.from == from && e.to == to)
            .filter_map(|e| {
                let bldg = match e.bldg_type.as_deref() {
                    None => 0,
                    Some(b) if b == key.bldg_type => 2,
                    Some(b) if b == sector_token => 1,
                    Some(_) => return None,
                };
                let tech = match (e.technology.as_deref(), key.technology.as_deref()) {
                    (None, _) => 0,
                    (Some(t), Some(k)) if t == k => 3,
                    _ => return None,
                };
                Some((bldg + tech, e.factor))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, factor)| factor)
            .ok_or_else(|| {
                PrepError::MissingKey(format!("cost conversion \"{from}\" -> \"{to}\" for {key}"))
            })
    }

    fn year_factor(&self, from: u32, to: u32) -> PrepResult<f64> {
        if from == to {
            return Ok(1.0);
        }
        let index = |y: u32| {
            self.cpi
                .get(&y)
                .copied()
                .ok_or_else(|| PrepError::MissingKey(format!("consumer price index for {y}")))
        };
        Ok(index(to)? / index(from)?)
    }
}

impl CostConverter for TableCostConverter<'_> {
    fn convert_costs(
        &self,
        sector: Sector,
        key: &KeyChain,
        cost: &Value,
        cost_units: &str,
        target_units: &str,
    ) -> PrepResult<(Value, String)> {
        let malformed = |u: &str| {
            PrepError::validation(
                &key.to_string(),
                format!("cost units \"{u}\" are not of the form \"<year>$/<basis>\""),
            )
        };
        let (from_year, from_basis) = parse_cost_units(cost_units).ok_or_else(|| malformed(cost_units))?;
        let (to_year, to_basis) =
            parse_cost_units(target_units).ok_or_else(|| malformed(target_units))?;

        let factor =
            self.basis_factor(sector, key, from_basis, to_basis)? * self.year_factor(from_year, to_year)?;
        Ok((cost.scale(factor), target_units.to_string()))
    }
}
