//! Baseline market and cost/performance/lifetime registries.
//!
//! The engine only sees the [`BaselineData`] trait; loading the underlying
//! archives happens upstream. [`InMemoryBaseline`] is a map-backed
//! implementation readable from JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};
use crate::keychain::KeyChain;
use crate::series::YearSeries;

/// Baseline stock and site energy of one microsegment in one year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub stock: f64,
    pub energy: f64,
}

/// Consumer-choice parameters of one microsegment.
///
/// `b1`/`b2` weight installed and operating cost in the logistic share;
/// `p`/`q` are the Bass innovation and imitation coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceParams {
    pub b1: YearSeries,
    pub b2: YearSeries,
    pub p: f64,
    pub q: f64,
}

/// Baseline technology cost, performance, and lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CplRecord {
    pub performance: YearSeries,
    pub performance_units: String,
    pub installed_cost: YearSeries,
    /// E.g. `"2013$/unit"`.
    pub cost_units: String,
    /// Baseline lifetime in years.
    pub lifetime: YearSeries,
    pub consumer_choice: ChoiceParams,
}

/// Lookup interface over baseline stock/energy and technology data.
pub trait BaselineData {
    /// Baseline stock and energy of `key` in `year`.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if the key chain or year is unknown.
    fn get_baseline(&self, key: &KeyChain, year: u32) -> PrepResult<BaselineRecord>;

    /// Cost/performance/lifetime record of the technology behind `key`.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if no record exists.
    fn get_cpl(&self, key: &KeyChain) -> PrepResult<&CplRecord>;

    /// Whether baseline data exist for `key` at all.
    fn contains(&self, key: &KeyChain) -> bool;
}

/// Map-backed registries keyed by the key chain's display form (baseline) and
/// its vintage-free CPL key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemoryBaseline {
    #[serde(default)]
    baseline: BTreeMap<String, BTreeMap<u32, BaselineRecord>>,
    #[serde(default)]
    cpl: BTreeMap<String, CplRecord>,
}

impl InMemoryBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stock and energy of `key` for each year.
    pub fn insert_series(&mut self, key: &KeyChain, years: &[u32], stock: &[f64], energy: &[f64]) {
        let entry = self.baseline.entry(key.to_string()).or_default();
        for ((y, s), e) in years.iter().zip(stock).zip(energy) {
            entry.insert(
                *y,
                BaselineRecord {
                    stock: *s,
                    energy: *e,
                },
            );
        }
    }

    pub fn insert_cpl(&mut self, key: &KeyChain, record: CplRecord) {
        self.cpl.insert(key.cpl_key(), record);
    }

    /// Parses registries from JSON.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed input.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Reads registries from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a message if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("cannot read \"{}\": {e}", path.display()))?;
        Self::from_json_str(&raw).map_err(|e| format!("invalid baseline \"{}\": {e}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.baseline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty()
    }
}

impl BaselineData for InMemoryBaseline {
    fn get_baseline(&self, key: &KeyChain, year: u32) -> PrepResult<BaselineRecord> {
        self.baseline
            .get(&key.to_string())
            .ok_or_else(|| PrepError::MissingKey(format!("baseline microsegment {key}")))?
            .get(&year)
            .copied()
            .ok_or_else(|| PrepError::MissingKey(format!("baseline year {year} for {key}")))
    }

    fn get_cpl(&self, key: &KeyChain) -> PrepResult<&CplRecord> {
        self.cpl
            .get(&key.cpl_key())
            .ok_or_else(|| PrepError::MissingKey(format!("cost/performance/lifetime for {key}")))
    }

    fn contains(&self, key: &KeyChain) -> bool {
        self.baseline.contains_key(&key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::{Segment, Vintage};

    fn key() -> KeyChain {
        KeyChain {
            segment: Segment::Primary,
            region: "AIA_CZ1".into(),
            bldg_type: "single family home".into(),
            fuel: "electricity".into(),
            end_use: "water heating".into(),
            load: None,
            technology: Some("electric WH".into()),
            vintage: Vintage::Existing,
        }
    }

    #[test]
    fn lookup_by_key_and_year() {
        let mut b = InMemoryBaseline::new();
        b.insert_series(&key(), &[2009, 2010], &[10.0, 11.0], &[15.15, 16.0]);
        let r = b.get_baseline(&key(), 2010);
        assert_eq!(r.unwrap(), BaselineRecord { stock: 11.0, energy: 16.0 });
        assert!(b.contains(&key()));
    }

    #[test]
    fn unknown_key_and_year_are_missing() {
        let mut b = InMemoryBaseline::new();
        b.insert_series(&key(), &[2009], &[10.0], &[15.15]);
        assert!(matches!(b.get_baseline(&key(), 2011), Err(PrepError::MissingKey(_))));
        let other = KeyChain {
            region: "AIA_CZ2".into(),
            ..key()
        };
        assert!(matches!(b.get_baseline(&other, 2009), Err(PrepError::MissingKey(_))));
        assert!(matches!(b.get_cpl(&other), Err(PrepError::MissingKey(_))));
    }

    #[test]
    fn parses_from_json() {
        let json = r#"{
            "baseline": {
                "('primary', 'AIA_CZ1', 'single family home', 'electricity', 'water heating', 'electric WH', 'existing')": {
                    "2009": {"stock": 10.0, "energy": 15.15}
                }
            },
            "cpl": {
                "AIA_CZ1|single family home|electricity|water heating|electric WH": {
                    "performance": {"2009": 18.0},
                    "performance_units": "EF",
                    "installed_cost": {"2009": 800.0},
                    "cost_units": "2013$/unit",
                    "lifetime": {"2009": 12.0},
                    "consumer_choice": {"b1": {"2009": -0.01}, "b2": {"2009": -0.1}, "p": 0.03, "q": 0.38}
                }
            }
        }"#;
        let b = InMemoryBaseline::from_json_str(json).unwrap();
        assert_eq!(b.get_baseline(&key(), 2009).map(|r| r.energy).unwrap(), 15.15);
        assert_eq!(
            b.get_cpl(&key()).unwrap().performance_units,
            "EF"
        );
    }
}
