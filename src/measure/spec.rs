//! Measure definitions as read from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::distribution::NumInput;
use crate::keychain::{KeyChain, Load};

/// A single token or a list of tokens (`"all"`, `"all residential"`,
/// `["AIA_CZ1", "AIA_CZ2"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrSpec {
    One(String),
    Many(Vec<String>),
}

impl AttrSpec {
    pub fn all() -> Self {
        AttrSpec::One("all".to_string())
    }

    pub fn items(&self) -> Vec<&str> {
        match self {
            AttrSpec::One(s) => vec![s.as_str()],
            AttrSpec::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// A value given once or keyed by category (building type, end use,
/// technology, ...), possibly nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category<T> {
    Leaf(T),
    Keyed(BTreeMap<String, Category<T>>),
}

impl<T> Category<T> {
    /// Value applying to `key`.
    ///
    /// At each keyed level the first key-chain component found among the keys
    /// selects the branch (region, building type, vintage, fuel, end use,
    /// load, technology); an `"all"` entry is the fallback.
    pub fn resolve(&self, key: &KeyChain) -> Option<&T> {
        match self {
            Category::Leaf(v) => Some(v),
            Category::Keyed(map) => {
                let components = [
                    Some(key.region.as_str()),
                    Some(key.bldg_type.as_str()),
                    Some(key.vintage.as_str()),
                    Some(key.fuel.as_str()),
                    Some(key.end_use.as_str()),
                    key.load.map(Load::as_str),
                    key.technology.as_deref(),
                ];
                components
                    .into_iter()
                    .flatten()
                    .find_map(|c| map.get(c))
                    .or_else(|| map.get("all"))?
                    .resolve(key)
            }
        }
    }

    /// Maps every leaf, stopping at the first error.
    pub fn try_map<U, E>(&self, f: &mut impl FnMut(&T) -> Result<U, E>) -> Result<Category<U>, E> {
        match self {
            Category::Leaf(v) => f(v).map(Category::Leaf),
            Category::Keyed(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.try_map(f)?);
                }
                Ok(Category::Keyed(out))
            }
        }
    }
}

impl<T: Clone> Category<T> {
    /// Re-keys shorthand keys onto the concrete values they stand for.
    ///
    /// Every concrete key produced by `expand` shares the original sub-record;
    /// keys written out explicitly take precedence over expanded ones.
    pub fn rekey(&self, expand: &impl Fn(&str) -> Vec<String>) -> Self {
        match self {
            Category::Leaf(_) => self.clone(),
            Category::Keyed(map) => {
                let mut out: BTreeMap<String, Category<T>> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.rekey(expand)))
                    .collect();
                for (k, v) in map {
                    for concrete in expand(k) {
                        if !map.contains_key(&concrete) {
                            out.entry(concrete).or_insert_with(|| v.rekey(expand));
                        }
                    }
                }
                Category::Keyed(out)
            }
        }
    }
}

/// Sub-market scaling fraction: one value or values keyed by key chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalingFractions {
    Uniform(f64),
    ByKeyChain(BTreeMap<String, f64>),
}

impl ScalingFractions {
    /// Fraction for `key`; key chains not listed are unscaled.
    pub fn fraction(&self, key: &KeyChain) -> f64 {
        match self {
            ScalingFractions::Uniform(f) => *f,
            ScalingFractions::ByKeyChain(map) => map.get(&key.to_string()).copied().unwrap_or(1.0),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        match self {
            ScalingFractions::Uniform(f) => vec![*f],
            ScalingFractions::ByKeyChain(map) => map.values().copied().collect(),
        }
    }
}

/// Attribution of a sub-market scaling fraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalingSource {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fraction_derivation: Option<String>,
}

/// One efficiency measure as defined by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasureSpec {
    pub name: String,
    pub climate_zone: AttrSpec,
    pub bldg_type: AttrSpec,
    #[serde(default = "AttrSpec::all")]
    pub structure_type: AttrSpec,
    pub fuel_type: AttrSpec,
    pub end_use: AttrSpec,
    /// Side of split-load end uses the measure acts on.
    #[serde(default = "default_technology_type")]
    pub technology_type: Load,
    #[serde(default = "AttrSpec::all")]
    pub technology: AttrSpec,
    #[serde(default)]
    pub market_entry_year: Option<u32>,
    #[serde(default)]
    pub market_exit_year: Option<u32>,
    pub installed_cost: Category<NumInput>,
    /// E.g. `"2014$/unit"`.
    pub cost_units: Category<String>,
    pub energy_efficiency: Category<NumInput>,
    pub energy_efficiency_units: Category<String>,
    #[serde(default)]
    pub energy_efficiency_ref_year: Option<u32>,
    /// Years.
    pub product_lifetime: Category<NumInput>,
    #[serde(default)]
    pub market_scaling_fractions: Option<ScalingFractions>,
    #[serde(default)]
    pub market_scaling_fractions_source: Option<ScalingSource>,
    /// End use -> relative savings on that coupled load.
    #[serde(default)]
    pub secondary_savings: BTreeMap<String, f64>,
}

fn default_technology_type() -> Load {
    Load::Supply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::{Segment, Vintage};

    fn key(bldg: &str, tech: &str) -> KeyChain {
        KeyChain {
            segment: Segment::Primary,
            region: "AIA_CZ2".into(),
            bldg_type: bldg.into(),
            fuel: "electricity".into(),
            end_use: "water heating".into(),
            load: None,
            technology: Some(tech.into()),
            vintage: Vintage::Existing,
        }
    }

    #[test]
    fn parses_minimal_spec() {
        let json = r#"{
            "name": "Best WH",
            "climate_zone": "all",
            "bldg_type": ["single family home"],
            "fuel_type": "electricity",
            "end_use": "water heating",
            "technology": "electric WH",
            "installed_cost": 1000,
            "cost_units": "2013$/unit",
            "energy_efficiency": ["normal", 25, 1.5],
            "energy_efficiency_units": "EF",
            "product_lifetime": {"single family home": 15, "all": 12}
        }"#;
        let spec: MeasureSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.structure_type, AttrSpec::all());
        assert_eq!(
            spec.energy_efficiency,
            Category::Leaf(NumInput::TwoParam("normal".into(), 25.0, 1.5))
        );
    }

    #[test]
    fn resolve_walks_nested_categories() {
        let c: Category<f64> = serde_json::from_str(
            r#"{"single family home": {"electric WH": 1.0, "all": 2.0}, "all": 3.0}"#,
        )
        .unwrap();
        assert_eq!(c.resolve(&key("single family home", "electric WH")), Some(&1.0));
        assert_eq!(c.resolve(&key("single family home", "solar WH")), Some(&2.0));
        assert_eq!(c.resolve(&key("mobile home", "solar WH")), Some(&3.0));
    }

    #[test]
    fn rekey_fans_out_without_overriding_explicit_keys() {
        let c = Category::Keyed(BTreeMap::from([
            ("all residential".to_string(), Category::Leaf(5.0)),
            ("mobile home".to_string(), Category::Leaf(9.0)),
        ]));
        let expand = |k: &str| {
            if k == "all residential" {
                vec!["single family home".to_string(), "mobile home".to_string()]
            } else {
                Vec::new()
            }
        };
        let r = c.rekey(&expand);
        assert_eq!(r.resolve(&key("single family home", "electric WH")), Some(&5.0));
        assert_eq!(r.resolve(&key("mobile home", "electric WH")), Some(&9.0));
    }

    #[test]
    fn scaling_fraction_lookup() {
        let k = key("single family home", "electric WH");
        let f = ScalingFractions::ByKeyChain(BTreeMap::from([(k.to_string(), 0.4)]));
        assert_eq!(f.fraction(&k), 0.4);
        assert_eq!(f.fraction(&key("mobile home", "electric WH")), 1.0);
    }
}
