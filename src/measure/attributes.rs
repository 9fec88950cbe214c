//! Expansion of measure applicability shorthand into concrete, validated
//! attribute sets, and enumeration of the key chains they cover.

use serde::Serialize;

use crate::error::{PrepError, PrepResult};
use crate::keychain::{KeyChain, Load, Segment, Sector, Vintage};
use crate::measure::spec::MeasureSpec;
use crate::params::Registry;

/// Fully expanded applicability of a measure.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Attributes {
    pub climate_zone: Vec<String>,
    pub bldg_type: Vec<String>,
    pub structure_type: Vec<Vintage>,
    pub fuel_type: Vec<String>,
    pub end_use: Vec<String>,
    pub technology: Vec<String>,
    pub technology_type: Option<Load>,
}

impl Attributes {
    /// Adds every value of `other` not already present.
    pub fn union_with(&mut self, other: &Attributes) {
        fn merge<T: Clone + PartialEq>(into: &mut Vec<T>, from: &[T]) {
            for v in from {
                if !into.contains(v) {
                    into.push(v.clone());
                }
            }
        }
        merge(&mut self.climate_zone, &other.climate_zone);
        merge(&mut self.bldg_type, &other.bldg_type);
        merge(&mut self.structure_type, &other.structure_type);
        merge(&mut self.fuel_type, &other.fuel_type);
        merge(&mut self.end_use, &other.end_use);
        merge(&mut self.technology, &other.technology);
        if self.technology_type != other.technology_type {
            self.technology_type = None;
        }
    }
}

fn push_unique(out: &mut Vec<String>, v: impl Into<String>) {
    let v = v.into();
    if !out.contains(&v) {
        out.push(v);
    }
}

/// Expands `spec` against `registry`.
///
/// # Errors
///
/// Returns `Validation` naming the measure for any value not in the registry.
pub fn normalize(spec: &MeasureSpec, registry: &Registry) -> PrepResult<Attributes> {
    let name = spec.name.as_str();
    let unknown = |field: &str, v: &str| PrepError::validation(name, format!("unknown {field} \"{v}\""));

    let mut climate_zone = Vec::new();
    for item in spec.climate_zone.items() {
        if item == "all" {
            registry.regions.iter().for_each(|r| push_unique(&mut climate_zone, r));
        } else if registry.regions.iter().any(|r| r == item) {
            push_unique(&mut climate_zone, item);
        } else {
            return Err(unknown("climate zone", item));
        }
    }

    let mut bldg_type = Vec::new();
    for item in spec.bldg_type.items() {
        let expanded = match item {
            "all" => registry.bldg_types(None),
            "all residential" => registry.bldg_types(Some(Sector::Residential)),
            "all commercial" => registry.bldg_types(Some(Sector::Commercial)),
            b if registry.sector_of(b).is_some() => vec![b.to_string()],
            b => return Err(unknown("building type", b)),
        };
        expanded.into_iter().for_each(|b| push_unique(&mut bldg_type, b));
    }

    let mut structure_type = Vec::new();
    for item in spec.structure_type.items() {
        let expanded = match item {
            "all" => Vintage::ALL.to_vec(),
            s => vec![Vintage::parse(s).ok_or_else(|| unknown("structure type", s))?],
        };
        for v in expanded {
            if !structure_type.contains(&v) {
                structure_type.push(v);
            }
        }
    }

    let mut fuel_type = Vec::new();
    for item in spec.fuel_type.items() {
        if item == "all" {
            registry.fuels().into_iter().for_each(|f| push_unique(&mut fuel_type, f));
        } else if registry.fuels().iter().any(|f| f == item) {
            push_unique(&mut fuel_type, item);
        } else {
            return Err(unknown("fuel type", item));
        }
    }

    let mut end_use = Vec::new();
    for item in spec.end_use.items() {
        if item == "all" {
            for f in &fuel_type {
                registry.end_uses_for(f).iter().for_each(|e| push_unique(&mut end_use, e));
            }
        } else if registry.all_end_uses().contains(item) {
            push_unique(&mut end_use, item);
        } else {
            return Err(unknown("end use", item));
        }
    }

    let mut technology = Vec::new();
    for item in spec.technology.items() {
        if item == "all" {
            for t in registry.all_technologies() {
                if registry.technology_declared_for(&t, &fuel_type, &end_use) {
                    push_unique(&mut technology, t);
                }
            }
        } else if let Some(eu) = item.strip_prefix("all ").filter(|eu| registry.all_end_uses().contains(*eu)) {
            registry
                .technologies_for_end_use(eu)
                .into_iter()
                .for_each(|t| push_unique(&mut technology, t));
        } else if registry.all_technologies().contains(item) {
            push_unique(&mut technology, item);
        } else {
            return Err(unknown("technology", item));
        }
    }

    Ok(Attributes {
        climate_zone,
        bldg_type,
        structure_type,
        fuel_type,
        end_use,
        technology,
        technology_type: Some(spec.technology_type),
    })
}

/// Expansion of category-map shorthand keys onto concrete registry values.
pub fn expand_category_key(registry: &Registry, key: &str) -> Vec<String> {
    match key {
        "all residential" => registry.bldg_types(Some(Sector::Residential)),
        "all commercial" => registry.bldg_types(Some(Sector::Commercial)),
        k => match k.strip_prefix("all ") {
            Some(eu) if registry.all_end_uses().contains(eu) => {
                registry.technologies_for_end_use(eu).into_iter().collect()
            }
            _ => Vec::new(),
        },
    }
}

/// Checks that every declared end use, technology, and coupled end use
/// exists for the declared fuels.
///
/// # Errors
///
/// Returns `Validation` naming the measure for the first inconsistency.
pub fn check_mkt_inputs(spec: &MeasureSpec, attrs: &Attributes, registry: &Registry) -> PrepResult<()> {
    let name = spec.name.as_str();
    for eu in &attrs.end_use {
        if !attrs.fuel_type.iter().any(|f| registry.end_uses_for(f).contains(eu)) {
            return Err(PrepError::validation(
                name,
                format!("end use \"{eu}\" does not exist for fuel(s) {:?}", attrs.fuel_type),
            ));
        }
    }
    for t in &attrs.technology {
        if !registry.technology_declared_for(t, &attrs.fuel_type, &attrs.end_use) {
            return Err(PrepError::validation(
                name,
                format!(
                    "technology \"{t}\" does not exist for fuel(s) {:?} and end use(s) {:?}",
                    attrs.fuel_type, attrs.end_use
                ),
            ));
        }
    }
    for eu in spec.secondary_savings.keys() {
        if !registry.all_end_uses().contains(eu) {
            return Err(PrepError::validation(name, format!("unknown secondary end use \"{eu}\"")));
        }
    }
    if let (Some(entry), Some(exit)) = (spec.market_entry_year, spec.market_exit_year) {
        if exit <= entry {
            return Err(PrepError::validation(
                name,
                format!("market exit year {exit} is not after entry year {entry}"),
            ));
        }
    }
    if let Some(fracs) = &spec.market_scaling_fractions {
        if fracs.values().iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(PrepError::validation(name, "market scaling fractions must lie in [0, 1]"));
        }
    }
    Ok(())
}

/// Primary key chains covered by `attrs`, in a stable order.
pub fn primary_keychains(attrs: &Attributes, registry: &Registry) -> Vec<KeyChain> {
    let mut out = Vec::new();
    for region in &attrs.climate_zone {
        for bldg in &attrs.bldg_type {
            let Some(sector) = registry.sector_of(bldg) else {
                continue;
            };
            for fuel in &attrs.fuel_type {
                for end_use in attrs.end_use.iter().filter(|e| registry.end_uses_for(fuel).contains(*e)) {
                    let load = if registry.is_split_load(end_use) {
                        Some(attrs.technology_type.unwrap_or(Load::Supply))
                    } else {
                        None
                    };
                    for tech in registry
                        .technologies(sector, fuel, end_use, load)
                        .filter(|t| attrs.technology.contains(*t))
                    {
                        for vintage in &attrs.structure_type {
                            out.push(KeyChain {
                                segment: Segment::Primary,
                                region: region.clone(),
                                bldg_type: bldg.clone(),
                                fuel: fuel.clone(),
                                end_use: end_use.clone(),
                                load,
                                technology: Some(tech.clone()),
                                vintage: *vintage,
                            });
                        }
                    }
                }
            }
        }
    }
    out
}

/// Secondary key chains for the coupled end uses: every fuel serving the end
/// use, technology unspecified. Split-load end uses couple through their
/// demand side.
pub fn secondary_keychains(
    attrs: &Attributes,
    secondary_end_uses: impl Iterator<Item = String>,
    registry: &Registry,
) -> Vec<KeyChain> {
    let mut out = Vec::new();
    for end_use in secondary_end_uses {
        let load = registry.is_split_load(&end_use).then_some(Load::Demand);
        for region in &attrs.climate_zone {
            for bldg in &attrs.bldg_type {
                for fuel in registry.fuels_for_end_use(&end_use) {
                    for vintage in &attrs.structure_type {
                        out.push(KeyChain {
                            segment: Segment::Secondary,
                            region: region.clone(),
                            bldg_type: bldg.clone(),
                            fuel: fuel.clone(),
                            end_use: end_use.clone(),
                            load,
                            technology: None,
                            vintage: *vintage,
                        });
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::NumInput;
    use crate::measure::spec::{AttrSpec, Category};
    use crate::params::GlobalParams;
    use std::collections::BTreeMap;

    fn spec() -> MeasureSpec {
        MeasureSpec {
            name: "Best WH".into(),
            climate_zone: AttrSpec::One("AIA_CZ1".into()),
            bldg_type: AttrSpec::One("all residential".into()),
            structure_type: AttrSpec::all(),
            fuel_type: AttrSpec::One("electricity".into()),
            end_use: AttrSpec::One("water heating".into()),
            technology_type: Load::Supply,
            technology: AttrSpec::One("electric WH".into()),
            market_entry_year: None,
            market_exit_year: None,
            installed_cost: Category::Leaf(NumInput::Number(1000.0)),
            cost_units: Category::Leaf("2013$/unit".into()),
            energy_efficiency: Category::Leaf(NumInput::Number(25.0)),
            energy_efficiency_units: Category::Leaf("EF".into()),
            energy_efficiency_ref_year: None,
            product_lifetime: Category::Leaf(NumInput::Number(15.0)),
            market_scaling_fractions: None,
            market_scaling_fractions_source: None,
            secondary_savings: BTreeMap::new(),
        }
    }

    #[test]
    fn expands_sector_shorthand() {
        let p = GlobalParams::reference();
        let a = normalize(&spec(), &p.registry);
        let a = a.unwrap();
        assert_eq!(a.bldg_type, vec!["single family home", "multi family home", "mobile home"]);
        assert_eq!(a.structure_type, vec![Vintage::New, Vintage::Existing]);
    }

    #[test]
    fn all_technologies_follow_end_uses() {
        let p = GlobalParams::reference();
        let s = MeasureSpec {
            technology: AttrSpec::all(),
            ..spec()
        };
        let a = normalize(&s, &p.registry).unwrap();
        assert!(a.technology.contains(&"electric WH".to_string()));
        assert!(a.technology.contains(&"HP water heater".to_string()));
        assert!(!a.technology.contains(&"ASHP".to_string()));
    }

    #[test]
    fn unknown_values_are_rejected() {
        let p = GlobalParams::reference();
        let s = MeasureSpec {
            fuel_type: AttrSpec::One("coal".into()),
            ..spec()
        };
        let r = normalize(&s, &p.registry);
        assert!(matches!(r, Err(PrepError::Validation { ref measure, .. }) if measure == "Best WH"));
    }

    #[test]
    fn mismatched_technology_fails_market_check() {
        let p = GlobalParams::reference();
        let s = MeasureSpec {
            technology: AttrSpec::One("ASHP".into()),
            ..spec()
        };
        let a = normalize(&s, &p.registry).unwrap();
        assert!(check_mkt_inputs(&s, &a, &p.registry).is_err());
    }

    #[test]
    fn keychains_cross_product() {
        let p = GlobalParams::reference();
        let a = normalize(&spec(), &p.registry).unwrap();
        let keys = primary_keychains(&a, &p.registry);
        // 1 region x 3 building types x 1 technology x 2 vintages
        assert_eq!(keys.len(), 6);
        assert!(keys.iter().all(|k| k.load.is_none() && k.segment == Segment::Primary));
    }

    #[test]
    fn split_load_keychains_carry_load() {
        let p = GlobalParams::reference();
        let s = MeasureSpec {
            bldg_type: AttrSpec::One("single family home".into()),
            structure_type: AttrSpec::One("existing".into()),
            end_use: AttrSpec::One("heating".into()),
            technology: AttrSpec::One("ASHP".into()),
            ..spec()
        };
        let a = normalize(&s, &p.registry).unwrap();
        let keys = primary_keychains(&a, &p.registry);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].load, Some(Load::Supply));
    }

    #[test]
    fn secondary_keychains_span_fuels() {
        let p = GlobalParams::reference();
        let a = normalize(&spec(), &p.registry).unwrap();
        let keys = secondary_keychains(&a, ["heating".to_string()].into_iter(), &p.registry);
        // 1 region x 3 building types x 3 heating fuels x 2 vintages
        assert_eq!(keys.len(), 18);
        assert!(keys.iter().all(|k| k.technology.is_none() && k.load == Some(Load::Demand)));
    }

    #[test]
    fn category_keys_expand_to_technologies() {
        let p = GlobalParams::reference();
        let techs = expand_category_key(&p.registry, "all water heating");
        assert!(techs.contains(&"electric WH".to_string()));
        assert!(expand_category_key(&p.registry, "single family home").is_empty());
    }
}
