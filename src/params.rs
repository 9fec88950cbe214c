//! Resolved, immutable global parameter store.
//!
//! Built once from a validated [`ParamsConfig`] and passed by reference into
//! every stage of measure preparation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::config::{ConfigError, ConversionEntry, ParamsConfig, SeriesInput};
use crate::error::{PrepError, PrepResult};
use crate::keychain::{Load, Sector, Vintage};
use crate::series::YearSeries;

/// Adoption scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AdoptionScheme {
    /// Every competed unit adopts the measure whenever it is cost-effective.
    #[serde(rename = "Technical potential")]
    TechnicalPotential,
    /// Capture diffuses over time along a Bass curve.
    #[serde(rename = "Max adoption potential")]
    MaxAdoptionPotential,
}

impl AdoptionScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            AdoptionScheme::TechnicalPotential => "Technical potential",
            AdoptionScheme::MaxAdoptionPotential => "Max adoption potential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Technical potential" => Some(AdoptionScheme::TechnicalPotential),
            "Max adoption potential" => Some(AdoptionScheme::MaxAdoptionPotential),
            _ => None,
        }
    }
}

impl fmt::Display for AdoptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How package lifetimes are averaged over contributing microsegments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeWeighting {
    Arithmetic,
    Harmonic,
}

/// Technologies valid for one sector/fuel/end-use/load combination.
#[derive(Debug, Clone, PartialEq)]
pub struct TechRecord {
    pub sector: Sector,
    pub fuel: String,
    pub end_use: String,
    pub load: Option<Load>,
    pub names: Vec<String>,
}

/// Valid-value registry used for attribute expansion and key-chain filtering.
#[derive(Debug, Clone)]
pub struct Registry {
    pub regions: Vec<String>,
    residential: Vec<String>,
    commercial: Vec<String>,
    split_load: Vec<String>,
    end_uses: BTreeMap<String, Vec<String>>,
    technologies: Vec<TechRecord>,
}

impl Registry {
    pub fn sector_of(&self, bldg_type: &str) -> Option<Sector> {
        if self.residential.iter().any(|b| b == bldg_type) {
            Some(Sector::Residential)
        } else if self.commercial.iter().any(|b| b == bldg_type) {
            Some(Sector::Commercial)
        } else {
            None
        }
    }

    /// Building types of one sector, or of both when `sector` is `None`.
    pub fn bldg_types(&self, sector: Option<Sector>) -> Vec<String> {
        match sector {
            Some(Sector::Residential) => self.residential.clone(),
            Some(Sector::Commercial) => self.commercial.clone(),
            None => self.residential.iter().chain(&self.commercial).cloned().collect(),
        }
    }

    pub fn fuels(&self) -> Vec<String> {
        self.end_uses.keys().cloned().collect()
    }

    pub fn end_uses_for(&self, fuel: &str) -> &[String] {
        self.end_uses.get(fuel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_end_uses(&self) -> BTreeSet<String> {
        self.end_uses.values().flatten().cloned().collect()
    }

    pub fn fuels_for_end_use(&self, end_use: &str) -> Vec<String> {
        self.end_uses
            .iter()
            .filter(|(_, eus)| eus.iter().any(|e| e == end_use))
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn is_split_load(&self, end_use: &str) -> bool {
        self.split_load.iter().any(|e| e == end_use)
    }

    /// Technologies valid for the combination; entries without a load match `load == None`.
    pub fn technologies(
        &self,
        sector: Sector,
        fuel: &str,
        end_use: &str,
        load: Option<Load>,
    ) -> impl Iterator<Item = &String> {
        self.technologies
            .iter()
            .filter(move |t| {
                t.sector == sector && t.fuel == fuel && t.end_use == end_use && t.load == load
            })
            .flat_map(|t| t.names.iter())
    }

    pub fn all_technologies(&self) -> BTreeSet<String> {
        self.technologies
            .iter()
            .flat_map(|t| t.names.iter().cloned())
            .collect()
    }

    pub fn technologies_for_end_use(&self, end_use: &str) -> BTreeSet<String> {
        self.technologies
            .iter()
            .filter(|t| t.end_use == end_use)
            .flat_map(|t| t.names.iter().cloned())
            .collect()
    }

    /// Whether `technology` appears under any of the given fuel/end-use pairs.
    pub fn technology_declared_for(&self, technology: &str, fuels: &[String], end_uses: &[String]) -> bool {
        self.technologies.iter().any(|t| {
            fuels.contains(&t.fuel)
                && end_uses.contains(&t.end_use)
                && t.names.iter().any(|n| n == technology)
        })
    }
}

/// Annual and cumulative newly built shares of stock, aligned with the modeled years.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConstruction {
    pub annual: Vec<f64>,
    pub cumulative: Vec<f64>,
}

impl NewConstruction {
    fn from_annual(annual: Vec<f64>) -> Self {
        let mut running = 0.0;
        let cumulative = annual
            .iter()
            .map(|a| {
                running = (running + a).min(1.0);
                running
            })
            .collect();
        Self { annual, cumulative }
    }

    /// Fraction of a vintage's stock at year index `i` that was newly built
    /// that year. Existing stock never has additions, and nothing is added
    /// once the cumulative share has saturated.
    pub fn added_share(&self, vintage: Vintage, i: usize) -> f64 {
        let cum = self.cumulative.get(i).copied().unwrap_or(0.0);
        let prev = match i {
            0 => 0.0,
            _ => self.cumulative.get(i - 1).copied().unwrap_or(0.0),
        };
        match vintage {
            Vintage::New if cum > 0.0 => ((cum - prev) / cum).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Process-wide constants consumed by every component.
#[derive(Debug, Clone)]
pub struct GlobalParams {
    pub years: Vec<u32>,
    pub seed: u64,
    pub n_samples: usize,
    pub retro_rate: f64,
    pub adopt_schemes: Vec<AdoptionScheme>,
    pub lifetime_weighting: LifetimeWeighting,
    pub registry: Registry,
    pub site_source: BTreeMap<String, YearSeries>,
    pub carbon_intensity: BTreeMap<String, YearSeries>,
    pub fuel_prices: BTreeMap<Sector, BTreeMap<String, YearSeries>>,
    pub carbon_price: YearSeries,
    pub new_construction: BTreeMap<Sector, NewConstruction>,
    pub cpi: BTreeMap<u32, f64>,
    pub cost_conversion: Vec<ConversionEntry>,
    out_regions: BTreeMap<String, String>,
    end_use_categories: BTreeMap<String, String>,
}

impl GlobalParams {
    /// Resolves a parameter file into the immutable store.
    ///
    /// # Errors
    ///
    /// Returns every validation error of `cfg` if it is invalid.
    pub fn from_config(cfg: &ParamsConfig) -> Result<Self, Vec<ConfigError>> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        let years = cfg.years();
        let g = &cfg.general;
        let r = &cfg.registry;

        let fuel_map = |m: &BTreeMap<String, SeriesInput>| -> BTreeMap<String, YearSeries> {
            m.iter()
                .map(|(k, v)| (k.clone(), resolve_series(v, &years)))
                .collect()
        };
        let annual = |s: &SeriesInput| -> Vec<f64> {
            let series = resolve_series(s, &years);
            years.iter().map(|&y| series.point(y).unwrap_or(0.0)).collect()
        };

        let technologies = r
            .technologies
            .iter()
            .map(|t| TechRecord {
                sector: if t.sector == "commercial" {
                    Sector::Commercial
                } else {
                    Sector::Residential
                },
                fuel: t.fuel.clone(),
                end_use: t.end_use.clone(),
                load: match t.load.as_deref() {
                    Some("supply") => Some(Load::Supply),
                    Some("demand") => Some(Load::Demand),
                    _ => None,
                },
                names: t.names.clone(),
            })
            .collect();

        Ok(Self {
            seed: g.seed,
            n_samples: g.n_samples,
            retro_rate: g.retro_rate,
            adopt_schemes: g
                .adopt_schemes
                .iter()
                .filter_map(|s| AdoptionScheme::parse(s))
                .collect(),
            lifetime_weighting: if g.lifetime_weighting == "harmonic" {
                LifetimeWeighting::Harmonic
            } else {
                LifetimeWeighting::Arithmetic
            },
            registry: Registry {
                regions: r.regions.clone(),
                residential: r.residential_bldg_types.clone(),
                commercial: r.commercial_bldg_types.clone(),
                split_load: r.split_load_end_uses.clone(),
                end_uses: r.end_uses.clone(),
                technologies,
            },
            site_source: fuel_map(&cfg.site_source),
            carbon_intensity: fuel_map(&cfg.carbon_intensity),
            fuel_prices: BTreeMap::from([
                (Sector::Residential, fuel_map(&cfg.fuel_prices.residential)),
                (Sector::Commercial, fuel_map(&cfg.fuel_prices.commercial)),
            ]),
            carbon_price: resolve_series(&g.carbon_price, &years),
            new_construction: BTreeMap::from([
                (
                    Sector::Residential,
                    NewConstruction::from_annual(annual(&cfg.new_construction.residential)),
                ),
                (
                    Sector::Commercial,
                    NewConstruction::from_annual(annual(&cfg.new_construction.commercial)),
                ),
            ]),
            cpi: cfg
                .cpi
                .iter()
                .filter_map(|(y, v)| y.parse().ok().map(|y| (y, *v)))
                .collect(),
            cost_conversion: cfg.cost_conversion.clone(),
            out_regions: cfg.output_breakout.regions.clone(),
            end_use_categories: cfg.output_breakout.end_use_categories.clone(),
            years,
        })
    }

    /// Store resolved from the reference preset.
    ///
    /// # Panics
    ///
    /// Panics if the built-in reference preset fails validation.
    pub fn reference() -> Self {
        match Self::from_config(&ParamsConfig::reference()) {
            Ok(p) => p,
            Err(errors) => panic!("reference preset is invalid: {errors:?}"),
        }
    }

    pub fn site_source(&self, fuel: &str) -> PrepResult<&YearSeries> {
        self.site_source
            .get(fuel)
            .ok_or_else(|| PrepError::MissingKey(format!("site-source conversion for \"{fuel}\"")))
    }

    pub fn carbon_intensity(&self, fuel: &str) -> PrepResult<&YearSeries> {
        self.carbon_intensity
            .get(fuel)
            .ok_or_else(|| PrepError::MissingKey(format!("carbon intensity for \"{fuel}\"")))
    }

    pub fn fuel_price(&self, sector: Sector, fuel: &str) -> PrepResult<&YearSeries> {
        self.fuel_prices
            .get(&sector)
            .and_then(|m| m.get(fuel))
            .ok_or_else(|| {
                PrepError::MissingKey(format!("{} fuel price for \"{fuel}\"", sector.as_str()))
            })
    }

    pub fn new_construction(&self, sector: Sector) -> PrepResult<&NewConstruction> {
        self.new_construction.get(&sector).ok_or_else(|| {
            PrepError::MissingKey(format!("new construction shares for {}", sector.as_str()))
        })
    }

    /// Reporting region for `region`.
    pub fn out_region(&self, region: &str) -> String {
        self.out_regions
            .get(region)
            .cloned()
            .unwrap_or_else(|| region.to_string())
    }

    /// Reporting category for an end use; split-load end uses are further
    /// labelled `(Equip.)` or `(Env.)`.
    pub fn end_use_category(&self, end_use: &str, load: Option<Load>) -> String {
        let base = self
            .end_use_categories
            .get(end_use)
            .cloned()
            .unwrap_or_else(|| "Other".to_string());
        match load {
            Some(Load::Supply) => format!("{base} (Equip.)"),
            Some(Load::Demand) => format!("{base} (Env.)"),
            None => base,
        }
    }
}

fn resolve_series(input: &SeriesInput, years: &[u32]) -> YearSeries {
    match input {
        SeriesInput::Constant(v) => YearSeries::constant(years, *v),
        SeriesInput::ByYear(map) => years
            .iter()
            .filter_map(|y| map.get(&y.to_string()).map(|v| (*y, (*v).into())))
            .collect(),
    }
}
