//! TOML-based parameter configuration and preset definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Top-level parameter file parsed from TOML.
///
/// All tables have defaults matching the reference preset. Load from TOML
/// with [`ParamsConfig::from_toml_file`] or use [`ParamsConfig::reference`]
/// for the built-in default, then resolve into
/// [`GlobalParams`](crate::params::GlobalParams).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsConfig {
    /// Modeled years and run-wide parameters.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Valid-value registry used to expand measure shorthand.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Site-to-source energy conversion by fuel.
    #[serde(default = "default_site_source")]
    pub site_source: BTreeMap<String, SeriesInput>,
    /// Carbon intensity of source energy by fuel.
    #[serde(default = "default_carbon_intensity")]
    pub carbon_intensity: BTreeMap<String, SeriesInput>,
    /// Fuel prices per unit source energy by sector and fuel.
    #[serde(default)]
    pub fuel_prices: FuelPriceConfig,
    /// Annual newly built share of stock by sector.
    #[serde(default)]
    pub new_construction: NewConstructionConfig,
    /// Consumer price index by year, for cost-year adjustment.
    #[serde(default = "default_cpi")]
    pub cpi: BTreeMap<String, f64>,
    /// Typical-unit cost conversion factors.
    #[serde(default = "default_cost_conversion")]
    pub cost_conversion: Vec<ConversionEntry>,
    /// Reporting-bin mappings for output breakdowns.
    #[serde(default)]
    pub output_breakout: OutputBreakoutConfig,
}

/// A constant or an explicit per-year map (`{"2009" = 1.0, ...}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SeriesInput {
    Constant(f64),
    ByYear(BTreeMap<String, f64>),
}

/// Modeled years and run-wide parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// First modeled year (inclusive).
    pub start_year: u32,
    /// Last modeled year (inclusive).
    pub end_year: u32,
    /// Master random seed.
    pub seed: u64,
    /// Sample count for distribution-valued inputs (must be > 0).
    pub n_samples: usize,
    /// Fraction of existing stock competed every year for retrofit (0.0-1.0).
    pub retro_rate: f64,
    /// Adoption scenarios to run: `"Technical potential"`, `"Max adoption potential"`.
    pub adopt_schemes: Vec<String>,
    /// Package lifetime weighting: `"arithmetic"` or `"harmonic"`.
    pub lifetime_weighting: String,
    /// Carbon price per unit carbon.
    pub carbon_price: SeriesInput,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            start_year: 2009,
            end_year: 2030,
            seed: 42,
            n_samples: 100,
            retro_rate: 0.01,
            adopt_schemes: vec![
                "Technical potential".to_string(),
                "Max adoption potential".to_string(),
            ],
            lifetime_weighting: "arithmetic".to_string(),
            carbon_price: SeriesInput::Constant(0.0),
        }
    }
}

/// One registry entry listing technologies for a sector/fuel/end-use (and load) combination.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnologyEntry {
    /// `"residential"` or `"commercial"`.
    pub sector: String,
    pub fuel: String,
    pub end_use: String,
    /// `"supply"` or `"demand"` for split-load end uses.
    #[serde(default)]
    pub load: Option<String>,
    pub names: Vec<String>,
}

/// Valid-value registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub regions: Vec<String>,
    pub residential_bldg_types: Vec<String>,
    pub commercial_bldg_types: Vec<String>,
    /// End uses split into supply (equipment) and demand (envelope) components.
    pub split_load_end_uses: Vec<String>,
    /// Valid end uses per fuel.
    pub end_uses: BTreeMap<String, Vec<String>>,
    pub technologies: Vec<TechnologyEntry>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let envelope = ["windows conduction", "windows solar", "wall", "roof", "infiltration"];
        let tech = |sector: &str, fuel: &str, end_use: &str, load: Option<&str>, names: &[&str]| {
            TechnologyEntry {
                sector: sector.to_string(),
                fuel: fuel.to_string(),
                end_use: end_use.to_string(),
                load: load.map(str::to_string),
                names: strings(names),
            }
        };
        let mut end_uses = BTreeMap::new();
        end_uses.insert(
            "electricity".to_string(),
            strings(&["heating", "cooling", "water heating", "lighting"]),
        );
        end_uses.insert("natural gas".to_string(), strings(&["heating", "water heating"]));
        end_uses.insert("distillate".to_string(), strings(&["heating"]));

        Self {
            regions: strings(&["AIA_CZ1", "AIA_CZ2", "AIA_CZ3", "AIA_CZ4", "AIA_CZ5"]),
            residential_bldg_types: strings(&[
                "single family home",
                "multi family home",
                "mobile home",
            ]),
            commercial_bldg_types: strings(&["assembly", "education", "small office", "retail"]),
            split_load_end_uses: strings(&["heating", "cooling"]),
            end_uses,
            technologies: vec![
                tech("residential", "electricity", "heating", Some("supply"), &["ASHP", "GSHP", "resistance heat"]),
                tech("residential", "electricity", "heating", Some("demand"), &envelope),
                tech("residential", "electricity", "cooling", Some("supply"), &["central AC", "room AC", "ASHP", "GSHP"]),
                tech("residential", "electricity", "cooling", Some("demand"), &envelope),
                tech("residential", "electricity", "water heating", None, &["electric WH", "solar WH"]),
                tech("residential", "electricity", "lighting", None, &["general service (LED)", "general service (CFL)", "linear fluorescent (T-8)"]),
                tech("residential", "natural gas", "heating", Some("supply"), &["furnace (NG)", "boiler (NG)"]),
                tech("residential", "natural gas", "heating", Some("demand"), &envelope),
                tech("residential", "natural gas", "water heating", None, &["water heater (NG)"]),
                tech("residential", "distillate", "heating", Some("supply"), &["boiler (distillate)", "furnace (distillate)"]),
                tech("residential", "distillate", "heating", Some("demand"), &envelope),
                tech("commercial", "electricity", "heating", Some("supply"), &["rooftop_ASHP-heat", "elec_boiler"]),
                tech("commercial", "electricity", "heating", Some("demand"), &envelope),
                tech("commercial", "electricity", "cooling", Some("supply"), &["rooftop_AC", "scroll_chiller"]),
                tech("commercial", "electricity", "cooling", Some("demand"), &envelope),
                tech("commercial", "electricity", "water heating", None, &["HP water heater", "elec_booster_water_heater"]),
                tech("commercial", "electricity", "lighting", None, &["T8 F32", "LED_Edison"]),
                tech("commercial", "natural gas", "heating", Some("supply"), &["gas_furnace", "gas_boiler"]),
                tech("commercial", "natural gas", "heating", Some("demand"), &envelope),
                tech("commercial", "natural gas", "water heating", None, &["gas_water_heater"]),
            ],
        }
    }
}

/// Fuel prices by sector, each keyed by fuel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuelPriceConfig {
    pub residential: BTreeMap<String, SeriesInput>,
    pub commercial: BTreeMap<String, SeriesInput>,
}

impl Default for FuelPriceConfig {
    fn default() -> Self {
        let prices = |e: f64, g: f64, d: f64| {
            BTreeMap::from([
                ("electricity".to_string(), SeriesInput::Constant(e)),
                ("natural gas".to_string(), SeriesInput::Constant(g)),
                ("distillate".to_string(), SeriesInput::Constant(d)),
            ])
        };
        Self {
            residential: prices(11.0, 10.5, 21.0),
            commercial: prices(9.5, 8.4, 19.0),
        }
    }
}

/// Annual newly built share of stock by sector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewConstructionConfig {
    pub residential: SeriesInput,
    pub commercial: SeriesInput,
}

impl Default for NewConstructionConfig {
    fn default() -> Self {
        Self {
            residential: SeriesInput::Constant(0.01),
            commercial: SeriesInput::Constant(0.015),
        }
    }
}

/// One typical-unit conversion factor (`cost[to] = cost[from] * factor`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionEntry {
    /// Source cost basis, e.g. `"ft^2 floor"`.
    pub from: String,
    /// Target cost basis, e.g. `"unit"`.
    pub to: String,
    pub factor: f64,
    /// Restricts the factor to one building type.
    #[serde(default)]
    pub bldg_type: Option<String>,
    /// Restricts the factor to one technology.
    #[serde(default)]
    pub technology: Option<String>,
}

/// Reporting-bin mappings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputBreakoutConfig {
    /// Region -> reporting region; unmapped regions report under their own name.
    pub regions: BTreeMap<String, String>,
    /// End use -> reporting category; unmapped end uses report as `"Other"`.
    pub end_use_categories: BTreeMap<String, String>,
}

fn default_site_source() -> BTreeMap<String, SeriesInput> {
    BTreeMap::from([
        ("electricity".to_string(), SeriesInput::Constant(3.05)),
        ("natural gas".to_string(), SeriesInput::Constant(1.09)),
        ("distillate".to_string(), SeriesInput::Constant(1.16)),
    ])
}

fn default_carbon_intensity() -> BTreeMap<String, SeriesInput> {
    BTreeMap::from([
        ("electricity".to_string(), SeriesInput::Constant(59.0)),
        ("natural gas".to_string(), SeriesInput::Constant(53.1)),
        ("distillate".to_string(), SeriesInput::Constant(70.2)),
    ])
}

fn default_cpi() -> BTreeMap<String, f64> {
    [
        (2009, 214.5),
        (2010, 218.1),
        (2011, 224.9),
        (2012, 229.6),
        (2013, 233.0),
        (2014, 236.7),
        (2015, 237.0),
        (2016, 240.0),
        (2017, 245.1),
    ]
    .into_iter()
    .map(|(y, v)| (y.to_string(), v))
    .collect()
}

fn default_cost_conversion() -> Vec<ConversionEntry> {
    let entry = |from: &str, to: &str, factor: f64, bldg_type: Option<&str>| ConversionEntry {
        from: from.to_string(),
        to: to.to_string(),
        factor,
        bldg_type: bldg_type.map(str::to_string),
        technology: None,
    };
    vec![
        entry("ft^2 floor", "unit", 2400.0, Some("single family home")),
        entry("ft^2 floor", "unit", 950.0, Some("multi family home")),
        entry("ft^2 floor", "unit", 1100.0, Some("mobile home")),
        entry("ft^2 floor", "ft^2 floor", 1.0, None),
        entry("unit", "ft^2 floor", 1.0 / 2400.0, Some("single family home")),
        entry("kBtu/h heating", "unit", 36.0, None),
        entry("kBtu/h cooling", "unit", 36.0, None),
    ]
}

/// Valid adoption scenario names.
pub const ADOPT_SCHEMES: &[&str] = &["Technical potential", "Max adoption potential"];
/// Valid lifetime weighting names.
pub const LIFETIME_WEIGHTINGS: &[&str] = &["arithmetic", "harmonic"];

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"general.n_samples"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl ParamsConfig {
    /// Returns the reference parameter set.
    pub fn reference() -> Self {
        Self {
            general: GeneralConfig::default(),
            registry: RegistryConfig::default(),
            site_source: default_site_source(),
            carbon_intensity: default_carbon_intensity(),
            fuel_prices: FuelPriceConfig::default(),
            new_construction: NewConstructionConfig::default(),
            cpi: default_cpi(),
            cost_conversion: default_cost_conversion(),
            output_breakout: OutputBreakoutConfig {
                regions: BTreeMap::new(),
                end_use_categories: BTreeMap::from([
                    ("heating".to_string(), "Heating".to_string()),
                    ("cooling".to_string(), "Cooling".to_string()),
                    ("water heating".to_string(), "Water Heating".to_string()),
                    ("lighting".to_string(), "Lighting".to_string()),
                ]),
            },
        }
    }

    /// Returns the technical-potential-only preset: reference data, one scenario.
    pub fn technical_potential() -> Self {
        Self {
            general: GeneralConfig {
                adopt_schemes: vec!["Technical potential".to_string()],
                ..GeneralConfig::default()
            },
            ..Self::reference()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["reference", "technical_potential"];

    /// Loads parameters from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "reference" => Ok(Self::reference()),
            "technical_potential" => Ok(Self::technical_potential()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses parameters from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "params".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses parameters from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Modeled years, inclusive of both ends.
    pub fn years(&self) -> Vec<u32> {
        (self.general.start_year..=self.general.end_year).collect()
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let g = &self.general;

        if g.start_year > g.end_year {
            errors.push(ConfigError {
                field: "general.start_year".into(),
                message: "must be <= general.end_year".into(),
            });
        }
        if g.n_samples == 0 {
            errors.push(ConfigError {
                field: "general.n_samples".into(),
                message: "must be > 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&g.retro_rate) {
            errors.push(ConfigError {
                field: "general.retro_rate".into(),
                message: "must be in [0.0, 1.0]".into(),
            });
        }
        if g.adopt_schemes.is_empty() {
            errors.push(ConfigError {
                field: "general.adopt_schemes".into(),
                message: "must name at least one scheme".into(),
            });
        }
        for s in &g.adopt_schemes {
            if !ADOPT_SCHEMES.contains(&s.as_str()) {
                errors.push(ConfigError {
                    field: "general.adopt_schemes".into(),
                    message: format!(
                        "unknown scheme \"{s}\", expected one of: {}",
                        ADOPT_SCHEMES.join(", ")
                    ),
                });
            }
        }
        if !LIFETIME_WEIGHTINGS.contains(&g.lifetime_weighting.as_str()) {
            errors.push(ConfigError {
                field: "general.lifetime_weighting".into(),
                message: format!(
                    "must be \"arithmetic\" or \"harmonic\", got \"{}\"",
                    g.lifetime_weighting
                ),
            });
        }

        let years = self.years();
        check_series(&mut errors, "general.carbon_price", &g.carbon_price, &years);

        let r = &self.registry;
        if r.regions.is_empty() {
            errors.push(ConfigError {
                field: "registry.regions".into(),
                message: "must not be empty".into(),
            });
        }
        if r.residential_bldg_types.is_empty() && r.commercial_bldg_types.is_empty() {
            errors.push(ConfigError {
                field: "registry.residential_bldg_types".into(),
                message: "at least one building type is required".into(),
            });
        }
        for b in &r.residential_bldg_types {
            if r.commercial_bldg_types.contains(b) {
                errors.push(ConfigError {
                    field: "registry.commercial_bldg_types".into(),
                    message: format!("\"{b}\" is listed under both sectors"),
                });
            }
        }
        for (i, t) in r.technologies.iter().enumerate() {
            let field = format!("registry.technologies[{i}]");
            if t.sector != "residential" && t.sector != "commercial" {
                errors.push(ConfigError {
                    field: format!("{field}.sector"),
                    message: format!(
                        "must be \"residential\" or \"commercial\", got \"{}\"",
                        t.sector
                    ),
                });
            }
            let valid_end_use = r
                .end_uses
                .get(&t.fuel)
                .is_some_and(|eus| eus.contains(&t.end_use));
            if !valid_end_use {
                errors.push(ConfigError {
                    field: format!("{field}.end_use"),
                    message: format!(
                        "\"{}\" is not an end use of fuel \"{}\"",
                        t.end_use, t.fuel
                    ),
                });
            }
            match t.load.as_deref() {
                None | Some("supply") | Some("demand") => {}
                Some(other) => errors.push(ConfigError {
                    field: format!("{field}.load"),
                    message: format!("must be \"supply\" or \"demand\", got \"{other}\""),
                }),
            }
            if t.load.is_some() != r.split_load_end_uses.contains(&t.end_use) {
                errors.push(ConfigError {
                    field: format!("{field}.load"),
                    message: "load is required exactly for split-load end uses".into(),
                });
            }
        }

        for fuel in r.end_uses.keys() {
            for (table, map) in [
                ("site_source", &self.site_source),
                ("carbon_intensity", &self.carbon_intensity),
                ("fuel_prices.residential", &self.fuel_prices.residential),
                ("fuel_prices.commercial", &self.fuel_prices.commercial),
            ] {
                match map.get(fuel) {
                    Some(s) => check_series(&mut errors, &format!("{table}.{fuel}"), s, &years),
                    None => errors.push(ConfigError {
                        field: format!("{table}.{fuel}"),
                        message: "missing entry for registry fuel".into(),
                    }),
                }
            }
        }
        check_series(
            &mut errors,
            "new_construction.residential",
            &self.new_construction.residential,
            &years,
        );
        check_series(
            &mut errors,
            "new_construction.commercial",
            &self.new_construction.commercial,
            &years,
        );

        for year in self.cpi.keys() {
            if year.parse::<u32>().is_err() {
                errors.push(ConfigError {
                    field: format!("cpi.{year}"),
                    message: "key must be a calendar year".into(),
                });
            }
        }
        for (i, c) in self.cost_conversion.iter().enumerate() {
            if c.factor <= 0.0 {
                errors.push(ConfigError {
                    field: format!("cost_conversion[{i}].factor"),
                    message: "must be > 0".into(),
                });
            }
        }

        errors
    }
}

/// Checks that a per-year map covers every modeled year.
fn check_series(errors: &mut Vec<ConfigError>, field: &str, input: &SeriesInput, years: &[u32]) {
    if let SeriesInput::ByYear(map) = input {
        for y in years {
            if !map.contains_key(&y.to_string()) {
                errors.push(ConfigError {
                    field: field.to_string(),
                    message: format!("missing modeled year {y}"),
                });
                return;
            }
        }
    }
}
