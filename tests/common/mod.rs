//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use ecm_prep::baseline::{ChoiceParams, CplRecord, InMemoryBaseline};
use ecm_prep::config::{ParamsConfig, SeriesInput};
use ecm_prep::convert::TableCostConverter;
use ecm_prep::keychain::{KeyChain, Segment, Vintage};
use ecm_prep::measure::{Measure, MeasureSpec};
use ecm_prep::params::GlobalParams;
use ecm_prep::runner::prepare_measure;
use ecm_prep::series::YearSeries;
use serde_json::{Value as Json, json};

/// Modeled years of every fixture.
pub const YEARS: [u32; 3] = [2009, 2010, 2011];

/// Baseline site energy of each water-heating microsegment.
pub const WH_ENERGY: [f64; 3] = [15.15, 16.0, 16.5];

/// Baseline stock of each water-heating microsegment.
pub const WH_STOCK: [f64; 3] = [10.0, 11.0, 12.0];

/// Reference parameters over [`YEARS`] with unit site-source conversion,
/// so source energy equals site energy.
pub fn test_config() -> ParamsConfig {
    let mut cfg = ParamsConfig::reference();
    cfg.general.start_year = YEARS[0];
    cfg.general.end_year = YEARS[YEARS.len() - 1];
    cfg.general.n_samples = 50;
    for v in cfg.site_source.values_mut() {
        *v = SeriesInput::Constant(1.0);
    }
    cfg
}

pub fn test_params() -> GlobalParams {
    GlobalParams::from_config(&test_config()).expect("test parameters should be valid")
}

/// Parameters with a custom sample count.
pub fn test_params_with_samples(n_samples: usize) -> GlobalParams {
    let mut cfg = test_config();
    cfg.general.n_samples = n_samples;
    GlobalParams::from_config(&cfg).expect("test parameters should be valid")
}

/// Primary electric water-heating key chain.
pub fn wh_key(region: &str, bldg_type: &str, vintage: Vintage) -> KeyChain {
    KeyChain {
        segment: Segment::Primary,
        region: region.to_string(),
        bldg_type: bldg_type.to_string(),
        fuel: "electricity".to_string(),
        end_use: "water heating".to_string(),
        load: None,
        technology: Some("electric WH".to_string()),
        vintage,
    }
}

/// Baseline electric water heater: 18 EF, 2013$800 per unit, 12-year life,
/// cost-neutral consumer choice (`b1 = b2 = 0`).
pub fn wh_cpl() -> CplRecord {
    CplRecord {
        performance: YearSeries::constant(&YEARS, 18.0),
        performance_units: "EF".to_string(),
        installed_cost: YearSeries::constant(&YEARS, 800.0),
        cost_units: "2013$/unit".to_string(),
        lifetime: YearSeries::constant(&YEARS, 12.0),
        consumer_choice: ChoiceParams {
            b1: YearSeries::zeros(&YEARS),
            b2: YearSeries::zeros(&YEARS),
            p: 0.03,
            q: 0.38,
        },
    }
}

/// Baseline covering electric water heating in `AIA_CZ1` for every
/// residential building type and both vintages.
pub fn wh_baseline() -> InMemoryBaseline {
    let mut b = InMemoryBaseline::new();
    for bldg in ["single family home", "multi family home", "mobile home"] {
        for vintage in Vintage::ALL {
            let key = wh_key("AIA_CZ1", bldg, vintage);
            b.insert_series(&key, &YEARS, &WH_STOCK, &WH_ENERGY);
            b.insert_cpl(&key, wh_cpl());
        }
    }
    b
}

/// Water-heating measure definition; `overrides` replaces top-level fields.
pub fn wh_spec(name: &str, overrides: Json) -> MeasureSpec {
    let mut spec = json!({
        "name": name,
        "climate_zone": "AIA_CZ1",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "water heating",
        "technology": "electric WH",
        "installed_cost": 1000,
        "cost_units": "2013$/unit",
        "energy_efficiency": 25,
        "energy_efficiency_units": "EF",
        "product_lifetime": 15
    });
    if let (Some(base), Json::Object(extra)) = (spec.as_object_mut(), overrides) {
        base.extend(extra);
    }
    serde_json::from_value(spec).expect("fixture measure should parse")
}

/// Complete source attribution for sub-market scaling.
pub fn full_source() -> Json {
    json!({
        "title": "Residential Energy Consumption Survey",
        "author": "EIA",
        "organization": "U.S. Energy Information Administration",
        "year": 2009,
        "url": "https://www.eia.gov/consumption/residential/",
        "fraction_derivation": "share of homes with a tank water heater"
    })
}

/// Prepares `spec` against the water-heating fixtures.
pub fn prepare(spec: MeasureSpec, params: &GlobalParams) -> Measure {
    let baseline = wh_baseline();
    let converter = TableCostConverter::new(params);
    prepare_measure(spec, params, &baseline, &converter).expect("fixture measure should prepare")
}

/// Point value of `series` in `year`.
pub fn at(series: &YearSeries, year: u32) -> f64 {
    series.point(year).expect("year should be present")
}
