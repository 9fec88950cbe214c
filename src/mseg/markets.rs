//! Market aggregation: runs the partitioner over every key chain of a measure
//! and accumulates the results per adoption scheme.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;
use tracing::debug;

use crate::baseline::{BaselineData, ChoiceParams, CplRecord};
use crate::convert::CostConverter;
use crate::error::{PrepError, PrepResult};
use crate::keychain::{KeyChain, Sector, Segment};
use crate::measure::Measure;
use crate::mseg::arith::{Combine, Node, div_keyvals};
use crate::mseg::master::{AllMeasure, MasterMseg, Split};
use crate::mseg::partition::{
    CaptureShares, Factors, PartitionInputs, partition_microsegment, partition_secondary,
};
use crate::mseg::performance::relative_performance;
use crate::params::{AdoptionScheme, GlobalParams, LifetimeWeighting};
use crate::series::{Value, YearSeries};

/// Baseline and measure lifetimes (years).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lifetime {
    pub baseline: YearSeries,
    pub measure: Value,
}

/// One key chain's contribution to a measure's master microsegment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributingMseg {
    pub mseg: MasterMseg,
    pub sub_market_scale: f64,
    pub lifetime: Lifetime,
}

/// Per-key-chain records behind a master microsegment.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MsegAdjust {
    pub contributing: BTreeMap<KeyChain, ContributingMseg>,
    pub competed_choice: BTreeMap<KeyChain, ChoiceParams>,
    /// Capture shares by `region|bldg_type|vintage`, applied to secondary
    /// microsegments.
    pub secondary: BTreeMap<String, CaptureShares>,
}

/// Baseline energy by reporting region, building class, and end-use category.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OutputBreakdown {
    pub tree: Node,
    /// Total baseline energy over all bins.
    pub norm: YearSeries,
}

impl OutputBreakdown {
    /// Builds the breakdown from contributing records.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` for a building type outside the registry.
    pub fn from_contributing(
        contributing: &BTreeMap<KeyChain, ContributingMseg>,
        params: &GlobalParams,
    ) -> PrepResult<Self> {
        let mut tree = Node::default();
        let mut norm = YearSeries::zeros(&params.years);
        for (key, c) in contributing {
            let sector = sector_of(params, key)?;
            let region = params.out_region(&key.region);
            let class = sector.class_label(key.vintage);
            let category = params.end_use_category(&key.end_use, key.load);
            let energy = &c.mseg.energy.total.baseline;
            tree.accumulate(&[region.as_str(), class.as_str(), category.as_str()], energy)?;
            norm = norm.add_keyvals(energy)?;
        }
        Ok(Self { tree, norm })
    }

    /// Share of total baseline energy in each bin.
    pub fn fractions(&self) -> PrepResult<Node> {
        div_keyvals(&self.tree, &self.norm)
    }
}

/// Everything computed for one measure under one adoption scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSet {
    pub master_mseg: MasterMseg,
    pub mseg_adjust: MsegAdjust,
    pub mseg_out_break: OutputBreakdown,
    pub lifetime: Lifetime,
}

fn sector_of(params: &GlobalParams, key: &KeyChain) -> PrepResult<Sector> {
    params
        .registry
        .sector_of(&key.bldg_type)
        .ok_or_else(|| PrepError::MissingKey(format!("sector of building type \"{}\"", key.bldg_type)))
}

fn factors<'a>(params: &'a GlobalParams, sector: Sector, fuel: &str) -> PrepResult<Factors<'a>> {
    Ok(Factors {
        site_source: params.site_source(fuel)?,
        carbon_intensity: params.carbon_intensity(fuel)?,
        fuel_price: params.fuel_price(sector, fuel)?,
        carbon_price: &params.carbon_price,
    })
}

/// Modeled-year slice of a registry series.
fn restrict(series: &YearSeries, years: &[u32]) -> PrepResult<YearSeries> {
    years
        .iter()
        .map(|&y| Ok((y, series.get(y)?.clone())))
        .collect()
}

/// Baseline stock and site energy of `key`, scaled by `scale`.
fn baseline_series(
    baseline: &dyn BaselineData,
    key: &KeyChain,
    years: &[u32],
    scale: f64,
) -> PrepResult<(YearSeries, YearSeries)> {
    let mut stock = YearSeries::new();
    let mut energy = YearSeries::new();
    for &y in years {
        let r = baseline.get_baseline(key, y)?;
        stock.insert(y, r.stock * scale);
        energy.insert(y, r.energy * scale);
    }
    Ok((stock, energy))
}

/// Weighted mean that falls back to `fallback` in lanes with zero weight.
fn weighted_or(num: &Value, den: &Value, fallback: &Value) -> Value {
    let n = num.lanes().max(den.lanes()).max(fallback.lanes());
    Value::from_lanes(
        (0..n)
            .map(|i| {
                let d = den.lane(i);
                if d == 0.0 { fallback.lane(i) } else { num.lane(i) / d }
            })
            .collect(),
    )
}

/// Stock-weighted lifetimes over the primary contributing records: baseline
/// lifetime weighted by total stock each year, measure lifetime weighted by
/// captured stock summed over years.
///
/// # Errors
///
/// Returns `StructureMismatch` if records cover different years.
pub fn weighted_lifetime(
    contributing: &BTreeMap<KeyChain, ContributingMseg>,
    years: &[u32],
    weighting: LifetimeWeighting,
) -> PrepResult<Lifetime> {
    let mut num_b = YearSeries::zeros(years);
    let mut den_b = YearSeries::zeros(years);
    let mut num_m = Value::Point(0.0);
    let mut den_m = Value::Point(0.0);
    let mut plain_b = YearSeries::zeros(years);
    let mut plain_m = Value::Point(0.0);
    let mut count = 0.0;

    for (key, c) in contributing {
        if key.segment == Segment::Secondary {
            continue;
        }
        let w = &c.mseg.stock.total.all;
        let life_b = &c.lifetime.baseline;
        let life_m = &c.lifetime.measure;
        let w_m = c
            .mseg
            .stock
            .total
            .measure
            .iter()
            .try_fold(Value::Point(0.0), |acc, (_, v)| acc.add(v))?;

        match weighting {
            LifetimeWeighting::Arithmetic => {
                num_b = num_b.add_keyvals(&w.zip_with(life_b, |a, b| a.mul(b))?)?;
                den_b = den_b.add_keyvals(w)?;
                num_m = num_m.add(&w_m.mul(life_m)?)?;
                den_m = den_m.add(&w_m)?;
            }
            LifetimeWeighting::Harmonic => {
                num_b = num_b.add_keyvals(w)?;
                den_b = den_b.add_keyvals(&w.zip_with(life_b, |a, b| a.div_or_zero(b))?)?;
                num_m = num_m.add(&w_m)?;
                den_m = den_m.add(&w_m.div_or_zero(life_m)?)?;
            }
        }
        plain_b = plain_b.add_keyvals(life_b)?;
        plain_m = plain_m.add(life_m)?;
        count += 1.0;
    }

    let count = if count > 0.0 { count } else { 1.0 };
    let mut baseline = YearSeries::new();
    for &y in years {
        let fallback = plain_b.get(y)?.scale(1.0 / count);
        baseline.insert(y, weighted_or(num_b.get(y)?, den_b.get(y)?, &fallback));
    }
    Ok(Lifetime {
        baseline,
        measure: weighted_or(&num_m, &den_m, &plain_m.scale(1.0 / count)),
    })
}

struct ChainInputs<'a> {
    key: &'a KeyChain,
    sector: Sector,
    scale: f64,
    stock: YearSeries,
    energy: YearSeries,
    cpl: &'a CplRecord,
    cost_baseline: YearSeries,
    cost_measure: Value,
    rel_perf: YearSeries,
    added_share: Vec<f64>,
    life_baseline: YearSeries,
    life_measure: Value,
}

/// Computes a measure's markets for every configured adoption scheme.
///
/// `apply_scaling` says whether the measure's sub-market scaling fractions
/// passed attribution checks.
///
/// # Errors
///
/// Returns `MissingKey` when a primary key chain is absent from the baseline
/// or a conversion factor is missing, and `Validation` for inputs
/// inconsistent with the baseline (units, missing values).
pub fn fill_mkts(
    measure: &Measure,
    params: &GlobalParams,
    baseline: &dyn BaselineData,
    converter: &dyn CostConverter,
    apply_scaling: bool,
) -> PrepResult<BTreeMap<AdoptionScheme, MarketSet>> {
    let name = measure.name();
    let spec = &measure.spec;
    let inputs = measure.inputs()?;
    let (primary, secondary) = measure.create_keychain(params)?;
    let years = params.years.as_slice();
    let scale_of = |key: &KeyChain| match (&spec.market_scaling_fractions, apply_scaling) {
        (Some(f), true) => f.fraction(key),
        _ => 1.0,
    };

    let mut chains = Vec::with_capacity(primary.len());
    for key in &primary {
        if !baseline.contains(key) {
            return Err(PrepError::MissingKey(format!("baseline microsegment {key}")));
        }
        let sector = sector_of(params, key)?;
        let scale = scale_of(key);
        let (stock, energy) = baseline_series(baseline, key, years, scale)?;
        let cpl = baseline.get_cpl(key)?;
        let ki = inputs.for_key(name, key)?;
        let (cost_measure, _) =
            converter.convert_costs(sector, key, ki.installed_cost, ki.cost_units, &cpl.cost_units)?;
        let rel_perf = relative_performance(
            name,
            ki.energy_efficiency,
            ki.energy_efficiency_units,
            &cpl.performance,
            &cpl.performance_units,
            spec.energy_efficiency_ref_year,
        )?;
        let nc = params.new_construction(sector)?;
        chains.push(ChainInputs {
            key,
            sector,
            scale,
            stock,
            energy,
            cpl,
            cost_baseline: restrict(&cpl.installed_cost, years)?,
            cost_measure,
            rel_perf: restrict(&rel_perf, years)?,
            added_share: (0..years.len()).map(|i| nc.added_share(key.vintage, i)).collect(),
            life_baseline: restrict(&cpl.lifetime, years)?,
            life_measure: ki.product_lifetime.clone(),
        });
        debug!(measure = name, key = %key, "prepared key chain");
    }

    let mut out = BTreeMap::new();
    for &scheme in &params.adopt_schemes {
        let mut master = MasterMseg::zeros(years);
        let mut adjust = MsegAdjust::default();
        let mut groups: BTreeMap<String, Split<AllMeasure>> = BTreeMap::new();

        for c in &chains {
            let mseg = partition_microsegment(&PartitionInputs {
                scheme,
                years,
                stock: &c.stock,
                energy: &c.energy,
                added_share: &c.added_share,
                retro_rate: params.retro_rate,
                factors: factors(params, c.sector, &c.key.fuel)?,
                rel_perf: &c.rel_perf,
                cost_baseline: &c.cost_baseline,
                cost_measure: &c.cost_measure,
                life_baseline: &c.life_baseline,
                life_measure: &c.life_measure,
                choice: &c.cpl.consumer_choice,
                market_entry_year: spec.market_entry_year,
                market_exit_year: spec.market_exit_year,
            })?;
            master = master.add_keyvals(&mseg)?;
            match groups.entry(c.key.building_group()) {
                Entry::Vacant(e) => {
                    e.insert(mseg.stock.clone());
                }
                Entry::Occupied(mut e) => {
                    let sum = e.get().add_keyvals(&mseg.stock)?;
                    e.insert(sum);
                }
            }
            adjust
                .competed_choice
                .insert(c.key.clone(), c.cpl.consumer_choice.clone());
            adjust.contributing.insert(
                c.key.clone(),
                ContributingMseg {
                    mseg,
                    sub_market_scale: c.scale,
                    lifetime: Lifetime {
                        baseline: c.life_baseline.clone(),
                        measure: c.life_measure.clone(),
                    },
                },
            );
        }

        for (group, stock) in &groups {
            adjust
                .secondary
                .insert(group.clone(), CaptureShares::from_stock(stock)?);
        }

        for key in &secondary {
            let Some(shares) = adjust.secondary.get(&key.building_group()) else {
                continue;
            };
            if !baseline.contains(key) {
                debug!(measure = name, key = %key, "no baseline for secondary microsegment");
                continue;
            }
            let sector = sector_of(params, key)?;
            let (_, energy) = baseline_series(baseline, key, years, scale_of(key))?;
            let savings = spec.secondary_savings.get(&key.end_use).copied().unwrap_or(0.0);
            let rel_perf = YearSeries::constant(years, 1.0 - savings);
            let mseg = partition_secondary(&energy, shares, &rel_perf, &factors(params, sector, &key.fuel)?)?;
            master = master.add_keyvals(&mseg)?;
            adjust.contributing.insert(
                key.clone(),
                ContributingMseg {
                    mseg,
                    sub_market_scale: scale_of(key),
                    lifetime: Lifetime {
                        baseline: YearSeries::zeros(years),
                        measure: Value::Point(0.0),
                    },
                },
            );
        }

        let mseg_out_break = OutputBreakdown::from_contributing(&adjust.contributing, params)?;
        let lifetime = weighted_lifetime(&adjust.contributing, years, params.lifetime_weighting)?;
        debug!(
            measure = name,
            scheme = %scheme,
            chains = adjust.contributing.len(),
            "aggregated markets"
        );
        out.insert(
            scheme,
            MarketSet {
                master_mseg: master,
                mseg_adjust: adjust,
                mseg_out_break,
                lifetime,
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::Vintage;

    const YEARS: [u32; 2] = [2009, 2010];

    fn key(bldg: &str, vintage: Vintage) -> KeyChain {
        KeyChain {
            segment: Segment::Primary,
            region: "AIA_CZ1".into(),
            bldg_type: bldg.into(),
            fuel: "electricity".into(),
            end_use: "water heating".into(),
            load: None,
            technology: Some("electric WH".into()),
            vintage,
        }
    }

    fn record(stock: f64, measure: f64, energy: f64, life_b: f64, life_m: f64) -> ContributingMseg {
        let mut mseg = MasterMseg::zeros(&YEARS);
        mseg.stock.total.all = YearSeries::constant(&YEARS, stock);
        mseg.stock.total.measure = YearSeries::constant(&YEARS, measure);
        mseg.energy.total.baseline = YearSeries::constant(&YEARS, energy);
        ContributingMseg {
            mseg,
            sub_market_scale: 1.0,
            lifetime: Lifetime {
                baseline: YearSeries::constant(&YEARS, life_b),
                measure: Value::Point(life_m),
            },
        }
    }

    fn params() -> GlobalParams {
        let mut p = GlobalParams::reference();
        p.years = YEARS.to_vec();
        p
    }

    #[test]
    fn arithmetic_lifetime_weights_by_stock() {
        let map = BTreeMap::from([
            (key("single family home", Vintage::New), record(30.0, 10.0, 1.0, 10.0, 20.0)),
            (key("mobile home", Vintage::New), record(10.0, 30.0, 1.0, 20.0, 10.0)),
        ]);
        let l = weighted_lifetime(&map, &YEARS, LifetimeWeighting::Arithmetic).unwrap();
        let base = l.baseline.point(2009).unwrap();
        let meas = l.measure.lane(0);
        assert!((base - 12.5).abs() < 1e-12);
        assert!((meas - 12.5).abs() < 1e-12);
    }

    #[test]
    fn harmonic_lifetime() {
        let map = BTreeMap::from([
            (key("single family home", Vintage::New), record(1.0, 1.0, 1.0, 10.0, 10.0)),
            (key("mobile home", Vintage::New), record(1.0, 1.0, 1.0, 40.0, 40.0)),
        ]);
        let l = weighted_lifetime(&map, &YEARS, LifetimeWeighting::Harmonic).unwrap();
        let base = l.baseline.point(2010).unwrap();
        // 2 / (1/10 + 1/40)
        assert!((base - 16.0).abs() < 1e-12);
    }

    #[test]
    fn zero_captured_stock_falls_back_to_plain_mean() {
        let map = BTreeMap::from([
            (key("single family home", Vintage::New), record(1.0, 0.0, 1.0, 10.0, 10.0)),
            (key("mobile home", Vintage::New), record(1.0, 0.0, 1.0, 10.0, 20.0)),
        ]);
        let l = weighted_lifetime(&map, &YEARS, LifetimeWeighting::Arithmetic).unwrap();
        assert_eq!(l.measure, Value::Point(15.0));
    }

    #[test]
    fn breakdown_bins_and_normalizes() {
        let p = params();
        let map = BTreeMap::from([
            (key("single family home", Vintage::New), record(1.0, 0.0, 1.0, 10.0, 10.0)),
            (key("mobile home", Vintage::New), record(1.0, 0.0, 2.0, 10.0, 10.0)),
            (key("mobile home", Vintage::Existing), record(1.0, 0.0, 5.0, 10.0, 10.0)),
        ]);
        let b = OutputBreakdown::from_contributing(&map, &p).unwrap();
        assert_eq!(b.norm, YearSeries::constant(&YEARS, 8.0));
        let fr = b.fractions().unwrap();
        let new_wh = fr
            .get(&["AIA_CZ1", "Residential (New)", "Water Heating"])
            .and_then(Node::leaf)
            .unwrap();
        assert_eq!(new_wh.point(2009).unwrap(), 3.0 / 8.0);
        let existing = fr
            .get(&["AIA_CZ1", "Residential (Existing)", "Water Heating"])
            .and_then(Node::leaf)
            .unwrap();
        assert_eq!(existing.point(2010).unwrap(), 5.0 / 8.0);
    }
}
