//! Stock-turnover and competition calculator for a single key chain.
//!
//! The rollover runs once per sample lane with scalar arithmetic; lane results
//! are then reassembled into [`Value`]s so point inputs stay points and sampled
//! inputs produce sample arrays of the same length.

use serde::Serialize;
use tracing::debug;

use crate::baseline::ChoiceParams;
use crate::error::{PrepError, PrepResult};
use crate::mseg::choice::{ChoiceInputs, capture_fraction};
use crate::mseg::master::{AllMeasure, BaseEff, CostBlock, MasterMseg, Split};
use crate::params::AdoptionScheme;
use crate::series::{Value, YearSeries};

/// Per-year conversion factors for one fuel and sector.
#[derive(Debug, Clone, Copy)]
pub struct Factors<'a> {
    pub site_source: &'a YearSeries,
    pub carbon_intensity: &'a YearSeries,
    pub fuel_price: &'a YearSeries,
    pub carbon_price: &'a YearSeries,
}

/// Inputs to [`partition_microsegment`].
///
/// `stock` and `energy` are baseline figures after sub-market scaling;
/// `energy` is site energy. Costs are per unit in the baseline cost basis.
#[derive(Debug, Clone, Copy)]
pub struct PartitionInputs<'a> {
    pub scheme: AdoptionScheme,
    pub years: &'a [u32],
    pub stock: &'a YearSeries,
    pub energy: &'a YearSeries,
    /// Newly built share of `stock`, aligned with `years`.
    pub added_share: &'a [f64],
    pub retro_rate: f64,
    pub factors: Factors<'a>,
    pub rel_perf: &'a YearSeries,
    pub cost_baseline: &'a YearSeries,
    pub cost_measure: &'a Value,
    pub life_baseline: &'a YearSeries,
    pub life_measure: &'a Value,
    pub choice: &'a ChoiceParams,
    pub market_entry_year: Option<u32>,
    pub market_exit_year: Option<u32>,
}

/// Shares of total stock that are measure-captured, competed, and
/// competed-and-captured, by year.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CaptureShares {
    pub measure: YearSeries,
    pub competed: YearSeries,
    pub competed_measure: YearSeries,
}

impl CaptureShares {
    /// Shares implied by a record's stock block.
    pub fn from_stock(stock: &Split<AllMeasure>) -> PrepResult<Self> {
        let all = &stock.total.all;
        let ratio = |s: &YearSeries| s.zip_with(all, |a, b| a.div_or_zero(b));
        Ok(Self {
            measure: ratio(&stock.total.measure)?,
            competed: ratio(&stock.competed.all)?,
            competed_measure: ratio(&stock.competed.measure)?,
        })
    }
}

struct Rollover {
    competed: Vec<f64>,
    captured: Vec<f64>,
    measure: Vec<f64>,
}

fn check_lanes(n: usize, v: &Value) -> PrepResult<()> {
    match v {
        Value::Draws(d) if d.len() != n => Err(PrepError::StructureMismatch(format!(
            "sample arrays of length {} and {n}",
            d.len()
        ))),
        _ => Ok(()),
    }
}

fn lane_count(inp: &PartitionInputs<'_>) -> PrepResult<usize> {
    let series = [inp.rel_perf, inp.cost_baseline, inp.life_baseline];
    let n = series
        .iter()
        .map(|s| s.lanes())
        .chain([inp.cost_measure.lanes(), inp.life_measure.lanes()])
        .max()
        .unwrap_or(1);
    for s in series {
        for (_, v) in s.iter() {
            check_lanes(n, v)?;
        }
    }
    check_lanes(n, inp.cost_measure)?;
    check_lanes(n, inp.life_measure)?;
    Ok(n)
}

/// Runs the stock rollover for one sample lane.
fn rollover_lane(inp: &PartitionInputs<'_>, energy_src: &YearSeries, lane: usize) -> PrepResult<Rollover> {
    let first = inp.years.first().copied().unwrap_or_default();
    let entry = inp.market_entry_year.unwrap_or(first);
    let life_measure = inp.life_measure.lane(lane).round().max(1.0) as usize;
    let f = &inp.factors;

    let mut out = Rollover {
        competed: Vec::with_capacity(inp.years.len()),
        captured: Vec::with_capacity(inp.years.len()),
        measure: Vec::with_capacity(inp.years.len()),
    };
    let mut cohorts: Vec<(usize, f64)> = Vec::new();
    let mut held = 0.0;
    let mut held_since: Option<usize> = None;

    for (i, &y) in inp.years.iter().enumerate() {
        let total = inp.stock.point(y)?;
        let active = y >= entry && inp.market_exit_year.is_none_or(|exit| y < exit);

        let capture = if active {
            let per_unit_energy = if total > 0.0 {
                energy_src.get(y)?.lane(lane) / total
            } else {
                0.0
            };
            let unit_price = f.fuel_price.point(y)? + f.carbon_intensity.point(y)? * f.carbon_price.point(y)?;
            let op_cost_baseline = per_unit_energy * unit_price;
            capture_fraction(
                inp.scheme,
                &ChoiceInputs {
                    b1: inp.choice.b1.point(y)?,
                    b2: inp.choice.b2.point(y)?,
                    p: inp.choice.p,
                    q: inp.choice.q,
                    cost_baseline: inp.cost_baseline.get(y)?.lane(lane),
                    cost_measure: inp.cost_measure.lane(lane),
                    op_cost_baseline,
                    op_cost_measure: op_cost_baseline * inp.rel_perf.get(y)?.lane(lane),
                    periods: f64::from(y.saturating_sub(entry)) + 1.0,
                },
            )
        } else {
            0.0
        };

        let (competed, captured, measure) = match inp.scheme {
            AdoptionScheme::TechnicalPotential => {
                if active {
                    if capture > 0.0 && held_since.is_none() {
                        held_since = Some(i);
                    }
                    held = total * capture;
                    (total, held, held)
                } else {
                    // after exit, units already captured stay until their end of life
                    let alive = held_since.is_some_and(|start| i < start.saturating_add(life_measure));
                    (total, 0.0, if alive { held.min(total) } else { 0.0 })
                }
            }
            AdoptionScheme::MaxAdoptionPotential => {
                let added = total * inp.added_share.get(i).copied().unwrap_or(0.0);
                let expired: f64 = cohorts
                    .iter()
                    .filter(|(start, _)| start.saturating_add(life_measure) == i)
                    .map(|(_, units)| units)
                    .sum();
                cohorts.retain(|(start, _)| start.saturating_add(life_measure) > i);
                let surviving: f64 = cohorts.iter().map(|(_, units)| units).sum();

                let non_measure = (total - surviving).max(0.0);
                let eligible_old = (non_measure - added).max(0.0);
                let end_of_life = expired.min(eligible_old);
                let life_baseline = inp.life_baseline.get(y)?.lane(lane);
                let turnover = if life_baseline > 0.0 {
                    (1.0 / life_baseline + inp.retro_rate).min(1.0)
                } else {
                    1.0
                };
                let competed = (added + end_of_life + (eligible_old - end_of_life) * turnover)
                    .min(non_measure);
                let captured = competed * capture;
                cohorts.push((i, captured));
                (competed, captured, (surviving + captured).min(total))
            }
        };
        out.competed.push(competed);
        out.captured.push(captured);
        out.measure.push(measure);
    }
    Ok(out)
}

fn scale_by(be: &BaseEff, factor: &YearSeries) -> PrepResult<BaseEff> {
    Ok(BaseEff {
        baseline: be.baseline.zip_with(factor, |a, b| a.mul(b))?,
        efficient: be.efficient.zip_with(factor, |a, b| a.mul(b))?,
    })
}

/// Source energy split by capture shares: captured units use `rel_perf` times
/// baseline energy, every other unit uses baseline energy.
fn energy_split(energy_src: &YearSeries, shares: &CaptureShares, rel_perf: &YearSeries) -> PrepResult<Split<BaseEff>> {
    let mut out = Split::<BaseEff>::default();
    for (y, eb) in energy_src.iter() {
        let saving = rel_perf.get(y)?.map(|rp| 1.0 - rp);
        let f_m = shares.measure.get(y)?;
        let f_c = shares.competed.get(y)?;
        let f_k = shares.competed_measure.get(y)?;

        let total_eff = f_m.mul(&saving)?.map(|x| 1.0 - x);
        let comp_eff = f_c.sub(&f_k.mul(&saving)?)?;

        out.total.baseline.insert(y, eb.clone());
        out.total.efficient.insert(y, eb.mul(&total_eff)?);
        out.competed.baseline.insert(y, eb.mul(f_c)?);
        out.competed.efficient.insert(y, eb.mul(&comp_eff)?);
    }
    Ok(out)
}

/// Carbon, energy-cost, and carbon-cost blocks derived from source energy.
fn energy_derived(energy: &Split<BaseEff>, f: &Factors<'_>) -> PrepResult<(Split<BaseEff>, Split<BaseEff>, Split<BaseEff>)> {
    let carbon = energy.try_map(|be| scale_by(be, f.carbon_intensity))?;
    let energy_cost = energy.try_map(|be| scale_by(be, f.fuel_price))?;
    let carbon_cost = carbon.try_map(|be| scale_by(be, f.carbon_price))?;
    Ok((carbon, energy_cost, carbon_cost))
}

/// Computes the master microsegment of one primary key chain under one
/// adoption scheme.
///
/// # Errors
///
/// Returns `MissingKey` when an input series lacks a modeled year and
/// `StructureMismatch` when sample arrays differ in length.
pub fn partition_microsegment(inp: &PartitionInputs<'_>) -> PrepResult<MasterMseg> {
    let lanes = lane_count(inp)?;
    let energy_src = inp
        .energy
        .zip_with(inp.factors.site_source, |a, b| a.mul(b))?;
    let rollovers = (0..lanes)
        .map(|l| rollover_lane(inp, &energy_src, l))
        .collect::<PrepResult<Vec<_>>>()?;
    debug!(scheme = %inp.scheme, lanes, "partitioned microsegment");

    let gather = |i: usize, pick: fn(&Rollover) -> &Vec<f64>| {
        Value::from_lanes(
            rollovers
                .iter()
                .map(|r| pick(r).get(i).copied().unwrap_or(0.0))
                .collect(),
        )
    };

    let mut stock = Split::<AllMeasure>::default();
    let mut stock_cost = Split::<BaseEff>::default();
    for (i, &y) in inp.years.iter().enumerate() {
        let total = inp.stock.get(y)?.clone();
        let competed = gather(i, |r| &r.competed);
        let captured = gather(i, |r| &r.captured);
        let measure = gather(i, |r| &r.measure);

        let cb = inp.cost_baseline.get(y)?;
        let cm = inp.cost_measure;
        // efficient cost = captured units at measure cost + the rest at baseline cost
        let mixed = |units: &Value, of: &Value| -> PrepResult<Value> {
            units.mul(cm)?.add(&of.sub(units)?.mul(cb)?)
        };
        stock_cost.total.baseline.insert(y, total.mul(cb)?);
        stock_cost.total.efficient.insert(y, mixed(&measure, &total)?);
        stock_cost.competed.baseline.insert(y, competed.mul(cb)?);
        stock_cost.competed.efficient.insert(y, mixed(&captured, &competed)?);

        stock.total.all.insert(y, total);
        stock.total.measure.insert(y, measure);
        stock.competed.all.insert(y, competed);
        stock.competed.measure.insert(y, captured);
    }

    let shares = CaptureShares::from_stock(&stock)?;
    let energy = energy_split(&energy_src, &shares, inp.rel_perf)?;
    let (carbon, energy_cost, carbon_cost) = energy_derived(&energy, &inp.factors)?;

    Ok(MasterMseg {
        stock,
        energy,
        carbon,
        cost: CostBlock {
            stock: stock_cost,
            energy: energy_cost,
            carbon: carbon_cost,
        },
    })
}

/// Computes a secondary microsegment: a coupled load with no stock of its own
/// whose efficient energy follows the capture shares of the measure's
/// primary microsegments.
///
/// # Errors
///
/// Returns `MissingKey` when shares or factors lack a year of `energy`.
pub fn partition_secondary(
    energy: &YearSeries,
    shares: &CaptureShares,
    rel_perf: &YearSeries,
    factors: &Factors<'_>,
) -> PrepResult<MasterMseg> {
    let years: Vec<u32> = energy.years().collect();
    let energy_src = energy.zip_with(factors.site_source, |a, b| a.mul(b))?;
    let energy = energy_split(&energy_src, shares, rel_perf)?;
    let (carbon, energy_cost, carbon_cost) = energy_derived(&energy, factors)?;
    let zeros = MasterMseg::zeros(&years);
    Ok(MasterMseg {
        energy,
        carbon,
        cost: CostBlock {
            energy: energy_cost,
            carbon: carbon_cost,
            ..zeros.cost
        },
        ..zeros
    })
}
