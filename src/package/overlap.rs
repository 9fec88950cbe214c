//! Reconciliation of a key chain contributed by more than one measure.

use crate::error::{PrepError, PrepResult};
use crate::mseg::arith::Combine;
use crate::mseg::markets::{ContributingMseg, Lifetime};
use crate::mseg::master::{AllMeasure, BaseEff, CostBlock, MasterMseg, Split};
use crate::series::{Value, YearSeries};

fn first<'a, T>(items: &[&'a T]) -> PrepResult<&'a T> {
    items
        .first()
        .copied()
        .ok_or_else(|| PrepError::StructureMismatch("no records to reconcile".to_string()))
}

fn project<'a, T, U>(items: &[&'a T], f: fn(&'a T) -> &'a U) -> Vec<&'a U> {
    items.iter().map(|t| f(*t)).collect()
}

fn lane_max(series: &[&YearSeries]) -> PrepResult<YearSeries> {
    let mut out = first(series)?.clone();
    for s in &series[1..] {
        out = out.zip_values(s, &|a, b| a.zip_with(b, f64::max))?;
    }
    Ok(out)
}

fn lane_min(a: &YearSeries, b: &YearSeries) -> PrepResult<YearSeries> {
    a.zip_with(b, |x, y| x.zip_with(y, f64::min))
}

/// `base` scaled by the product of every record's efficient-to-baseline ratio.
fn compound(records: &[&BaseEff], base: &YearSeries) -> PrepResult<BaseEff> {
    let mut efficient = base.clone();
    for r in records {
        let ratio = r.efficient.zip_with(&r.baseline, |e, b| {
            e.zip_with(b, |e, b| if b == 0.0 { 1.0 } else { e / b })
        })?;
        efficient = efficient.zip_with(&ratio, |a, b| a.mul(b))?;
    }
    Ok(BaseEff {
        baseline: base.clone(),
        efficient,
    })
}

/// `base` plus every record's incremental amount.
fn incremental(records: &[&BaseEff], base: &YearSeries) -> PrepResult<BaseEff> {
    let mut efficient = base.clone();
    for r in records {
        efficient = efficient.add_keyvals(&r.efficient.sub_keyvals(&r.baseline)?)?;
    }
    Ok(BaseEff {
        baseline: base.clone(),
        efficient,
    })
}

/// Reconciles both halves of a block. The total baseline is taken once; the
/// competed baseline is that total times the reconciled competed share, so it
/// describes the same competed pool as the reconciled stock.
fn split_with(
    records: &[&Split<BaseEff>],
    competed_share: &YearSeries,
    f: fn(&[&BaseEff], &YearSeries) -> PrepResult<BaseEff>,
) -> PrepResult<Split<BaseEff>> {
    let base = &first(records)?.total.baseline;
    let competed_base = base.zip_with(competed_share, |a, b| a.mul(b))?;
    Ok(Split {
        total: f(&project(records, |s| &s.total), base)?,
        competed: f(&project(records, |s| &s.competed), &competed_base)?,
    })
}

fn reconcile_stock(records: &[&Split<AllMeasure>]) -> PrepResult<Split<AllMeasure>> {
    let all = &first(records)?.total.all;
    let competed_all = lane_min(&lane_max(&project(records, |s| &s.competed.all))?, all)?;
    Ok(Split {
        total: AllMeasure {
            all: all.clone(),
            measure: lane_min(&lane_max(&project(records, |s| &s.total.measure))?, all)?,
        },
        competed: AllMeasure {
            measure: lane_min(&lane_max(&project(records, |s| &s.competed.measure))?, &competed_all)?,
            all: competed_all,
        },
    })
}

/// Merges records several measures contributed for the same key chain.
///
/// Baseline quantities are taken once. Efficient energy, carbon, and their
/// costs compound the contributors' relative reductions, and efficient stock
/// cost adds their incremental costs. Competed and captured stock are the
/// largest contributions; competed baselines follow the competed stock.
///
/// # Errors
///
/// Returns `StructureMismatch` for an empty slice or misaligned records.
pub fn reconcile(records: &[&ContributingMseg]) -> PrepResult<ContributingMseg> {
    let head = first(records)?;
    let msegs = project(records, |r| &r.mseg);
    let stock = reconcile_stock(&project(&msegs, |m| &m.stock))?;
    let share = stock
        .competed
        .all
        .zip_with(&stock.total.all, |c, t| c.div_or_zero(t))?;

    let mseg = MasterMseg {
        energy: split_with(&project(&msegs, |m| &m.energy), &share, compound)?,
        carbon: split_with(&project(&msegs, |m| &m.carbon), &share, compound)?,
        cost: CostBlock {
            stock: split_with(&project(&msegs, |m| &m.cost.stock), &share, incremental)?,
            energy: split_with(&project(&msegs, |m| &m.cost.energy), &share, compound)?,
            carbon: split_with(&project(&msegs, |m| &m.cost.carbon), &share, compound)?,
        },
        stock,
    };

    let mut life_sum = Value::Point(0.0);
    for r in records {
        life_sum = life_sum.add(&r.lifetime.measure)?;
    }
    Ok(ContributingMseg {
        mseg,
        sub_market_scale: head.sub_market_scale,
        lifetime: Lifetime {
            baseline: head.lifetime.baseline.clone(),
            measure: life_sum.scale(1.0 / records.len() as f64),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEARS: [u32; 1] = [2009];

    fn record(energy_eff: f64, cost_eff: f64, captured: f64, life: f64) -> ContributingMseg {
        let mut m = MasterMseg::zeros(&YEARS);
        m.stock.total.all = YearSeries::constant(&YEARS, 10.0);
        m.stock.total.measure = YearSeries::constant(&YEARS, captured);
        m.stock.competed.all = YearSeries::constant(&YEARS, 10.0);
        m.stock.competed.measure = YearSeries::constant(&YEARS, captured);
        m.energy.total.baseline = YearSeries::constant(&YEARS, 100.0);
        m.energy.total.efficient = YearSeries::constant(&YEARS, energy_eff);
        m.cost.stock.total.baseline = YearSeries::constant(&YEARS, 1000.0);
        m.cost.stock.total.efficient = YearSeries::constant(&YEARS, cost_eff);
        ContributingMseg {
            mseg: m,
            sub_market_scale: 1.0,
            lifetime: Lifetime {
                baseline: YearSeries::constant(&YEARS, 12.0),
                measure: Value::Point(life),
            },
        }
    }

    #[test]
    fn savings_compound_and_costs_add() {
        let a = record(80.0, 1200.0, 4.0, 10.0);
        let b = record(50.0, 1100.0, 7.0, 20.0);
        let r = reconcile(&[&a, &b]).unwrap();
        let at = |s: &YearSeries| s.point(2009).unwrap();
        assert!((at(&r.mseg.energy.total.efficient) - 40.0).abs() < 1e-9);
        assert_eq!(at(&r.mseg.energy.total.baseline), 100.0);
        assert!((at(&r.mseg.cost.stock.total.efficient) - 1300.0).abs() < 1e-9);
        assert_eq!(at(&r.mseg.stock.total.measure), 7.0);
        assert_eq!(at(&r.mseg.stock.total.all), 10.0);
        assert_eq!(r.lifetime.measure, Value::Point(15.0));
    }

    #[test]
    fn zero_baseline_leaves_efficient_at_zero() {
        let mut a = record(0.0, 1000.0, 1.0, 10.0);
        a.mseg.energy.total.baseline = YearSeries::zeros(&YEARS);
        let b = a.clone();
        let r = reconcile(&[&a, &b]).unwrap();
        assert_eq!(r.mseg.energy.total.efficient.point(2009).unwrap(), 0.0);
    }

    #[test]
    fn competed_baseline_follows_largest_competed_pool() {
        let mut a = record(80.0, 1200.0, 2.0, 10.0);
        a.mseg.stock.competed.all = YearSeries::constant(&YEARS, 4.0);
        a.mseg.energy.competed.baseline = YearSeries::constant(&YEARS, 40.0);
        a.mseg.energy.competed.efficient = YearSeries::constant(&YEARS, 30.0);
        let mut b = record(80.0, 1200.0, 3.0, 10.0);
        b.mseg.stock.competed.all = YearSeries::constant(&YEARS, 6.0);
        b.mseg.energy.competed.baseline = YearSeries::constant(&YEARS, 60.0);
        b.mseg.energy.competed.efficient = YearSeries::constant(&YEARS, 45.0);

        let r = reconcile(&[&a, &b]).unwrap();
        let at = |s: &YearSeries| s.point(2009).unwrap();
        assert_eq!(at(&r.mseg.stock.competed.all), 6.0);
        // 100 total baseline * 6/10 competed
        assert!((at(&r.mseg.energy.competed.baseline) - 60.0).abs() < 1e-9);
        // 60 * (30/40) * (45/60)
        assert!((at(&r.mseg.energy.competed.efficient) - 33.75).abs() < 1e-9);
        assert_eq!(at(&r.mseg.energy.total.baseline), 100.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(reconcile(&[]), Err(PrepError::StructureMismatch(_))));
    }
}
