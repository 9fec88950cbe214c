//! Package merging across prepared water-heating measures.

mod common;

use common::*;
use ecm_prep::error::PrepError;
use ecm_prep::measure::{Measure, Prepared};
use ecm_prep::mseg::Combine;
use ecm_prep::package::{Benefits, MeasurePackage, PackageSpec, apply_pkg_benefits};
use ecm_prep::params::AdoptionScheme;
use ecm_prep::runner::prepare_packages;
use ecm_prep::summary::Summary;
use serde_json::json;

const TP: AdoptionScheme = AdoptionScheme::TechnicalPotential;

fn package_spec(name: &str, members: &[&str], benefits: Benefits) -> PackageSpec {
    PackageSpec {
        name: name.to_string(),
        contributing_measures: members.iter().map(|m| m.to_string()).collect(),
        benefits,
    }
}

fn disjoint_pair() -> Vec<Measure> {
    let params = test_params();
    vec![
        prepare(wh_spec("Single family WH", json!({})), &params),
        prepare(wh_spec("Mobile home WH", json!({"bldg_type": "mobile home"})), &params),
    ]
}

fn overlapping_pair() -> Vec<Measure> {
    let params = test_params();
    vec![
        prepare(wh_spec("Good WH", json!({})), &params),
        prepare(wh_spec("Better WH", json!({"energy_efficiency": 30})), &params),
    ]
}

#[test]
fn disjoint_contributors_sum_exactly() {
    let params = test_params();
    let measures = disjoint_pair();
    let mut pkg = MeasurePackage::new("WH bundle", measures.iter().collect(), Benefits::default())
        .expect("valid package");
    pkg.merge_measures(&params).expect("merge");

    for &scheme in &params.adopt_schemes {
        let a = &measures[0].market(scheme).expect("first").master_mseg;
        let b = &measures[1].market(scheme).expect("second").master_mseg;
        let merged = &pkg.markets.as_ref().expect("markets")[&scheme];
        assert_eq!(merged.master_mseg, a.add_keyvals(b).expect("aligned"), "{scheme}");
        assert_eq!(merged.mseg_adjust.contributing.len(), 2);
    }

    let attrs = pkg.attributes.as_ref().expect("attributes");
    assert!(attrs.bldg_type.contains(&"single family home".to_string()));
    assert!(attrs.bldg_type.contains(&"mobile home".to_string()));
}

#[test]
fn overlapping_contributors_count_baseline_once() {
    let params = test_params();
    let measures = overlapping_pair();
    let mut pkg = MeasurePackage::new("Stacked WH", measures.iter().collect(), Benefits::default())
        .expect("valid package");
    pkg.merge_measures(&params).expect("merge");

    let a = &measures[0].market(TP).expect("first").master_mseg;
    let b = &measures[1].market(TP).expect("second").master_mseg;
    let naive = a.add_keyvals(b).expect("aligned");
    let merged = &pkg.markets.as_ref().expect("markets")[&TP];

    assert_ne!(merged.master_mseg, naive);
    assert_eq!(merged.mseg_adjust.contributing.len(), 1);
    let m = &merged.master_mseg;
    assert!((at(&m.energy.total.baseline, 2009) - 15.15).abs() < 1e-9);
    assert!((at(&m.stock.total.all, 2009) - 10.0).abs() < 1e-9);
    // savings compound: 15.15 * (18/25) * (18/30)
    assert!((at(&m.energy.total.efficient, 2009) - 6.5448).abs() < 1e-9);
    assert!(at(&m.stock.total.measure, 2009) <= at(&m.stock.total.all, 2009));
}

#[test]
fn benefits_apply_on_top_of_the_merge() {
    let params = test_params();
    let measures = disjoint_pair();
    let mut plain = MeasurePackage::new("Plain", measures.iter().collect(), Benefits::default())
        .expect("valid package");
    plain.merge_measures(&params).expect("merge");
    let benefits = Benefits {
        energy_savings_increase: 0.3,
        cost_reduction: 0.1,
    };
    let mut boosted = MeasurePackage::new("Boosted", measures.iter().collect(), benefits)
        .expect("valid package");
    boosted.merge_measures(&params).expect("merge");

    for &scheme in &params.adopt_schemes {
        let base = &plain.markets.as_ref().expect("plain markets")[&scheme];
        let expected = apply_pkg_benefits(&base.master_mseg, &benefits).expect("benefits");
        let got = &boosted.markets.as_ref().expect("boosted markets")[&scheme];
        assert_eq!(got.master_mseg, expected, "{scheme}");
        assert_eq!(got.master_mseg.stock, base.master_mseg.stock);
    }

    let got = &boosted.markets.as_ref().expect("boosted markets")[&TP].master_mseg;
    let base = &plain.markets.as_ref().expect("plain markets")[&TP].master_mseg;
    assert!(at(&got.energy.total.efficient, 2009) < at(&base.energy.total.efficient, 2009));
    assert!(at(&got.energy.total.efficient, 2009) >= 0.0);
}

#[test]
fn package_construction_is_validated() {
    let measures = disjoint_pair();
    let too_few = MeasurePackage::new("Lonely", vec![&measures[0]], Benefits::default());
    assert!(matches!(too_few, Err(PrepError::Validation { .. })));

    let bad_benefits = Benefits {
        energy_savings_increase: 0.0,
        cost_reduction: 1.5,
    };
    let invalid = MeasurePackage::new("Overpromised", measures.iter().collect(), bad_benefits);
    assert!(matches!(invalid, Err(PrepError::Validation { measure, .. }) if measure == "Overpromised"));

    let spec = package_spec("Ghost bundle", &["Single family WH", "Ghost WH"], Benefits::default());
    assert!(matches!(
        MeasurePackage::from_spec(&spec, &measures),
        Err(PrepError::MissingKey(_))
    ));
}

#[test]
fn unprepared_contributors_cannot_merge() {
    let params = test_params();
    let prepared = prepare(wh_spec("Single family WH", json!({})), &params);
    let mut bare = Measure::new(wh_spec("Mobile home WH", json!({"bldg_type": "mobile home"})));
    bare.fill_attr(&params).expect("attributes");

    let mut pkg = MeasurePackage::new("Half ready", vec![&prepared, &bare], Benefits::default())
        .expect("valid package");
    assert!(matches!(pkg.merge_measures(&params), Err(PrepError::NotPrepared(_))));
    assert!(pkg.markets.is_none());
}

#[test]
fn batch_packages_isolate_failures_and_feed_the_summary() {
    let params = test_params();
    let measures = disjoint_pair();
    let specs = vec![
        package_spec("WH bundle", &["Single family WH", "Mobile home WH"], Benefits::default()),
        package_spec("Ghost bundle", &["Single family WH", "Ghost WH"], Benefits::default()),
    ];
    let (packages, failures) = prepare_packages(&specs, &measures, &params).expect("batch");
    assert_eq!(packages.len(), 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "Ghost bundle");

    let mut items: Vec<&dyn Prepared> = measures.iter().map(|m| m as &dyn Prepared).collect();
    items.extend(packages.iter().map(|p| p as &dyn Prepared));
    let summary = Summary::from_prepared(&items).expect("summary");
    assert_eq!(summary.rows.len(), 3 * params.adopt_schemes.len() * YEARS.len());

    let bundle_rows: Vec<_> = summary.rows.iter().filter(|r| r.measure == "WH bundle").collect();
    let sf_rows: Vec<_> = summary
        .rows
        .iter()
        .filter(|r| r.measure == "Single family WH")
        .collect();
    for (bundle, sf) in bundle_rows.iter().zip(&sf_rows) {
        assert!(bundle.energy.savings.mean > sf.energy.savings.mean);
    }
}
