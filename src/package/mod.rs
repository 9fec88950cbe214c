//! Measure packages: several prepared measures merged into one, with optional
//! synergy benefits.
//!
//! A package borrows its contributors and derives its markets from theirs; it
//! never reads baseline data itself.

pub mod benefits;
pub mod overlap;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PrepError, PrepResult};
use crate::keychain::{KeyChain, Segment};
use crate::measure::{Attributes, Measure, Prepared};
use crate::mseg::arith::Combine;
use crate::mseg::markets::{
    ContributingMseg, MarketSet, MsegAdjust, OutputBreakdown, weighted_lifetime,
};
use crate::mseg::master::{AllMeasure, Split};
use crate::mseg::partition::CaptureShares;
use crate::params::{AdoptionScheme, GlobalParams};

pub use benefits::{Benefits, apply_pkg_benefits};

/// A package as defined in the packages file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    pub name: String,
    pub contributing_measures: Vec<String>,
    #[serde(default)]
    pub benefits: Benefits,
}

/// A derived measure combining the markets of its contributors.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurePackage<'a> {
    pub name: String,
    pub contributing_measures: Vec<String>,
    #[serde(skip)]
    contributors: Vec<&'a Measure>,
    pub benefits: Benefits,
    pub attributes: Option<Attributes>,
    pub markets: Option<BTreeMap<AdoptionScheme, MarketSet>>,
}

impl<'a> MeasurePackage<'a> {
    /// # Errors
    ///
    /// Returns `Validation` for out-of-range benefits or fewer than two
    /// contributors.
    pub fn new(name: &str, contributors: Vec<&'a Measure>, benefits: Benefits) -> PrepResult<Self> {
        benefits.validate(name)?;
        if contributors.len() < 2 {
            return Err(PrepError::validation(
                name,
                "a package needs at least two contributing measures",
            ));
        }
        Ok(Self {
            name: name.to_string(),
            contributing_measures: contributors.iter().map(|m| m.name().to_string()).collect(),
            contributors,
            benefits,
            attributes: None,
            markets: None,
        })
    }

    /// Resolves a package definition against prepared measures.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` when a contributor is not among `measures` (for
    /// example because it failed or was removed), plus any error of
    /// [`MeasurePackage::new`].
    pub fn from_spec(spec: &PackageSpec, measures: &'a [Measure]) -> PrepResult<Self> {
        let contributors = spec
            .contributing_measures
            .iter()
            .map(|name| {
                measures
                    .iter()
                    .find(|m| m.name() == name && !m.remove)
                    .ok_or_else(|| {
                        PrepError::MissingKey(format!(
                            "contributing measure \"{name}\" of package \"{}\"",
                            spec.name
                        ))
                    })
            })
            .collect::<PrepResult<Vec<_>>>()?;
        Self::new(&spec.name, contributors, spec.benefits)
    }

    pub fn contributors(&self) -> &[&'a Measure] {
        &self.contributors
    }

    /// Merges the contributors' markets for every adoption scheme, then
    /// applies the package benefits.
    ///
    /// Key chains contributed by more than one measure are reconciled once
    /// rather than summed per contributor. Lifetimes and the output breakdown
    /// are rebuilt from the merged contributing records.
    ///
    /// # Errors
    ///
    /// Returns `NotPrepared` if any contributor lacks attributes or markets,
    /// and `StructureMismatch` if contributors' records are misaligned.
    pub fn merge_measures(&mut self, params: &GlobalParams) -> PrepResult<()> {
        let mut attributes: Option<Attributes> = None;
        for m in &self.contributors {
            let attrs = m.attributes()?;
            match attributes.as_mut() {
                Some(acc) => acc.union_with(attrs),
                None => attributes = Some(attrs.clone()),
            }
        }

        let mut markets = BTreeMap::new();
        for &scheme in &params.adopt_schemes {
            let sets = self
                .contributors
                .iter()
                .map(|m| m.market(scheme))
                .collect::<PrepResult<Vec<_>>>()?;
            let mut merged = merge_market_sets(&sets, params)?;
            if !self.benefits.is_none() {
                merged.master_mseg = apply_pkg_benefits(&merged.master_mseg, &self.benefits)?;
                for c in merged.mseg_adjust.contributing.values_mut() {
                    c.mseg = apply_pkg_benefits(&c.mseg, &self.benefits)?;
                }
            }
            markets.insert(scheme, merged);
        }

        info!(
            package = %self.name,
            contributors = self.contributors.len(),
            "package merged"
        );
        self.attributes = attributes;
        self.markets = Some(markets);
        Ok(())
    }
}

impl Prepared for MeasurePackage<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn markets(&self) -> Option<&BTreeMap<AdoptionScheme, MarketSet>> {
        self.markets.as_ref()
    }
}

/// Combines one adoption scheme's markets of several measures.
///
/// # Errors
///
/// Returns `StructureMismatch` for an empty slice or misaligned records.
pub fn merge_market_sets(sets: &[&MarketSet], params: &GlobalParams) -> PrepResult<MarketSet> {
    let Some((head, rest)) = sets.split_first() else {
        return Err(PrepError::StructureMismatch("no markets to merge".to_string()));
    };

    let mut master = head.master_mseg.clone();
    for s in rest {
        master = master.add_keyvals(&s.master_mseg)?;
    }

    let mut by_key: BTreeMap<&KeyChain, Vec<&ContributingMseg>> = BTreeMap::new();
    let mut adjust = MsegAdjust::default();
    for s in sets {
        for (key, c) in &s.mseg_adjust.contributing {
            by_key.entry(key).or_default().push(c);
        }
        for (key, choice) in &s.mseg_adjust.competed_choice {
            adjust
                .competed_choice
                .entry(key.clone())
                .or_insert_with(|| choice.clone());
        }
    }

    for (key, records) in by_key {
        let record = match records.as_slice() {
            [single] => (*single).clone(),
            many => {
                let reconciled = overlap::reconcile(many)?;
                for r in many {
                    master = master.sub_keyvals(&r.mseg)?;
                }
                master = master.add_keyvals(&reconciled.mseg)?;
                debug!(key = %key, contributors = many.len(), "reconciled overlapping key chain");
                reconciled
            }
        };
        adjust.contributing.insert(key.clone(), record);
    }

    let mut groups: BTreeMap<String, Split<AllMeasure>> = BTreeMap::new();
    for (key, c) in &adjust.contributing {
        if key.segment == Segment::Secondary {
            continue;
        }
        let stock = match groups.remove(&key.building_group()) {
            Some(acc) => acc.add_keyvals(&c.mseg.stock)?,
            None => c.mseg.stock.clone(),
        };
        groups.insert(key.building_group(), stock);
    }
    for (group, stock) in groups {
        adjust.secondary.insert(group, CaptureShares::from_stock(&stock)?);
    }

    let mseg_out_break = OutputBreakdown::from_contributing(&adjust.contributing, params)?;
    let lifetime = weighted_lifetime(&adjust.contributing, &params.years, params.lifetime_weighting)?;
    Ok(MarketSet {
        master_mseg: master,
        mseg_adjust: adjust,
        mseg_out_break,
        lifetime,
    })
}
