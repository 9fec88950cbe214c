//! Efficiency measures: definition, attribute normalization, and the
//! lifecycle that ends with populated markets.
//!
//! A measure is built from a [`MeasureSpec`], normalized with
//! [`Measure::fill_attr`], and has its markets computed with
//! [`Measure::fill_mkts`]. Markets stay `None` until then; filling again
//! replaces them.

pub mod attributes;
pub mod scaling;
pub mod spec;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::baseline::BaselineData;
use crate::convert::CostConverter;
use crate::distribution::{Distribution, NumInput, Sampler};
use crate::error::{PrepError, PrepResult};
use crate::keychain::KeyChain;
use crate::mseg::markets::{self, MarketSet};
use crate::params::{AdoptionScheme, GlobalParams};
use crate::series::Value;

pub use attributes::Attributes;
use scaling::{ScalingCheck, check_scaling_source};
pub use spec::{AttrSpec, Category, MeasureSpec};

/// Cost, performance, and lifetime inputs after sampling and re-keying.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledInputs {
    pub installed_cost: Category<Value>,
    pub cost_units: Category<String>,
    pub energy_efficiency: Category<Value>,
    pub energy_efficiency_units: Category<String>,
    pub product_lifetime: Category<Value>,
}

/// Resolved inputs of one key chain.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInputs<'a> {
    pub installed_cost: &'a Value,
    pub cost_units: &'a str,
    pub energy_efficiency: &'a Value,
    pub energy_efficiency_units: &'a str,
    pub product_lifetime: &'a Value,
}

impl SampledInputs {
    /// Inputs applying to `key`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming `measure` if any input has no value for `key`.
    pub fn for_key(&self, measure: &str, key: &KeyChain) -> PrepResult<KeyInputs<'_>> {
        fn pick<'a, T: ?Sized>(
            measure: &str,
            key: &KeyChain,
            field: &str,
            v: Option<&'a T>,
        ) -> PrepResult<&'a T> {
            v.ok_or_else(|| PrepError::validation(measure, format!("no {field} applies to {key}")))
        }
        Ok(KeyInputs {
            installed_cost: pick(measure, key, "installed_cost", self.installed_cost.resolve(key))?,
            cost_units: pick(measure, key, "cost_units", self.cost_units.resolve(key).map(String::as_str))?,
            energy_efficiency: pick(measure, key, "energy_efficiency", self.energy_efficiency.resolve(key))?,
            energy_efficiency_units: pick(
                measure,
                key,
                "energy_efficiency_units",
                self.energy_efficiency_units.resolve(key).map(String::as_str),
            )?,
            product_lifetime: pick(measure, key, "product_lifetime", self.product_lifetime.resolve(key))?,
        })
    }
}

/// An efficiency measure.
#[derive(Debug, Clone, Serialize)]
pub struct Measure {
    #[serde(flatten)]
    pub spec: MeasureSpec,
    /// Expanded applicability; `None` until [`Measure::fill_attr`].
    pub attributes: Option<Attributes>,
    #[serde(skip)]
    pub inputs: Option<SampledInputs>,
    /// Set when sub-market scaling has no usable attribution; the measure is
    /// excluded from packaging and reporting.
    pub remove: bool,
    pub warnings: Vec<String>,
    pub markets: Option<BTreeMap<AdoptionScheme, MarketSet>>,
}

impl Measure {
    pub fn new(spec: MeasureSpec) -> Self {
        Self {
            spec,
            attributes: None,
            inputs: None,
            remove: false,
            warnings: Vec::new(),
            markets: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Expands shorthand attributes, validates them against the registry, and
    /// draws samples for distribution-valued inputs.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the measure for unknown values, invalid
    /// fuel/end-use/technology combinations, or bad distribution parameters.
    pub fn fill_attr(&mut self, params: &GlobalParams) -> PrepResult<()> {
        let registry = &params.registry;
        let attrs = attributes::normalize(&self.spec, registry)?;
        attributes::check_mkt_inputs(&self.spec, &attrs, registry)?;

        let name = self.spec.name.clone();
        let mut sampler = Sampler::for_measure(params.seed, &name, params.n_samples);
        let mut draw = |input: &NumInput| -> PrepResult<Value> {
            let dist = Distribution::from_input(input).map_err(|e| PrepError::validation(&name, e))?;
            sampler.draw(&dist, &name)
        };
        let expand = |k: &str| attributes::expand_category_key(registry, k);

        let installed_cost = self.spec.installed_cost.try_map(&mut draw)?;
        let energy_efficiency = self.spec.energy_efficiency.try_map(&mut draw)?;
        let product_lifetime = self.spec.product_lifetime.try_map(&mut draw)?;
        self.inputs = Some(SampledInputs {
            installed_cost: installed_cost.rekey(&expand),
            cost_units: self.spec.cost_units.rekey(&expand),
            energy_efficiency: energy_efficiency.rekey(&expand),
            energy_efficiency_units: self.spec.energy_efficiency_units.rekey(&expand),
            product_lifetime: product_lifetime.rekey(&expand),
        });
        self.attributes = Some(attrs);
        Ok(())
    }

    /// Checks the measure's attributes against the registry.
    ///
    /// # Errors
    ///
    /// Returns `NotPrepared` before [`Measure::fill_attr`], otherwise any
    /// `Validation` error found.
    pub fn check_mkt_inputs(&self, params: &GlobalParams) -> PrepResult<()> {
        let attrs = self.attributes()?;
        attributes::check_mkt_inputs(&self.spec, attrs, &params.registry)
    }

    /// Primary key chains followed by secondary key chains.
    ///
    /// # Errors
    ///
    /// Returns `NotPrepared` before [`Measure::fill_attr`] and `Validation`
    /// if the attributes cover no primary microsegment.
    pub fn create_keychain(&self, params: &GlobalParams) -> PrepResult<(Vec<KeyChain>, Vec<KeyChain>)> {
        let attrs = self.attributes()?;
        let primary = attributes::primary_keychains(attrs, &params.registry);
        if primary.is_empty() {
            return Err(PrepError::validation(
                self.name(),
                "attributes cover no baseline microsegment",
            ));
        }
        let secondary = attributes::secondary_keychains(
            attrs,
            self.spec.secondary_savings.keys().cloned(),
            &params.registry,
        );
        Ok((primary, secondary))
    }

    /// Computes the measure's markets for every adoption scheme.
    ///
    /// Sub-market scaling without any usable attribution marks the measure
    /// `remove` and leaves markets unset; incomplete attribution records a
    /// warning and ignores the scaling. Warnings and `remove` are reset on
    /// every call.
    ///
    /// # Errors
    ///
    /// Returns `NotPrepared` before [`Measure::fill_attr`], `MissingKey` for
    /// absent baseline data or conversion factors, and `Validation` naming
    /// the measure for inconsistent inputs.
    pub fn fill_mkts(
        &mut self,
        params: &GlobalParams,
        baseline: &dyn BaselineData,
        converter: &dyn CostConverter,
    ) -> PrepResult<()> {
        self.attributes()?;
        self.warnings.clear();
        self.remove = false;
        let mut apply_scaling = self.spec.market_scaling_fractions.is_some();
        if apply_scaling {
            match check_scaling_source(self.spec.market_scaling_fractions_source.as_ref()) {
                ScalingCheck::Valid => {}
                ScalingCheck::Degraded(warnings) => {
                    for w in warnings {
                        warn!(measure = %self.name(), "{w}; sub-market scaling set to 1");
                        self.warnings.push(w);
                    }
                    apply_scaling = false;
                }
                ScalingCheck::Unusable => {
                    let w = "sub-market scaling has no source attribution".to_string();
                    warn!(measure = %self.name(), "{w}; measure removed");
                    self.warnings.push(w);
                    self.remove = true;
                    self.markets = None;
                    return Ok(());
                }
            }
        }

        let name = self.name().to_string();
        let computed = markets::fill_mkts(self, params, baseline, converter, apply_scaling).map_err(|e| match e {
            PrepError::Validation { message, .. } => PrepError::validation(&name, message),
            other => other,
        })?;
        info!(measure = %name, schemes = computed.len(), "markets filled");
        self.markets = Some(computed);
        Ok(())
    }

    pub fn attributes(&self) -> PrepResult<&Attributes> {
        self.attributes
            .as_ref()
            .ok_or_else(|| PrepError::NotPrepared(format!("attributes of \"{}\" are not filled", self.name())))
    }

    pub fn inputs(&self) -> PrepResult<&SampledInputs> {
        self.inputs
            .as_ref()
            .ok_or_else(|| PrepError::NotPrepared(format!("inputs of \"{}\" are not sampled", self.name())))
    }

    /// Markets of one adoption scheme.
    ///
    /// # Errors
    ///
    /// Returns `NotPrepared` if markets are unset or lack `scheme`.
    pub fn market(&self, scheme: AdoptionScheme) -> PrepResult<&MarketSet> {
        self.markets
            .as_ref()
            .and_then(|m| m.get(&scheme))
            .ok_or_else(|| PrepError::NotPrepared(format!("\"{}\" has no {scheme} markets", self.name())))
    }
}

/// Anything with populated markets that can be reported on.
pub trait Prepared {
    fn name(&self) -> &str;
    fn markets(&self) -> Option<&BTreeMap<AdoptionScheme, MarketSet>>;
}

impl Prepared for Measure {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn markets(&self) -> Option<&BTreeMap<AdoptionScheme, MarketSet>> {
        self.markets.as_ref()
    }
}
