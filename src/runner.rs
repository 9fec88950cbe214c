//! Batch preparation of measures and packages with per-item error isolation.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::baseline::BaselineData;
use crate::convert::CostConverter;
use crate::error::{PrepError, PrepResult};
use crate::measure::{Measure, MeasureSpec};
use crate::package::{MeasurePackage, PackageSpec};
use crate::params::GlobalParams;

/// A measure or package excluded from the batch, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub name: String,
    pub error: PrepError,
}

/// Outcome of preparing a batch of measures.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    /// Measures with populated markets, in input order.
    pub measures: Vec<Measure>,
    pub failures: Vec<Failure>,
    /// Measures dropped for unusable sub-market scaling.
    pub removed: Vec<String>,
}

/// Normalizes one measure and computes its markets.
///
/// # Errors
///
/// Propagates any error of [`Measure::fill_attr`] or [`Measure::fill_mkts`].
pub fn prepare_measure(
    spec: MeasureSpec,
    params: &GlobalParams,
    baseline: &dyn BaselineData,
    converter: &dyn CostConverter,
) -> PrepResult<Measure> {
    let mut measure = Measure::new(spec);
    measure.fill_attr(params)?;
    measure.fill_mkts(params, baseline, converter)?;
    Ok(measure)
}

/// Prepares every measure in `specs`.
///
/// Validation and missing-data errors exclude only the offending measure;
/// measures flagged `remove` are dropped and listed separately.
///
/// # Errors
///
/// Returns the first error that is not specific to one measure (a
/// structural mismatch or lifecycle violation), which points at shared data.
pub fn prepare_measures(
    specs: Vec<MeasureSpec>,
    params: &GlobalParams,
    baseline: &dyn BaselineData,
    converter: &dyn CostConverter,
) -> PrepResult<PreparedBatch> {
    let mut batch = PreparedBatch::default();
    for spec in specs {
        let name = spec.name.clone();
        match prepare_measure(spec, params, baseline, converter) {
            Ok(m) if m.remove => {
                warn!(measure = %name, "measure removed from batch");
                batch.removed.push(name);
            }
            Ok(m) => batch.measures.push(m),
            Err(e) if e.is_per_measure() => {
                warn!(measure = %name, error = %e, "measure excluded");
                batch.failures.push(Failure { name, error: e });
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        prepared = batch.measures.len(),
        failed = batch.failures.len(),
        removed = batch.removed.len(),
        "measure batch complete"
    );
    Ok(batch)
}

/// Builds and merges every package in `specs` from prepared `measures`.
///
/// Packages whose contributors are missing or whose benefits are invalid are
/// returned as failures; the rest are merged.
///
/// # Errors
///
/// Returns the first error not specific to one package.
pub fn prepare_packages<'a>(
    specs: &[PackageSpec],
    measures: &'a [Measure],
    params: &GlobalParams,
) -> PrepResult<(Vec<MeasurePackage<'a>>, Vec<Failure>)> {
    let mut packages = Vec::with_capacity(specs.len());
    let mut failures = Vec::new();
    for spec in specs {
        let merged = MeasurePackage::from_spec(spec, measures).and_then(|mut p| {
            p.merge_measures(params)?;
            Ok(p)
        });
        match merged {
            Ok(p) => packages.push(p),
            Err(e) if e.is_per_measure() => {
                warn!(package = %spec.name, error = %e, "package excluded");
                failures.push(Failure {
                    name: spec.name.clone(),
                    error: e,
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok((packages, failures))
}

/// Reads a JSON array of measure definitions.
///
/// # Errors
///
/// Returns a message if the file cannot be read or parsed.
pub fn load_measure_specs(path: &Path) -> Result<Vec<MeasureSpec>, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read \"{}\": {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid measures \"{}\": {e}", path.display()))
}

/// Reads a JSON array of package definitions.
///
/// # Errors
///
/// Returns a message if the file cannot be read or parsed.
pub fn load_package_specs(path: &Path) -> Result<Vec<PackageSpec>, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read \"{}\": {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid packages \"{}\": {e}", path.display()))
}
