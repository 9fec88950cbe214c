//! Probability distributions on measure inputs and measure-scoped sampling.

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution as _, LogNormal, Normal, Triangular, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};
use crate::series::Value;

/// Numeric input as written in a measure definition: a bare number or a
/// `["kind", params...]` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumInput {
    Number(f64),
    TwoParam(String, f64, f64),
    ThreeParam(String, f64, f64, f64),
}

/// A point estimate or a probability distribution over an input.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Point(f64),
    Normal { mean: f64, sd: f64 },
    /// Parameters are those of the underlying normal.
    LogNormal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
    Triangular { low: f64, mode: f64, high: f64 },
}

impl Distribution {
    /// Parses a definition-file input.
    ///
    /// # Errors
    ///
    /// Returns a message if the kind is unknown or takes a different number
    /// of parameters.
    pub fn from_input(input: &NumInput) -> Result<Self, String> {
        match input {
            NumInput::Number(v) => Ok(Distribution::Point(*v)),
            NumInput::TwoParam(kind, a, b) => match kind.as_str() {
                "normal" => Ok(Distribution::Normal { mean: *a, sd: *b }),
                "lognormal" => Ok(Distribution::LogNormal { mean: *a, sd: *b }),
                "uniform" => Ok(Distribution::Uniform { low: *a, high: *b }),
                other => Err(format!("unknown two-parameter distribution \"{other}\"")),
            },
            NumInput::ThreeParam(kind, a, b, c) => match kind.as_str() {
                "triangular" => Ok(Distribution::Triangular {
                    low: *a,
                    mode: *b,
                    high: *c,
                }),
                other => Err(format!("unknown three-parameter distribution \"{other}\"")),
            },
        }
    }

    /// Expected value of the distribution.
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Point(v) => v,
            Distribution::Normal { mean, .. } => mean,
            Distribution::LogNormal { mean, sd } => (mean + sd * sd / 2.0).exp(),
            Distribution::Uniform { low, high } => (low + high) / 2.0,
            Distribution::Triangular { low, mode, high } => (low + mode + high) / 3.0,
        }
    }
}

/// Random source scoped to one measure.
///
/// Seeded from the global seed mixed with a stable hash of the measure name so
/// results do not depend on the order measures are processed in.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
    n_samples: usize,
}

impl Sampler {
    pub fn for_measure(seed: u64, measure_name: &str, n_samples: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed ^ name_hash(measure_name)),
            n_samples: n_samples.max(1),
        }
    }

    /// Draws the fixed-length sample array for `dist`; points are not sampled.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming `measure` for invalid parameters
    /// (negative spread, inverted bounds).
    pub fn draw(&mut self, dist: &Distribution, measure: &str) -> PrepResult<Value> {
        let n = self.n_samples;
        let invalid = |e: String| PrepError::validation(measure, e);
        let draws: Vec<f64> = match *dist {
            Distribution::Point(v) => return Ok(Value::Point(v)),
            Distribution::Normal { mean, sd } => {
                check_spread("normal", mean, sd).map_err(invalid)?;
                let d = Normal::new(mean, sd).map_err(|e| invalid(format!("normal: {e}")))?;
                (0..n).map(|_| d.sample(&mut self.rng)).collect()
            }
            Distribution::LogNormal { mean, sd } => {
                check_spread("lognormal", mean, sd).map_err(invalid)?;
                let d = LogNormal::new(mean, sd).map_err(|e| invalid(format!("lognormal: {e}")))?;
                (0..n).map(|_| d.sample(&mut self.rng)).collect()
            }
            Distribution::Uniform { low, high } => {
                let d = Uniform::new(low, high).map_err(|e| invalid(format!("uniform: {e}")))?;
                (0..n).map(|_| d.sample(&mut self.rng)).collect()
            }
            Distribution::Triangular { low, mode, high } => {
                let d = Triangular::new(low, high, mode)
                    .map_err(|e| invalid(format!("triangular: {e}")))?;
                (0..n).map(|_| d.sample(&mut self.rng)).collect()
            }
        };
        Ok(Value::Draws(draws))
    }
}

/// Spread parameters must be finite and non-negative; rand_distr accepts a
/// negative sd and reflects it.
fn check_spread(kind: &str, mean: f64, sd: f64) -> Result<(), String> {
    if !mean.is_finite() || !sd.is_finite() || sd < 0.0 {
        return Err(format!("{kind}: mean {mean} and sd {sd} must be finite with sd >= 0"));
    }
    Ok(())
}

/// FNV-1a over the measure name.
fn name_hash(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    name.bytes()
        .fold(OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inputs() {
        let n: NumInput = serde_json::from_str(r#"["normal", 10.0, 2.0]"#).unwrap();
        assert_eq!(
            Distribution::from_input(&n),
            Ok(Distribution::Normal { mean: 10.0, sd: 2.0 })
        );
        let t: NumInput = serde_json::from_str(r#"["triangular", 1.0, 2.0, 4.0]"#).unwrap();
        assert!(matches!(
            Distribution::from_input(&t),
            Ok(Distribution::Triangular { .. })
        ));
        let p: NumInput = serde_json::from_str("3.5").unwrap();
        assert_eq!(Distribution::from_input(&p), Ok(Distribution::Point(3.5)));
        let bad: NumInput = serde_json::from_str(r#"["gamma", 1.0, 2.0]"#).unwrap();
        assert!(Distribution::from_input(&bad).is_err());
    }

    #[test]
    fn point_is_not_sampled() {
        let mut s = Sampler::for_measure(42, "m", 100);
        let v = s.draw(&Distribution::Point(2.0), "m").unwrap();
        assert_eq!(v, Value::Point(2.0));
    }

    #[test]
    fn seed_determinism_per_measure() {
        let d = Distribution::Normal { mean: 5.0, sd: 1.0 };
        let a = Sampler::for_measure(42, "m1", 50).draw(&d, "m1").unwrap();
        let b = Sampler::for_measure(42, "m1", 50).draw(&d, "m1").unwrap();
        let c = Sampler::for_measure(42, "m2", 50).draw(&d, "m2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.lanes(), 50);
    }

    #[test]
    fn sample_mean_near_distribution_mean() {
        let d = Distribution::Triangular {
            low: 1.0,
            mode: 2.0,
            high: 6.0,
        };
        let v = Sampler::for_measure(7, "tri", 5000).draw(&d, "tri").unwrap();
        assert!((v.mean() - d.mean()).abs() < 0.05, "mean {}", v.mean());
    }

    #[test]
    fn negative_sd_is_validation_error() {
        let d = Distribution::Normal { mean: 1.0, sd: -1.0 };
        let r = Sampler::for_measure(1, "bad", 10).draw(&d, "bad");
        assert!(matches!(r, Err(PrepError::Validation { .. })));

        let d = Distribution::LogNormal { mean: 0.0, sd: -0.5 };
        let r = Sampler::for_measure(1, "bad", 10).draw(&d, "bad");
        assert!(matches!(r, Err(PrepError::Validation { measure, .. }) if measure == "bad"));
    }

    #[test]
    fn non_finite_spread_is_validation_error() {
        let d = Distribution::Normal { mean: f64::NAN, sd: 1.0 };
        assert!(Sampler::for_measure(1, "bad", 10).draw(&d, "bad").is_err());
        let d = Distribution::Normal { mean: 1.0, sd: f64::INFINITY };
        assert!(Sampler::for_measure(1, "bad", 10).draw(&d, "bad").is_err());
    }

    #[test]
    fn zero_sd_draws_the_mean() {
        let d = Distribution::Normal { mean: 3.0, sd: 0.0 };
        let v = Sampler::for_measure(1, "flat", 5).draw(&d, "flat").unwrap();
        assert_eq!(v.lanes(), 5);
        assert!((v.mean() - 3.0).abs() < 1e-12);
    }
}
