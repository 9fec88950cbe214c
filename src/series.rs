//! Year-indexed numeric series whose entries are either point values or
//! fixed-length Monte Carlo sample arrays.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};

/// One numeric quantity: a point estimate or a vector of sampled draws.
///
/// Arithmetic broadcasts a point across draws; two draw vectors must have the
/// same length.
///
/// # Examples
///
/// ```
/// use ecm_prep::series::Value;
///
/// let a = Value::Point(2.0);
/// let b = Value::Draws(vec![1.0, 3.0]);
/// let c = a.mul(&b).unwrap();
/// assert_eq!(c, Value::Draws(vec![2.0, 6.0]));
/// assert_eq!(c.mean(), 4.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Point(f64),
    Draws(Vec<f64>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Point(0.0)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Point(v)
    }
}

impl Value {
    /// Number of independent lanes (1 for a point).
    pub fn lanes(&self) -> usize {
        match self {
            Value::Point(_) => 1,
            Value::Draws(d) => d.len(),
        }
    }

    /// Value of lane `i`; a point answers the same value for every lane.
    pub fn lane(&self, i: usize) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Draws(d) => d.get(i).copied().unwrap_or(f64::NAN),
        }
    }

    /// Builds a value from per-lane results, collapsing a single lane to a point.
    pub fn from_lanes(mut lanes: Vec<f64>) -> Self {
        if lanes.len() == 1 {
            Value::Point(lanes.remove(0))
        } else {
            Value::Draws(lanes)
        }
    }

    pub fn is_draws(&self) -> bool {
        matches!(self, Value::Draws(_))
    }

    /// Arithmetic mean across lanes (the value itself for a point).
    pub fn mean(&self) -> f64 {
        match self {
            Value::Point(v) => *v,
            Value::Draws(d) if d.is_empty() => 0.0,
            Value::Draws(d) => d.iter().sum::<f64>() / d.len() as f64,
        }
    }

    /// Applies `f` lane by lane.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Point(v) => Value::Point(f(*v)),
            Value::Draws(d) => Value::Draws(d.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Combines two values lane by lane, broadcasting points.
    ///
    /// # Errors
    ///
    /// Returns `StructureMismatch` if both are draw vectors of different length.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> PrepResult<Value> {
        match (self, other) {
            (Value::Point(a), Value::Point(b)) => Ok(Value::Point(f(*a, *b))),
            (Value::Point(a), Value::Draws(d)) => {
                Ok(Value::Draws(d.iter().map(|&b| f(*a, b)).collect()))
            }
            (Value::Draws(d), Value::Point(b)) => {
                Ok(Value::Draws(d.iter().map(|&a| f(a, *b)).collect()))
            }
            (Value::Draws(da), Value::Draws(db)) => {
                if da.len() != db.len() {
                    return Err(PrepError::StructureMismatch(format!(
                        "sample arrays of length {} and {}",
                        da.len(),
                        db.len()
                    )));
                }
                Ok(Value::Draws(
                    da.iter().zip(db).map(|(&a, &b)| f(a, b)).collect(),
                ))
            }
        }
    }

    pub fn add(&self, other: &Value) -> PrepResult<Value> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> PrepResult<Value> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> PrepResult<Value> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Division where a zero denominator yields zero.
    pub fn div_or_zero(&self, other: &Value) -> PrepResult<Value> {
        self.zip_with(other, |a, b| if b == 0.0 { 0.0 } else { a / b })
    }

    pub fn scale(&self, factor: f64) -> Value {
        self.map(|v| v * factor)
    }
}

/// Mapping from calendar year to [`Value`].
///
/// Serialized with year strings as keys (`{"2009": 1.0}`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YearSeries(BTreeMap<u32, Value>);

impl YearSeries {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Series holding the same value in every year.
    pub fn constant(years: &[u32], value: impl Into<Value>) -> Self {
        let value = value.into();
        Self(years.iter().map(|&y| (y, value.clone())).collect())
    }

    pub fn zeros(years: &[u32]) -> Self {
        Self::constant(years, 0.0)
    }

    /// Series built from one point value per year.
    pub fn from_points(years: &[u32], values: &[f64]) -> Self {
        Self(
            years
                .iter()
                .zip(values)
                .map(|(&y, &v)| (y, Value::Point(v)))
                .collect(),
        )
    }

    pub fn insert(&mut self, year: u32, value: impl Into<Value>) {
        self.0.insert(year, value.into());
    }

    /// Value at `year`.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` if the year is absent.
    pub fn get(&self, year: u32) -> PrepResult<&Value> {
        self.0
            .get(&year)
            .ok_or_else(|| PrepError::MissingKey(format!("year {year}")))
    }

    /// Point value at `year`, taking lane 0 of sampled entries.
    pub fn point(&self, year: u32) -> PrepResult<f64> {
        self.get(year).map(|v| v.lane(0))
    }

    pub fn years(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.0.iter().map(|(y, v)| (*y, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest lane count among the entries.
    pub fn lanes(&self) -> usize {
        self.0.values().map(Value::lanes).max().unwrap_or(1)
    }

    pub fn map(&self, f: impl Fn(&Value) -> Value) -> YearSeries {
        Self(self.0.iter().map(|(y, v)| (*y, f(v))).collect())
    }

    /// Combines two series year by year.
    ///
    /// # Errors
    ///
    /// Returns `StructureMismatch` if the year keys differ.
    pub fn zip_with(
        &self,
        other: &YearSeries,
        f: impl Fn(&Value, &Value) -> PrepResult<Value>,
    ) -> PrepResult<YearSeries> {
        if !self.0.keys().eq(other.0.keys()) {
            return Err(PrepError::StructureMismatch(format!(
                "year keys {:?} vs {:?}",
                self.0.keys().collect::<Vec<_>>(),
                other.0.keys().collect::<Vec<_>>()
            )));
        }
        self.0
            .iter()
            .zip(other.0.values())
            .map(|((y, a), b)| Ok((*y, f(a, b)?)))
            .collect::<PrepResult<BTreeMap<_, _>>>()
            .map(Self)
    }

    /// Sum of all yearly means (used for weighting).
    pub fn total_mean(&self) -> f64 {
        self.0.values().map(Value::mean).sum()
    }
}

impl FromIterator<(u32, Value)> for YearSeries {
    fn from_iter<I: IntoIterator<Item = (u32, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
