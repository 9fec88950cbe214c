//! Error taxonomy shared by every stage of measure preparation.

use thiserror::Error;

/// Errors raised while normalizing, partitioning, or packaging measures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepError {
    /// Malformed measure definition or inconsistent inputs. The offending
    /// measure is dropped from the batch; other measures proceed.
    #[error("invalid measure \"{measure}\": {message}")]
    Validation { measure: String, message: String },
    /// A key chain, baseline value, registry record, or conversion factor does not exist.
    #[error("missing data: {0}")]
    MissingKey(String),
    /// Two operands of a tree or series operation do not share the same shape.
    #[error("structure mismatch: {0}")]
    StructureMismatch(String),
    /// An operation was invoked before the lifecycle stage it depends on.
    #[error("not prepared: {0}")]
    NotPrepared(String),
}

impl PrepError {
    /// Shorthand for a [`PrepError::Validation`] naming `measure`.
    pub fn validation(measure: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            measure: measure.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error excludes only the current measure (rather than
    /// pointing at a defect in shared data structures).
    pub fn is_per_measure(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::MissingKey(_))
    }
}

/// Convenience type for `Result<T, PrepError>`.
pub type PrepResult<T> = Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_measure() {
        let e = PrepError::validation("Best WH", "unknown fuel \"coal\"");
        assert_eq!(e.to_string(), "invalid measure \"Best WH\": unknown fuel \"coal\"");
        assert!(e.is_per_measure());
    }

    #[test]
    fn structure_mismatch_is_not_per_measure() {
        let e = PrepError::StructureMismatch("years differ".into());
        assert!(!e.is_per_measure());
    }
}
