//! Error types for the ZQL dataflow engine.
//!
//! Invariant violations (wiring mistakes, out-of-order versions, negative
//! group multiplicities) and caller-raised aborts share one enum so they can
//! travel through `Materialite::tx` and operator callbacks with `?`.

use thiserror::Error;

/// Result type alias for ZQL operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for ZQL operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A stream was given a second upstream operator.
    #[error("stream already has an upstream operator")]
    UpstreamAlreadySet,

    /// A reader was notified but its operator is gone.
    #[error("reader notified with no operator attached")]
    ReaderDetached,

    /// An operator was notified of a version older than one it already ran.
    #[error("version {got} notified after version {last}")]
    VersionOutOfOrder {
        /// Last version the operator ran.
        last: u64,
        /// Version that arrived afterwards.
        got: u64,
    },

    /// A tracked group member dropped below zero occurrences.
    #[error("multiplicity for {identity} went negative ({multiplicity})")]
    NegativeMultiplicity {
        /// Identity of the member.
        identity: String,
        /// Multiplicity after applying the offending entry.
        multiplicity: i64,
    },

    /// A key expected to exist in a source was not found.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A record did not carry a field required by an operator.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// An operator string that is not one of `= < > >= <= IN LIKE ILIKE`.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// An operand that does not fit its operator (e.g. `IN` with a scalar).
    #[error("invalid operand for {op}: {message}")]
    InvalidOperand {
        /// Operator the operand was given to.
        op: String,
        /// What was wrong with it.
        message: String,
    },

    /// A transaction body asked for a rollback.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl Error {
    /// Creates an abort error, used by callers to roll back a transaction.
    pub fn aborted(message: impl Into<String>) -> Self {
        Error::Aborted(message.into())
    }

    /// Creates an invalid operand error.
    pub fn invalid_operand(op: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidOperand {
            op: op.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that signal a broken engine invariant rather
    /// than a caller decision.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::UpstreamAlreadySet
                | Error::ReaderDetached
                | Error::VersionOutOfOrder { .. }
                | Error::NegativeMultiplicity { .. }
                | Error::KeyNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_version() {
        let err = Error::VersionOutOfOrder { last: 4, got: 3 };
        assert_eq!(err.to_string(), "version 3 notified after version 4");
    }

    #[test]
    fn test_error_display_negative() {
        let err = Error::NegativeMultiplicity {
            identity: "a".into(),
            multiplicity: -1,
        };
        let msg = err.to_string();
        assert!(msg.contains("a"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn test_error_aborted() {
        let err = Error::aborted("boom");
        assert_eq!(err, Error::Aborted("boom".into()));
        assert!(!err.is_invariant_violation());
    }

    #[test]
    fn test_invariant_classification() {
        assert!(Error::UpstreamAlreadySet.is_invariant_violation());
        assert!(Error::ReaderDetached.is_invariant_violation());
        assert!(!Error::UnknownOperator("!=".into()).is_invariant_violation());
    }
}
