//! Error surface of the stock ledger engine.
//!
//! Domain errors and store errors are folded into one taxonomy so calling use
//! cases only match on four cases.

use thiserror::Error;

use epiledger_core::DomainError;

use crate::ledger_store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input (empty reason, negative quantity, empty count, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Rule violation on well-formed input.
    #[error("business error: {0}")]
    Business(String),

    /// Referenced movement, row or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failed; the transaction was rolled back.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business(msg: impl Into<String>) -> Self {
        Self::Business(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_business(&self) -> bool {
        matches!(self, LedgerError::Business(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::BusinessRule(msg) => LedgerError::Business(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => LedgerError::NotFound(what),
            StoreError::UnsupportedMovementType(code) => {
                LedgerError::Business(format!("unsupported movement type: {code}"))
            }
            // Uniqueness only fires on the reversal link (one reversal per movement).
            StoreError::Conflict(msg) => LedgerError::Business(msg),
            other => LedgerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            LedgerError::from(DomainError::validation("x")),
            LedgerError::Validation(_)
        ));
        assert!(LedgerError::from(DomainError::business("x")).is_business());
        assert!(matches!(
            LedgerError::from(DomainError::not_found("movement")),
            LedgerError::NotFound(_)
        ));
    }

    #[test]
    fn unknown_stored_types_become_business_errors_naming_the_code() {
        let err = LedgerError::from(StoreError::UnsupportedMovementType("EMPRESTIMO".into()));
        match err {
            LedgerError::Business(msg) => assert!(msg.contains("EMPRESTIMO")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reversal_link_conflicts_are_business_errors() {
        let err = LedgerError::from(StoreError::Conflict("movement already has a reversal".into()));
        assert!(err.is_business());
    }

    #[test]
    fn backend_failures_stay_store_errors() {
        let err = LedgerError::from(StoreError::Backend("connection reset".into()));
        assert!(matches!(err, LedgerError::Store(StoreError::Backend(_))));
    }
}
