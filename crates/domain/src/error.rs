//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::order::OrderError;
use crate::payment::PaymentError;

/// Coarse classification of a failure, shared by every caller that has to
/// translate domain errors (HTTP status codes, retry decisions, metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// The action is not allowed in the entity's current state.
    InvalidStateTransition,
    /// The input is well formed but breaks a business rule.
    BusinessRule,
    /// A uniqueness or cross-entity consistency rule would be broken.
    Integrity,
    /// A concurrent writer changed the entity first; the caller may retry.
    Conflict,
    /// Infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// Stable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorKind::BusinessRule => "BUSINESS_RULE_VIOLATION",
            ErrorKind::Integrity => "INTEGRITY_VIOLATION",
            ErrorKind::Conflict => "CONCURRENT_MODIFICATION",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the payment or wallet transaction aggregates.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Aggregate not found.
    #[error("{aggregate_type} not found: {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: String,
    },

    /// Input rejected before reaching an aggregate.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A cross-entity consistency rule would be broken.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Creates a not-found error.
    pub fn not_found(aggregate_type: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            aggregate_type,
            id: id.to_string(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Store(StoreError::ConcurrencyConflict { .. }) => ErrorKind::Conflict,
            DomainError::Store(StoreError::UniqueViolation { .. }) => ErrorKind::Integrity,
            DomainError::Store(_) | DomainError::Serialization(_) => ErrorKind::Internal,
            DomainError::Order(e) => e.kind(),
            DomainError::Payment(e) => e.kind(),
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::Integrity(_) => ErrorKind::Integrity,
        }
    }

    /// Returns true if the operation lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
