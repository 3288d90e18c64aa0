//! Error types for placement passes.

use rulepool_id::IdError;
use thiserror::Error;

use crate::backend::BackendError;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that abort a placement pass.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The backend rejected or failed a call.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Another writer changed the target bus between reconciliation and
    /// placement, or the backend refused the rule as over its limit.
    #[error("placement conflict on bus {bus}: {reason}")]
    Conflict { bus: String, reason: String },

    /// A new bus is needed but the account-wide ceiling is reached.
    #[error("bus ceiling reached: {max_buses} buses already exist")]
    CapacityExhausted { max_buses: usize },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),

    /// The compute target's task failed; its rule was left in place.
    #[error("task failed: {0}")]
    Task(String),
}

impl PoolError {
    /// Returns true if re-running the whole reconcile/place cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true if the error came from the backend and is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_transient())
    }
}
