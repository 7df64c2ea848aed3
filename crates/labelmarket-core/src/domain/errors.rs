//! Errors - リース操作のエラー分類
//!
//! すべての失敗はリクエスト単位で同期的に返されます。
//! 自動リカバリは expiry sweep のみで、ここでリトライはしません。

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ids::TaskId;

/// Failure of a leasing or lifecycle operation.
///
/// Every mutation runs inside one store transaction, so any of these leaves
/// the store exactly as it was before the call.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Task or contract is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Wrong role, not a party to the contract, or lease token mismatch.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The action is not valid for the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Lost a race (concurrent commit) or the row is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The lease elapsed before submit. Re-lease and try again.
    #[error("lease on {task_id} expired at {leased_until}")]
    Expired {
        task_id: TaskId,
        leased_until: DateTime<Utc>,
    },

    /// Rejected at the boundary (duration out of range, null payload, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Infrastructure failure of the entity store.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl LeaseError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Can the client usefully retry the same call (possibly after re-leasing)?
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaseError::Conflict(_) | LeaseError::Expired { .. })
    }
}

/// Failure reported by an `EntityStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A row read by the transaction changed before commit.
    #[error("concurrent modification of {0}")]
    Conflict(String),

    /// A uniqueness constraint would be violated.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Backend unreachable or failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LeaseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => {
                LeaseError::Conflict(format!("concurrent update of {what}"))
            }
            StoreError::UniqueViolation(what) => LeaseError::Conflict(what),
            other => LeaseError::Store(other),
        }
    }
}
