//! TaskLease - 期限付きの排他的なタスク保持

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{TaskId, UserId};

/// Opaque credential proving custody of a lease.
///
/// Knowing the task id is not enough to submit; the caller must present the
/// token handed out by acquire.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// Tokens end up in logs through `{:?}` on records; keep them out.
impl fmt::Debug for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LeaseToken(..)")
    }
}

/// Exclusive, time-bounded custody of a task. At most one per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLease {
    pub task_id: TaskId,
    pub labeler_user_id: UserId,
    pub lease_token: LeaseToken,
    pub leased_until: DateTime<Utc>,
}

impl TaskLease {
    pub fn new(
        task_id: TaskId,
        labeler_user_id: UserId,
        lease_token: LeaseToken,
        leased_until: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            labeler_user_id,
            lease_token,
            leased_until,
        }
    }

    /// A lease is expired once `leased_until` lies strictly in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.leased_until < now
    }

    pub fn token_matches(&self, token: &LeaseToken) -> bool {
        self.lease_token == *token
    }

    /// Re-issue the lease in place for a new holder.
    pub fn renew(
        &mut self,
        labeler_user_id: UserId,
        token: LeaseToken,
        leased_until: DateTime<Utc>,
    ) {
        self.labeler_user_id = labeler_user_id;
        self.lease_token = token;
        self.leased_until = leased_until;
    }
}
