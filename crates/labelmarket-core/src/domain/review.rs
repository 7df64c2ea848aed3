//! QC review records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ReviewId, TaskId, UserId};
use super::task::TaskStatus;

/// Outcome of quality control on a submitted task.
///
/// Serialized as `accept` / `reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    Reject,
}

impl ReviewDecision {
    /// Status the task rests in once the decision is applied.
    ///
    /// A reject passes through `rejected` and lands back in `ready`.
    pub fn settled_status(self) -> TaskStatus {
        match self {
            ReviewDecision::Accept => TaskStatus::Accepted,
            ReviewDecision::Reject => TaskStatus::Ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewId,
    pub task_id: TaskId,
    pub reviewer_user_id: UserId,
    pub decision: ReviewDecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub version: u64,
}

impl ReviewRecord {
    pub fn new(
        id: ReviewId,
        task_id: TaskId,
        reviewer_user_id: UserId,
        decision: ReviewDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            reviewer_user_id,
            decision,
            notes,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Change the decision after the fact.
    pub fn resolve(
        &mut self,
        decision: ReviewDecision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.decision = decision;
        self.notes = notes;
        self.updated_at = now;
    }
}
