//! Task state machine and record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AssetId, ContractId, TaskId};
use super::review::ReviewDecision;

/// Task status.
///
/// State transitions:
/// - Ready -> Leased (acquire)
/// - Leased -> Submitted (submit with a valid, unexpired token)
/// - Leased -> Ready (expiry sweep)
/// - Submitted -> Accepted (QC accept, terminal)
/// - Submitted -> Rejected -> Ready (QC reject, re-workable)
/// - Accepted <-> Ready (the latest review is revised)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a labeler to take it.
    Ready,

    /// Held by a labeler under a TaskLease.
    Leased,

    /// Annotation handed in, waiting for QC.
    Submitted,

    /// QC passed.
    Accepted,

    /// QC failed; the task goes back to the pool.
    Rejected,
}

impl TaskStatus {
    /// Is this a terminal state for leasing and QC?
    ///
    /// Only revising the review that accepted it moves the task again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Accepted)
    }

    /// Can a lease be acquired from this state?
    ///
    /// `Rejected` is included so a row left there is never stuck.
    pub fn is_leasable(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Leased => "leased",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Accepted => "accepted",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of labeling work: one asset under one contract.
///
/// Design:
/// - State transitions happen through the methods below, never by poking
///   `status` from outside.
/// - `version` belongs to the store (optimistic concurrency); the core only
///   carries it back on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub contract_id: ContractId,
    pub asset_id: AssetId,
    pub status: TaskStatus,

    /// Number of submissions so far. Only ever increases.
    pub attempt_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub version: u64,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        contract_id: ContractId,
        asset_id: AssetId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            contract_id,
            asset_id,
            status: TaskStatus::Ready,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn mark_leased(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Leased;
        self.updated_at = now;
    }

    /// Mark as submitted (increment attempts).
    pub fn mark_submitted(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Submitted;
        self.attempt_count += 1;
        self.updated_at = now;
    }

    pub fn mark_accepted(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Accepted;
        self.updated_at = now;
    }

    pub fn mark_rejected(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Rejected;
        self.updated_at = now;
    }

    /// Back to the pool (lease reclaimed, or re-work after rejection).
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Ready;
        self.updated_at = now;
    }

    /// Move to where a QC decision leaves the task.
    pub fn apply_decision(&mut self, decision: ReviewDecision, now: DateTime<Utc>) {
        match decision {
            ReviewDecision::Accept => self.mark_accepted(now),
            ReviewDecision::Reject => {
                self.mark_rejected(now);
                self.release(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::random(),
            ContractId::random(),
            AssetId::random(),
            Utc::now(),
        )
    }

    #[test]
    fn new_task_starts_ready_with_no_attempts() {
        let task = record();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.attempt_count, 0);
    }

    #[test]
    fn submit_increments_attempts() {
        let mut task = record();
        let now = Utc::now();
        task.mark_leased(now);
        task.mark_submitted(now);
        task.mark_rejected(now);
        task.release(now);
        task.mark_leased(now);
        task.mark_submitted(now);

        assert_eq!(task.status, TaskStatus::Submitted);
        assert_eq!(task.attempt_count, 2);
    }

    #[rstest]
    #[case::ready(TaskStatus::Ready, true)]
    #[case::rejected(TaskStatus::Rejected, true)]
    #[case::leased(TaskStatus::Leased, false)]
    #[case::submitted(TaskStatus::Submitted, false)]
    #[case::accepted(TaskStatus::Accepted, false)]
    fn leasable_states(#[case] status: TaskStatus, #[case] leasable: bool) {
        assert_eq!(status.is_leasable(), leasable);
    }

    #[rstest]
    #[case::accept(ReviewDecision::Accept)]
    #[case::reject(ReviewDecision::Reject)]
    fn decision_settles_where_expected(#[case] decision: ReviewDecision) {
        let mut task = record();
        let now = Utc::now();
        task.mark_leased(now);
        task.mark_submitted(now);

        task.apply_decision(decision, now);
        assert_eq!(task.status, decision.settled_status());
        assert_eq!(task.attempt_count, 1);
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Submitted).unwrap();
        assert_eq!(s, "\"submitted\"");
        assert_eq!(TaskStatus::Leased.to_string(), "leased");
    }
}
