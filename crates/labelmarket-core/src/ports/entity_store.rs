//! EntityStore port - タスク・リース・注釈の正本（source of truth）
//!
//! # 設計原則
//! - 状態遷移（acquire / submit / reclaim）は 1 トランザクション内で読み書きする
//! - Lease の権威はここにある（コア側はロックを持たない）
//! - `begin()` → 読み取り → 書き込みの積み上げ → `commit()`
//! - commit せずに drop したトランザクションは rollback 扱い
//!
//! 実装は「読んだ行が commit までに変わっていない」ことを保証しなければ
//! なりません。変わっていた場合は `StoreError::Conflict` を返します。
//! これが二重リースと submit の取りこぼしを防ぐ唯一の仕組みです。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AnnotationNormalized, AnnotationRaw, ContractId, ContractRecord, ReviewDecision, ReviewId,
    ReviewRecord, StoreError, TaskId, TaskLease, TaskRecord, TaskStatus, UserId,
};

/// Row filter for task listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub contract_id: Option<ContractId>,
    pub status: Option<TaskStatus>,

    /// Restrict to contracts where this user is client or labeler.
    pub party: Option<UserId>,
}

/// Row filter for review listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub task_id: Option<TaskId>,
    pub decision: Option<ReviewDecision>,

    /// Restrict to reviews of tasks whose contract has this user as a party.
    pub party: Option<UserId>,
}

/// Transactional access to the entity store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One open transaction.
///
/// Reads see committed state. Writes are staged and become visible all at
/// once on `commit`, or not at all.
#[async_trait]
pub trait StoreTx: Send {
    async fn task(&mut self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    async fn contract(&mut self, id: ContractId) -> Result<Option<ContractRecord>, StoreError>;

    async fn lease(&mut self, task_id: TaskId) -> Result<Option<TaskLease>, StoreError>;

    async fn tasks_for_contract(&mut self, id: ContractId) -> Result<Vec<TaskRecord>, StoreError>;

    /// Page of tasks matching `filter`, oldest first, plus the total match count.
    async fn list_tasks(
        &mut self,
        filter: &TaskFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TaskRecord>, usize), StoreError>;

    /// Leases with `leased_until < now`, earliest expiry first.
    ///
    /// A listing only; it does not pin the rows for commit.
    async fn expired_leases(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskLease>, StoreError>;

    /// Annotation history of a task, newest first.
    async fn annotations(&mut self, task_id: TaskId) -> Result<Vec<AnnotationRaw>, StoreError>;

    /// The normalized document of a task, if one was written.
    async fn normalized_annotation(
        &mut self,
        task_id: TaskId,
    ) -> Result<Option<AnnotationNormalized>, StoreError>;

    async fn review(&mut self, id: ReviewId) -> Result<Option<ReviewRecord>, StoreError>;

    /// Page of reviews matching `filter`, newest first, plus the total match count.
    async fn list_reviews(
        &mut self,
        filter: &ReviewFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewRecord>, usize), StoreError>;

    /// Insert a new task. Fails on commit if (contract, asset) is taken.
    fn insert_task(&mut self, task: TaskRecord);

    /// Overwrite an existing task.
    fn update_task(&mut self, task: TaskRecord);

    fn update_contract(&mut self, contract: ContractRecord);

    /// Create or overwrite the lease row of `lease.task_id`.
    fn put_lease(&mut self, lease: TaskLease);

    fn delete_lease(&mut self, task_id: TaskId);

    fn append_annotation(&mut self, annotation: AnnotationRaw);

    /// Create or overwrite the normalized document of `doc.task_id`.
    fn put_normalized_annotation(&mut self, doc: AnnotationNormalized);

    fn append_review(&mut self, review: ReviewRecord);

    /// Overwrite an existing review.
    fn update_review(&mut self, review: ReviewRecord);

    async fn commit(self) -> Result<(), StoreError>;
}
