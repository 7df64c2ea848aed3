//! InMemoryStore - 開発用・テスト用の EntityStore
//!
//! # 実装詳細
//! - 全テーブルを 1 つの `tokio::sync::Mutex` で保護
//! - トランザクションは楽観的並行制御: 読んだ行の version を覚えておき、
//!   commit 時に変わっていたら `StoreError::Conflict`
//! - 書き込みは commit まで積んでおき、検証が全部通ってから一括で適用
//! - Mutex を握るのは個々の読み取りと commit の間だけなので、
//!   2 つのトランザクションは本物の DB と同じようにインターリーブしうる

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    AnnotationNormalized, AnnotationRaw, AssetId, ContractId, ContractRecord, ReviewId,
    ReviewRecord, StoreError, TaskId, TaskLease, TaskRecord, UserId,
};
use crate::ports::{EntityStore, ReviewFilter, StoreTx, TaskFilter};

/// All tables.
#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, TaskRecord>,
    contracts: HashMap<ContractId, ContractRecord>,

    /// Keyed by task id: the one-lease-per-task constraint is the map itself.
    leases: HashMap<TaskId, TaskLease>,

    /// Append order.
    annotations: Vec<AnnotationRaw>,
    reviews: Vec<ReviewRecord>,

    /// One per task.
    normalized: HashMap<TaskId, AnnotationNormalized>,
}

impl StoreState {
    fn task_version(&self, id: &TaskId) -> u64 {
        self.tasks.get(id).map_or(0, |t| t.version)
    }

    fn contract_version(&self, id: &ContractId) -> u64 {
        self.contracts.get(id).map_or(0, |c| c.version)
    }

    fn review_version(&self, id: &ReviewId) -> u64 {
        self.reviews
            .iter()
            .find(|r| r.id == *id)
            .map_or(0, |r| r.version)
    }

    fn normalized_version(&self, task_id: &TaskId) -> u32 {
        self.normalized.get(task_id).map_or(0, |n| n.version)
    }

    fn is_party(&self, task: &TaskRecord, user: &UserId) -> bool {
        self.contracts
            .get(&task.contract_id)
            .is_some_and(|c| c.client_user_id == *user || c.labeler_user_id == *user)
    }
}

/// A staged write, applied on commit.
#[derive(Debug, Clone)]
enum Write {
    InsertTask(TaskRecord),
    UpdateTask(TaskRecord),
    UpdateContract(ContractRecord),
    PutLease(TaskLease),
    DeleteLease(TaskId),
    AppendAnnotation(AnnotationRaw),
    PutNormalized(AnnotationNormalized),
    AppendReview(ReviewRecord),
    UpdateReview(ReviewRecord),
}

/// In-memory entity store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a contract, as the external CRUD layer would.
    pub async fn insert_contract(&self, mut contract: ContractRecord) {
        let mut state = self.state.lock().await;
        contract.version = state.contract_version(&contract.id) + 1;
        state.contracts.insert(contract.id, contract);
    }

    /// Current committed task row.
    pub async fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// Current committed lease row.
    pub async fn lease(&self, task_id: TaskId) -> Option<TaskLease> {
        self.state.lock().await.leases.get(&task_id).cloned()
    }

    pub async fn lease_count(&self) -> usize {
        self.state.lock().await.leases.len()
    }

    pub async fn annotation_count(&self, task_id: TaskId) -> usize {
        self.state
            .lock()
            .await
            .annotations
            .iter()
            .filter(|a| a.task_id == task_id)
            .count()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        Ok(InMemoryTx {
            state: Arc::clone(&self.state),
            seen_tasks: HashMap::new(),
            seen_contracts: HashMap::new(),
            seen_leases: HashMap::new(),
            seen_reviews: HashMap::new(),
            seen_normalized: HashMap::new(),
            writes: Vec::new(),
        })
    }
}

/// Transaction over `InMemoryStore`.
pub struct InMemoryTx {
    state: Arc<Mutex<StoreState>>,

    /// Version observed at first read (0 = row absent).
    seen_tasks: HashMap<TaskId, u64>,
    seen_contracts: HashMap<ContractId, u64>,

    /// Lease row observed at first read.
    seen_leases: HashMap<TaskId, Option<TaskLease>>,

    seen_reviews: HashMap<ReviewId, u64>,
    seen_normalized: HashMap<TaskId, u32>,

    writes: Vec<Write>,
}

impl InMemoryTx {
    /// Fail if any row this transaction read has changed since.
    fn validate_reads(&self, state: &StoreState) -> Result<(), StoreError> {
        for (id, seen) in &self.seen_tasks {
            if state.task_version(id) != *seen {
                return Err(StoreError::Conflict(id.to_string()));
            }
        }
        for (id, seen) in &self.seen_contracts {
            if state.contract_version(id) != *seen {
                return Err(StoreError::Conflict(id.to_string()));
            }
        }
        for (task_id, seen) in &self.seen_leases {
            if state.leases.get(task_id) != seen.as_ref() {
                return Err(StoreError::Conflict(format!("lease of {task_id}")));
            }
        }
        for (id, seen) in &self.seen_reviews {
            if state.review_version(id) != *seen {
                return Err(StoreError::Conflict(id.to_string()));
            }
        }
        for (task_id, seen) in &self.seen_normalized {
            if state.normalized_version(task_id) != *seen {
                return Err(StoreError::Conflict(format!("normalized annotation of {task_id}")));
            }
        }
        Ok(())
    }

    /// Check constraints of the staged writes against the current state.
    fn validate_writes(&self, state: &StoreState) -> Result<(), StoreError> {
        let mut pairs: Option<HashSet<(ContractId, AssetId)>> = None;

        for write in &self.writes {
            match write {
                Write::InsertTask(task) => {
                    if state.tasks.contains_key(&task.id) {
                        return Err(StoreError::UniqueViolation(format!("task id {}", task.id)));
                    }
                    let pairs = pairs.get_or_insert_with(|| {
                        state
                            .tasks
                            .values()
                            .map(|t| (t.contract_id, t.asset_id))
                            .collect()
                    });
                    if !pairs.insert((task.contract_id, task.asset_id)) {
                        return Err(StoreError::UniqueViolation(format!(
                            "task for ({}, {}) already exists",
                            task.contract_id, task.asset_id
                        )));
                    }
                }
                Write::UpdateTask(task) => {
                    if !state.tasks.contains_key(&task.id) {
                        return Err(StoreError::Conflict(format!("{} vanished", task.id)));
                    }
                }
                Write::UpdateContract(contract) => {
                    if !state.contracts.contains_key(&contract.id) {
                        return Err(StoreError::Conflict(format!("{} vanished", contract.id)));
                    }
                }
                Write::PutLease(lease) => {
                    if !state.tasks.contains_key(&lease.task_id)
                        && !self.inserts_task(&lease.task_id)
                    {
                        return Err(StoreError::Conflict(format!(
                            "lease for unknown {}",
                            lease.task_id
                        )));
                    }
                }
                Write::UpdateReview(review) => {
                    if state.review_version(&review.id) == 0 {
                        return Err(StoreError::Conflict(format!("{} vanished", review.id)));
                    }
                }
                Write::AppendReview(review) => {
                    if state.review_version(&review.id) != 0 {
                        return Err(StoreError::UniqueViolation(format!(
                            "review id {}",
                            review.id
                        )));
                    }
                }
                Write::DeleteLease(_)
                | Write::AppendAnnotation(_)
                | Write::PutNormalized(_) => {}
            }
        }
        Ok(())
    }

    fn inserts_task(&self, id: &TaskId) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::InsertTask(t) if t.id == *id))
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn task(&mut self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        let task = state.tasks.get(&id).cloned();
        self.seen_tasks
            .entry(id)
            .or_insert_with(|| task.as_ref().map_or(0, |t| t.version));
        Ok(task)
    }

    async fn contract(&mut self, id: ContractId) -> Result<Option<ContractRecord>, StoreError> {
        let state = self.state.lock().await;
        let contract = state.contracts.get(&id).cloned();
        self.seen_contracts
            .entry(id)
            .or_insert_with(|| contract.as_ref().map_or(0, |c| c.version));
        Ok(contract)
    }

    async fn lease(&mut self, task_id: TaskId) -> Result<Option<TaskLease>, StoreError> {
        let state = self.state.lock().await;
        let lease = state.leases.get(&task_id).cloned();
        self.seen_leases
            .entry(task_id)
            .or_insert_with(|| lease.clone());
        Ok(lease)
    }

    async fn tasks_for_contract(&mut self, id: ContractId) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|t| t.contract_id == id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        for task in &tasks {
            self.seen_tasks.entry(task.id).or_insert(task.version);
        }
        Ok(tasks)
    }

    async fn list_tasks(
        &mut self,
        filter: &TaskFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TaskRecord>, usize), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&TaskRecord> = state
            .tasks
            .values()
            .filter(|t| filter.contract_id.is_none_or(|c| t.contract_id == c))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.party.is_none_or(|u| state.is_party(t, &u)))
            .collect();
        matching.sort_by_key(|t| (t.created_at, t.id));

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn expired_leases(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskLease>, StoreError> {
        let state = self.state.lock().await;
        let mut expired: Vec<TaskLease> = state
            .leases
            .values()
            .filter(|l| l.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|l| (l.leased_until, l.task_id));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn annotations(&mut self, task_id: TaskId) -> Result<Vec<AnnotationRaw>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .annotations
            .iter()
            .rev()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn normalized_annotation(
        &mut self,
        task_id: TaskId,
    ) -> Result<Option<AnnotationNormalized>, StoreError> {
        let state = self.state.lock().await;
        let doc = state.normalized.get(&task_id).cloned();
        self.seen_normalized
            .entry(task_id)
            .or_insert_with(|| doc.as_ref().map_or(0, |d| d.version));
        Ok(doc)
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<ReviewRecord>, StoreError> {
        let state = self.state.lock().await;
        let review = state.reviews.iter().find(|r| r.id == id).cloned();
        self.seen_reviews
            .entry(id)
            .or_insert_with(|| review.as_ref().map_or(0, |r| r.version));
        Ok(review)
    }

    async fn list_reviews(
        &mut self,
        filter: &ReviewFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewRecord>, usize), StoreError> {
        let state = self.state.lock().await;
        let matching: Vec<&ReviewRecord> = state
            .reviews
            .iter()
            .rev()
            .filter(|r| filter.task_id.is_none_or(|t| r.task_id == t))
            .filter(|r| filter.decision.is_none_or(|d| r.decision == d))
            .filter(|r| {
                filter.party.is_none_or(|u| {
                    state
                        .tasks
                        .get(&r.task_id)
                        .is_some_and(|t| state.is_party(t, &u))
                })
            })
            .collect();

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    fn insert_task(&mut self, task: TaskRecord) {
        self.writes.push(Write::InsertTask(task));
    }

    fn update_task(&mut self, task: TaskRecord) {
        self.writes.push(Write::UpdateTask(task));
    }

    fn update_contract(&mut self, contract: ContractRecord) {
        self.writes.push(Write::UpdateContract(contract));
    }

    fn put_lease(&mut self, lease: TaskLease) {
        self.writes.push(Write::PutLease(lease));
    }

    fn delete_lease(&mut self, task_id: TaskId) {
        self.writes.push(Write::DeleteLease(task_id));
    }

    fn append_annotation(&mut self, annotation: AnnotationRaw) {
        self.writes.push(Write::AppendAnnotation(annotation));
    }

    fn put_normalized_annotation(&mut self, doc: AnnotationNormalized) {
        self.writes.push(Write::PutNormalized(doc));
    }

    fn append_review(&mut self, review: ReviewRecord) {
        self.writes.push(Write::AppendReview(review));
    }

    fn update_review(&mut self, review: ReviewRecord) {
        self.writes.push(Write::UpdateReview(review));
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        // First, validate everything; nothing is applied on failure.
        self.validate_reads(&state)?;
        self.validate_writes(&state)?;

        for write in self.writes {
            match write {
                Write::InsertTask(mut task) => {
                    task.version = 1;
                    state.tasks.insert(task.id, task);
                }
                Write::UpdateTask(mut task) => {
                    task.version = state.task_version(&task.id) + 1;
                    state.tasks.insert(task.id, task);
                }
                Write::UpdateContract(mut contract) => {
                    contract.version = state.contract_version(&contract.id) + 1;
                    state.contracts.insert(contract.id, contract);
                }
                Write::PutLease(lease) => {
                    state.leases.insert(lease.task_id, lease);
                }
                Write::DeleteLease(task_id) => {
                    state.leases.remove(&task_id);
                }
                Write::AppendAnnotation(annotation) => state.annotations.push(annotation),
                Write::PutNormalized(doc) => {
                    state.normalized.insert(doc.task_id, doc);
                }
                Write::AppendReview(mut review) => {
                    review.version = 1;
                    state.reviews.push(review);
                }
                Write::UpdateReview(mut review) => {
                    review.version = state.review_version(&review.id) + 1;
                    if let Some(slot) = state.reviews.iter_mut().find(|r| r.id == review.id) {
                        *slot = review;
                    }
                }
            }
        }
        Ok(())
    }
}
