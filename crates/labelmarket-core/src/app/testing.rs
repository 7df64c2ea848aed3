//! Shared fixtures for app-layer tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tokio::sync::Barrier;

use super::{LeaseManager, TaskLifecycle};
use crate::config::LeaseConfig;
use crate::domain::{
    Actor, AnnotationNormalized, AnnotationPayload, AnnotationRaw, AssetId, ContractId,
    ContractRecord, ContractStatus, ReviewId, ReviewRecord, Role, StoreError, TaskId, TaskLease,
    TaskRecord, UserId,
};
use crate::impls::{InMemoryStore, InMemoryTx};
use crate::ports::{
    Clock, EntityStore, FixedClock, IdGenerator, RandomTokenGenerator, ReviewFilter, StoreTx,
    TaskFilter, UlidGenerator,
};

pub(crate) fn payload() -> AnnotationPayload {
    let doc = json!({"boxes": [{"x": 10, "y": 20, "w": 64, "h": 48, "label": "cat"}]});
    AnnotationPayload::new(doc).unwrap()
}

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
}

/// One active contract with `n` ready tasks, created one second apart.
pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: FixedClock,
    pub leases: Arc<LeaseManager<InMemoryStore>>,
    pub lifecycle: TaskLifecycle<InMemoryStore>,
    pub contract: ContractRecord,
    pub tasks: Vec<TaskRecord>,
    pub client: Actor,
    pub labeler: Actor,
    config: LeaseConfig,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(3, LeaseConfig::default()).await
    }

    pub async fn with_config(n: usize, config: LeaseConfig) -> Self {
        Self::on_store(InMemoryStore::new(), n, config).await
    }

    pub async fn on_store(store: InMemoryStore, n: usize, config: LeaseConfig) -> Self {
        let clock = FixedClock::new(start_time());
        let client = Actor::new(UserId::random(), Role::Client);
        let labeler = Actor::new(UserId::random(), Role::Labeler);

        let contract = ContractRecord::new(
            ContractId::random(),
            "listing-street-scenes",
            client.user_id,
            labeler.user_id,
            ContractStatus::Active,
        );
        store.insert_contract(contract.clone()).await;

        let store = Arc::new(store);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::new(clock.clone())));

        let mut tasks = Vec::with_capacity(n);
        let mut tx = store.begin().await.unwrap();
        for _ in 0..n {
            let task = TaskRecord::new(ids.next_id(), contract.id, AssetId::random(), clock.now());
            tx.insert_task(task.clone());
            tasks.push(task);
            clock.advance(Duration::seconds(1));
        }
        tx.commit().await.unwrap();

        let leases = Arc::new(LeaseManager::new(
            Arc::clone(&store),
            Arc::new(clock.clone()),
            Arc::new(RandomTokenGenerator),
            Arc::clone(&ids),
            config.clone(),
        ));
        let lifecycle = TaskLifecycle::new(
            Arc::clone(&store),
            Arc::new(clock.clone()),
            ids,
            Arc::clone(&leases),
        );

        Self {
            store,
            clock,
            leases,
            lifecycle,
            contract,
            tasks,
            client,
            labeler,
            config,
        }
    }

    /// A second manager over another store, sharing this fixture's clock.
    pub fn lease_manager_on<S: EntityStore>(&self, store: Arc<S>) -> LeaseManager<S> {
        self.lease_manager_at(store, self.clock.clone())
    }

    /// A second manager over another store, reading its own clock.
    pub fn lease_manager_at<S: EntityStore>(
        &self,
        store: Arc<S>,
        clock: FixedClock,
    ) -> LeaseManager<S> {
        LeaseManager::new(
            store,
            Arc::new(clock.clone()),
            Arc::new(RandomTokenGenerator),
            Arc::new(UlidGenerator::new(Arc::new(clock))),
            self.config.clone(),
        )
    }

    /// A lifecycle controller over another store, sharing this fixture's clock.
    pub fn lifecycle_on<S: EntityStore>(&self, store: Arc<S>) -> TaskLifecycle<S> {
        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let leases = Arc::new(self.lease_manager_on(Arc::clone(&store)));
        TaskLifecycle::new(store, clock, ids, leases)
    }

    /// Write a lease row directly, bypassing the state machine.
    pub async fn put_raw_lease(&self, lease: TaskLease) {
        let mut tx = self.store.begin().await.unwrap();
        tx.put_lease(lease);
        tx.commit().await.unwrap();
    }
}

/// Store whose commits wait until `parties` transactions are ready to
/// commit, so racing transactions always interleave read-read-commit-commit.
pub(crate) struct GatedStore {
    inner: InMemoryStore,
    barrier: Arc<Barrier>,
}

impl GatedStore {
    pub fn new(inner: InMemoryStore, parties: usize) -> Self {
        Self {
            inner,
            barrier: Arc::new(Barrier::new(parties)),
        }
    }
}

#[async_trait]
impl EntityStore for GatedStore {
    type Tx = GatedTx;

    async fn begin(&self) -> Result<GatedTx, StoreError> {
        Ok(GatedTx {
            inner: self.inner.begin().await?,
            barrier: Arc::clone(&self.barrier),
        })
    }
}

pub(crate) struct GatedTx {
    inner: InMemoryTx,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl StoreTx for GatedTx {
    async fn task(&mut self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.task(id).await
    }

    async fn contract(&mut self, id: ContractId) -> Result<Option<ContractRecord>, StoreError> {
        self.inner.contract(id).await
    }

    async fn lease(&mut self, task_id: TaskId) -> Result<Option<TaskLease>, StoreError> {
        self.inner.lease(task_id).await
    }

    async fn tasks_for_contract(&mut self, id: ContractId) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.tasks_for_contract(id).await
    }

    async fn list_tasks(
        &mut self,
        filter: &TaskFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TaskRecord>, usize), StoreError> {
        self.inner.list_tasks(filter, offset, limit).await
    }

    async fn expired_leases(
        &mut self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskLease>, StoreError> {
        self.inner.expired_leases(now, limit).await
    }

    async fn annotations(&mut self, task_id: TaskId) -> Result<Vec<AnnotationRaw>, StoreError> {
        self.inner.annotations(task_id).await
    }

    async fn normalized_annotation(
        &mut self,
        task_id: TaskId,
    ) -> Result<Option<AnnotationNormalized>, StoreError> {
        self.inner.normalized_annotation(task_id).await
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<ReviewRecord>, StoreError> {
        self.inner.review(id).await
    }

    async fn list_reviews(
        &mut self,
        filter: &ReviewFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewRecord>, usize), StoreError> {
        self.inner.list_reviews(filter, offset, limit).await
    }

    fn insert_task(&mut self, task: TaskRecord) {
        self.inner.insert_task(task)
    }

    fn update_task(&mut self, task: TaskRecord) {
        self.inner.update_task(task)
    }

    fn update_contract(&mut self, contract: ContractRecord) {
        self.inner.update_contract(contract)
    }

    fn put_lease(&mut self, lease: TaskLease) {
        self.inner.put_lease(lease)
    }

    fn delete_lease(&mut self, task_id: TaskId) {
        self.inner.delete_lease(task_id)
    }

    fn append_annotation(&mut self, annotation: AnnotationRaw) {
        self.inner.append_annotation(annotation)
    }

    fn put_normalized_annotation(&mut self, doc: AnnotationNormalized) {
        self.inner.put_normalized_annotation(doc)
    }

    fn append_review(&mut self, review: ReviewRecord) {
        self.inner.append_review(review)
    }

    fn update_review(&mut self, review: ReviewRecord) {
        self.inner.update_review(review)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.barrier.wait().await;
        self.inner.commit().await
    }
}
