//! TaskLifecycle - リース以外のタスク遷移と参照系
//!
//! # 担当
//! - generate_tasks: contract の asset ごとに ready のタスクを作る（contract ごとに 1 回だけ）
//! - review / accept / reject: submitted → accepted、または submitted → rejected → ready
//! - resolve_review: レビュー結果の修正（タスクの状態も付け替える）
//! - normalize_annotation: タスクごとに 1 つの正規化済み注釈を upsert
//! - get_task / list_tasks / annotations / list_reviews: 当事者と admin だけが見られる
//! - submit_contract: 全タスク accepted の contract を submitted にする
//! - release_expired_leases: admin 向けの sweep 入口

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::lease_manager::{LeaseManager, SweepReport};
use super::load_task_and_contract;
use crate::domain::{
    Actor, AnnotationNormalized, AnnotationPayload, AssetId, ContractId, ContractRecord,
    ContractStatus, LeaseError, ReviewDecision, ReviewId, ReviewRecord, TaskAnnotations, TaskId,
    TaskRecord, TaskStatus,
};
use crate::ports::{Clock, EntityStore, IdGenerator, ReviewFilter, StoreTx, TaskFilter};

const DEFAULT_PAGE_LIMIT: usize = 20;

/// Task listing request. Zero `page`/`limit` fall back to 1 and 20.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub contract_id: Option<ContractId>,
    pub status: Option<TaskStatus>,
    pub page: usize,
    pub limit: usize,
}

/// Review listing request, same paging rules as `TaskQuery`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewQuery {
    pub task_id: Option<TaskId>,
    pub decision: Option<ReviewDecision>,
    pub page: usize,
    pub limit: usize,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, window: PageWindow, total: usize) -> Self {
        Self {
            items,
            page: window.page,
            limit: window.limit,
            total,
            total_pages: total.div_ceil(window.limit),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PageWindow {
    page: usize,
    limit: usize,
    offset: usize,
}

impl PageWindow {
    fn new(page: usize, limit: usize) -> Self {
        let page = page.max(1);
        let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
        // past-the-end pages are simply empty
        let offset = (page - 1).saturating_mul(limit);
        Self {
            page,
            limit,
            offset,
        }
    }
}

pub struct TaskLifecycle<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    leases: Arc<LeaseManager<S>>,
}

impl<S: EntityStore> TaskLifecycle<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        leases: Arc<LeaseManager<S>>,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            leases,
        }
    }

    /// Create one `ready` task per asset of an active contract.
    ///
    /// Only once per contract; a repeated asset id fails the whole batch.
    pub async fn generate_tasks(
        &self,
        actor: &Actor,
        contract_id: ContractId,
        asset_ids: &[AssetId],
    ) -> Result<Vec<TaskRecord>, LeaseError> {
        let mut tx = self.store.begin().await?;
        let contract = tx
            .contract(contract_id)
            .await?
            .ok_or(LeaseError::NotFound("contract"))?;

        actor.ensure_any_of(
            &[contract.client_user_id],
            "only the contract's client can generate tasks",
        )?;

        if contract.status != ContractStatus::Active {
            return Err(LeaseError::invalid_state(
                "contract must be active before generating tasks",
            ));
        }
        if asset_ids.is_empty() {
            return Err(LeaseError::invalid_input("no assets to create tasks for"));
        }
        if !tx.tasks_for_contract(contract_id).await?.is_empty() {
            return Err(LeaseError::conflict("tasks already generated for this contract"));
        }

        let now = self.clock.now();
        let tasks: Vec<TaskRecord> = asset_ids
            .iter()
            .map(|asset_id| TaskRecord::new(self.ids.next_id(), contract_id, *asset_id, now))
            .collect();
        for task in &tasks {
            tx.insert_task(task.clone());
        }
        // The empty task list above pins no rows; writing the contract row
        // makes a concurrent generation for the same contract fail its commit.
        tx.update_contract(contract);
        tx.commit().await?;

        info!(contract_id = %contract_id, count = tasks.len(), "tasks generated");
        Ok(tasks)
    }

    pub async fn get_task(&self, actor: &Actor, task_id: TaskId) -> Result<TaskRecord, LeaseError> {
        let mut tx = self.store.begin().await?;
        let (task, contract) = load_task_and_contract(&mut tx, task_id).await?;
        actor.ensure_any_of(&contract.parties(), "you do not have access to this task")?;
        Ok(task)
    }

    /// Tasks visible to `actor`, oldest first.
    ///
    /// Non-admins only ever see tasks of contracts they are party to.
    pub async fn list_tasks(
        &self,
        actor: &Actor,
        query: &TaskQuery,
    ) -> Result<Page<TaskRecord>, LeaseError> {
        let window = PageWindow::new(query.page, query.limit);
        let filter = TaskFilter {
            contract_id: query.contract_id,
            status: query.status,
            party: (!actor.is_admin()).then_some(actor.user_id),
        };

        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_tasks(&filter, window.offset, window.limit).await?;
        Ok(Page::new(items, window, total))
    }

    /// Raw submissions (newest first) and the normalized document of a task.
    pub async fn annotations(
        &self,
        actor: &Actor,
        task_id: TaskId,
    ) -> Result<TaskAnnotations, LeaseError> {
        let mut tx = self.store.begin().await?;
        let (_, contract) = load_task_and_contract(&mut tx, task_id).await?;
        actor.ensure_any_of(&contract.parties(), "you do not have access to this task")?;

        Ok(TaskAnnotations {
            raw: tx.annotations(task_id).await?,
            normalized: tx.normalized_annotation(task_id).await?,
        })
    }

    /// Create or rewrite the normalized annotation of a task.
    ///
    /// Either party or an admin may normalize. Every rewrite bumps `version`.
    pub async fn normalize_annotation(
        &self,
        actor: &Actor,
        task_id: TaskId,
        normalized: AnnotationPayload,
    ) -> Result<AnnotationNormalized, LeaseError> {
        let mut tx = self.store.begin().await?;
        let (_, contract) = load_task_and_contract(&mut tx, task_id).await?;
        actor.ensure_any_of(&contract.parties(), "you do not have access to this task")?;

        let now = self.clock.now();
        let doc = match tx.normalized_annotation(task_id).await? {
            Some(mut doc) => {
                doc.rewrite(normalized, now);
                doc
            }
            None => AnnotationNormalized::new(task_id, actor.user_id, normalized, now),
        };
        tx.put_normalized_annotation(doc.clone());
        tx.commit().await?;

        info!(task_id = %task_id, version = doc.version, "annotation normalized");
        Ok(doc)
    }

    /// Reviews visible to `actor`, newest first.
    pub async fn list_reviews(
        &self,
        actor: &Actor,
        query: &ReviewQuery,
    ) -> Result<Page<ReviewRecord>, LeaseError> {
        let window = PageWindow::new(query.page, query.limit);
        let filter = ReviewFilter {
            task_id: query.task_id,
            decision: query.decision,
            party: (!actor.is_admin()).then_some(actor.user_id),
        };

        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_reviews(&filter, window.offset, window.limit).await?;
        Ok(Page::new(items, window, total))
    }

    /// QC decision on a submitted task.
    ///
    /// A rejected task goes straight back to `ready` so it can be leased
    /// and resubmitted.
    pub async fn review(
        &self,
        actor: &Actor,
        task_id: TaskId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<TaskRecord, LeaseError> {
        let mut tx = self.store.begin().await?;
        let (mut task, contract) = load_task_and_contract(&mut tx, task_id).await?;

        actor.ensure_any_of(
            &[contract.client_user_id],
            "only the contract's client can review tasks",
        )?;

        if task.status != TaskStatus::Submitted {
            return Err(LeaseError::invalid_state(format!(
                "cannot review task with status: {}",
                task.status
            )));
        }

        let now = self.clock.now();
        tx.append_review(ReviewRecord::new(
            self.ids.next_id(),
            task_id,
            actor.user_id,
            decision,
            notes,
            now,
        ));

        task.apply_decision(decision, now);
        tx.update_task(task.clone());
        tx.commit().await?;

        info!(
            task_id = %task_id,
            decision = ?decision,
            status = %task.status,
            "task reviewed"
        );
        Ok(task)
    }

    pub async fn accept(&self, actor: &Actor, task_id: TaskId) -> Result<TaskRecord, LeaseError> {
        self.review(actor, task_id, ReviewDecision::Accept, None).await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        task_id: TaskId,
        notes: Option<String>,
    ) -> Result<TaskRecord, LeaseError> {
        self.review(actor, task_id, ReviewDecision::Reject, notes).await
    }

    /// Revise an earlier QC decision.
    ///
    /// Only the original reviewer or an admin, only on an active contract,
    /// and only while the review is the task's latest and the task still sits
    /// where that review left it. A changed decision moves the task again
    /// (a revised reject lands in `ready`).
    pub async fn resolve_review(
        &self,
        actor: &Actor,
        review_id: ReviewId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<ReviewRecord, LeaseError> {
        let mut tx = self.store.begin().await?;
        let mut review = tx
            .review(review_id)
            .await?
            .ok_or(LeaseError::NotFound("review"))?;

        actor.ensure_any_of(
            &[review.reviewer_user_id],
            "only the original reviewer can update this review",
        )?;

        let (mut task, contract) = load_task_and_contract(&mut tx, review.task_id).await?;
        if contract.status != ContractStatus::Active {
            return Err(LeaseError::invalid_state(format!(
                "cannot revise reviews of a contract with status: {:?}",
                contract.status
            )));
        }

        let latest = ReviewFilter {
            task_id: Some(task.id),
            ..ReviewFilter::default()
        };
        let (newest, _) = tx.list_reviews(&latest, 0, 1).await?;
        if newest.first().map(|r| r.id) != Some(review_id) {
            return Err(LeaseError::invalid_state(
                "a newer review exists for this task",
            ));
        }
        if task.status != review.decision.settled_status() {
            return Err(LeaseError::invalid_state(format!(
                "task has moved on since this review (status: {})",
                task.status
            )));
        }

        let now = self.clock.now();
        if decision != review.decision {
            task.apply_decision(decision, now);
            tx.update_task(task.clone());
        }
        review.resolve(decision, notes, now);
        tx.update_review(review.clone());
        tx.commit().await?;

        info!(
            review_id = %review_id,
            task_id = %task.id,
            decision = ?decision,
            status = %task.status,
            "review resolved"
        );
        Ok(review)
    }

    /// Hand the finished contract back to the client.
    pub async fn submit_contract(
        &self,
        actor: &Actor,
        contract_id: ContractId,
    ) -> Result<ContractRecord, LeaseError> {
        let mut tx = self.store.begin().await?;
        let mut contract = tx
            .contract(contract_id)
            .await?
            .ok_or(LeaseError::NotFound("contract"))?;

        actor.ensure_any_of(
            &[contract.labeler_user_id],
            "only the labeler can submit this contract",
        )?;

        if contract.status != ContractStatus::Active {
            return Err(LeaseError::invalid_state(format!(
                "cannot submit contract with status: {:?}",
                contract.status
            )));
        }

        let tasks = tx.tasks_for_contract(contract_id).await?;
        let open = tasks
            .iter()
            .filter(|task| task.status != TaskStatus::Accepted)
            .count();
        if open > 0 {
            return Err(LeaseError::invalid_state(format!(
                "{open} of {} tasks are not accepted yet",
                tasks.len()
            )));
        }

        contract.status = ContractStatus::Submitted;
        tx.update_contract(contract.clone());
        tx.commit().await?;

        info!(contract_id = %contract_id, "contract submitted");
        Ok(contract)
    }

    /// Admin-triggered sweep.
    pub async fn release_expired_leases(&self, actor: &Actor) -> Result<SweepReport, LeaseError> {
        actor.ensure_admin("only admins can release expired leases")?;
        self.leases.sweep_expired().await
    }
}
