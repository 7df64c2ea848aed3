//! LeaseManager - タスクのリース発行・提出・回収
//!
//! # フロー
//! 1. acquire: ready → leased（TaskLease を作成 or 上書き、token を発行）
//! 2. submit: leased → submitted（token 照合、期限確認、AnnotationRaw 追記、lease 削除）
//! 3. sweep_expired: 期限切れ lease を 1 件ずつ回収して leased → ready
//!
//! どの操作も 1 トランザクションで読み書きします。同時実行の調停は
//! EntityStore の commit 時検証に任せ、ここではロックを取りません。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::load_task_and_contract;
use crate::config::LeaseConfig;
use crate::domain::{
    Actor, AnnotationPayload, AnnotationRaw, LeaseError, LeaseToken, TaskId, TaskLease,
    TaskRecord, TaskStatus,
};
use crate::ports::{Clock, EntityStore, IdGenerator, StoreTx, TokenGenerator};

/// Result of a successful acquire. The token is shown to the labeler once.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseGrant {
    pub task: TaskRecord,
    pub lease_token: LeaseToken,
    pub leased_until: DateTime<Utc>,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Leases deleted and their tasks returned to `ready`.
    pub released: usize,

    /// Expired leases reclaimed by another transaction first, plus leftover
    /// rows whose task was no longer `leased` (deleted, task untouched).
    pub skipped: usize,
}

/// What reclaiming one expired lease did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reclaimed {
    /// Lease deleted and its task returned to `ready`.
    Released,
    /// Lease deleted; the task had already left `leased`.
    Cleared,
    /// Already deleted or renewed.
    Gone,
}

pub struct LeaseManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
    ids: Arc<dyn IdGenerator>,
    config: LeaseConfig,
}

impl<S: EntityStore> LeaseManager<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenGenerator>,
        ids: Arc<dyn IdGenerator>,
        config: LeaseConfig,
    ) -> Self {
        Self {
            store,
            clock,
            tokens,
            ids,
            config,
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Take exclusive custody of a task for `duration_minutes`
    /// (configured default when `None`).
    ///
    /// Only the contract's labeler or an admin may lease. Of two concurrent
    /// calls for the same task exactly one commits; the other gets
    /// `LeaseError::Conflict`.
    pub async fn acquire(
        &self,
        actor: &Actor,
        task_id: TaskId,
        duration_minutes: Option<u32>,
    ) -> Result<LeaseGrant, LeaseError> {
        let duration = self.lease_duration(duration_minutes)?;

        let mut tx = self.store.begin().await?;
        let (mut task, contract) = load_task_and_contract(&mut tx, task_id).await?;

        actor.ensure_any_of(
            &[contract.labeler_user_id],
            "you are not the labeler for this contract",
        )?;

        if !task.status.is_leasable() {
            return Err(LeaseError::invalid_state(format!(
                "cannot lease task with status: {}",
                task.status
            )));
        }

        let now = self.clock.now();
        let existing = tx.lease(task_id).await?;
        if let Some(lease) = &existing
            && !lease.is_expired(now)
        {
            return Err(LeaseError::conflict("task is already leased"));
        }

        let lease_token = self.tokens.next_token();
        let leased_until = now + duration;

        // One row per task: an expired leftover is overwritten, never duplicated.
        let lease = match existing {
            Some(mut lease) => {
                lease.renew(actor.user_id, lease_token.clone(), leased_until);
                lease
            }
            None => TaskLease::new(task_id, actor.user_id, lease_token.clone(), leased_until),
        };
        tx.put_lease(lease);

        task.mark_leased(now);
        tx.update_task(task.clone());
        tx.commit().await?;

        info!(
            task_id = %task_id,
            labeler = %actor.user_id,
            leased_until = %leased_until,
            "task leased"
        );

        Ok(LeaseGrant {
            task,
            lease_token,
            leased_until,
        })
    }

    /// Hand in an annotation under a lease.
    ///
    /// A token mismatch is `Forbidden`; an elapsed lease is `Expired` and
    /// leaves the task `leased` until a sweep or a new acquire reclaims it.
    pub async fn submit(
        &self,
        actor: &Actor,
        task_id: TaskId,
        lease_token: &LeaseToken,
        payload: AnnotationPayload,
    ) -> Result<TaskRecord, LeaseError> {
        let mut tx = self.store.begin().await?;
        let (mut task, contract) = load_task_and_contract(&mut tx, task_id).await?;

        actor.ensure_any_of(
            &[contract.labeler_user_id],
            "you are not the labeler for this contract",
        )?;

        if task.status != TaskStatus::Leased {
            return Err(LeaseError::invalid_state(format!(
                "cannot submit task with status: {}",
                task.status
            )));
        }

        let lease = tx
            .lease(task_id)
            .await?
            .filter(|lease| lease.token_matches(lease_token))
            .ok_or_else(|| LeaseError::forbidden("invalid or expired lease token"))?;

        let now = self.clock.now();
        if lease.is_expired(now) {
            return Err(LeaseError::Expired {
                task_id,
                leased_until: lease.leased_until,
            });
        }

        let annotation = AnnotationRaw::new(
            self.ids.next_id(),
            task_id,
            actor.user_id,
            payload,
            now,
        );
        tx.append_annotation(annotation);

        task.mark_submitted(now);
        tx.update_task(task.clone());
        tx.delete_lease(task_id);
        tx.commit().await?;

        info!(
            task_id = %task_id,
            attempt = task.attempt_count,
            "task submitted"
        );

        Ok(task)
    }

    /// Reclaim every lease that expired before now.
    ///
    /// Works page by page (`sweep_batch_size`); each lease is reclaimed in
    /// its own transaction together with its task. Safe to run concurrently
    /// with acquire/submit and with itself.
    pub async fn sweep_expired(&self) -> Result<SweepReport, LeaseError> {
        let now = self.clock.now();
        let batch = self.config.sweep_batch_size.max(1);
        let mut report = SweepReport::default();

        loop {
            let page = {
                let mut tx = self.store.begin().await?;
                tx.expired_leases(now, batch).await?
            };
            let page_len = page.len();
            let mut progressed = false;

            for lease in page {
                match self.reclaim(&lease, now).await {
                    Ok(Reclaimed::Released) => {
                        report.released += 1;
                        progressed = true;
                    }
                    Ok(Reclaimed::Cleared) => {
                        report.skipped += 1;
                        progressed = true;
                    }
                    Ok(Reclaimed::Gone) => report.skipped += 1,
                    Err(LeaseError::Conflict(reason)) => {
                        debug!(task_id = %lease.task_id, %reason, "lease reclaim lost a race");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            if page_len < batch || !progressed {
                break;
            }
        }

        info!(
            released = report.released,
            skipped = report.skipped,
            "expired lease sweep finished"
        );
        Ok(report)
    }

    async fn reclaim(
        &self,
        expired: &TaskLease,
        now: DateTime<Utc>,
    ) -> Result<Reclaimed, LeaseError> {
        let task_id = expired.task_id;
        let mut tx = self.store.begin().await?;

        let Some(current) = tx.lease(task_id).await? else {
            return Ok(Reclaimed::Gone);
        };
        if current.lease_token != expired.lease_token || !current.is_expired(now) {
            return Ok(Reclaimed::Gone);
        }

        tx.delete_lease(task_id);
        let outcome = match tx.task(task_id).await? {
            Some(mut task) if task.status == TaskStatus::Leased => {
                task.release(now);
                tx.update_task(task);
                Reclaimed::Released
            }
            _ => Reclaimed::Cleared,
        };
        tx.commit().await?;

        debug!(task_id = %task_id, ?outcome, "expired lease reclaimed");
        Ok(outcome)
    }

    fn lease_duration(&self, minutes: Option<u32>) -> Result<Duration, LeaseError> {
        let minutes = minutes.unwrap_or(self.config.default_lease_minutes);
        let (min, max) = (self.config.min_lease_minutes, self.config.max_lease_minutes);
        if !(min..=max).contains(&minutes) {
            return Err(LeaseError::invalid_input(format!(
                "lease duration must be between {min} and {max} minutes, got {minutes}"
            )));
        }
        Ok(Duration::minutes(i64::from(minutes)))
    }
}
