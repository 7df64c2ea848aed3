//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **LeaseManager**: リースの発行・提出・期限切れ回収
//! - **TaskLifecycle**: タスク生成、QC、参照系、contract 提出
//! - **ReaperLoop**: Lease 期限切れの定期回収

pub mod builder;
pub mod lease_manager;
pub mod lifecycle;
pub mod reaper_loop;

#[cfg(test)]
pub(crate) mod testing;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::lease_manager::{LeaseGrant, LeaseManager, SweepReport};
pub use self::lifecycle::{Page, ReviewQuery, TaskLifecycle, TaskQuery};
pub use self::reaper_loop::{ReaperHandle, ReaperLoop};

use crate::domain::{ContractRecord, LeaseError, TaskId, TaskRecord};
use crate::ports::StoreTx;

/// Read a task and the contract that owns it within `tx`.
pub(crate) async fn load_task_and_contract<T: StoreTx>(
    tx: &mut T,
    task_id: TaskId,
) -> Result<(TaskRecord, ContractRecord), LeaseError> {
    let task = tx.task(task_id).await?.ok_or(LeaseError::NotFound("task"))?;
    let contract = tx
        .contract(task.contract_id)
        .await?
        .ok_or(LeaseError::NotFound("contract"))?;
    Ok((task, contract))
}
