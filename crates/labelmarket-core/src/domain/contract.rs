//! Contract - タスクの所有者
//!
//! Contract の CRUD 自体は外部の責務です。ここでは権限判定と
//! 提出可否の判定に必要な最小限のフィールドだけを持ちます。

use serde::{Deserialize, Serialize};

use super::ids::{ContractId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Pending,
    Active,
    Submitted,
    Completed,
    Cancelled,
}

/// Agreement between one client and one labeler for a listing's work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,

    /// Listing this contract was signed for. Opaque here.
    pub listing_id: String,

    pub client_user_id: UserId,
    pub labeler_user_id: UserId,
    pub status: ContractStatus,

    #[serde(skip)]
    pub version: u64,
}

impl ContractRecord {
    pub fn new(
        id: ContractId,
        listing_id: impl Into<String>,
        client_user_id: UserId,
        labeler_user_id: UserId,
        status: ContractStatus,
    ) -> Self {
        Self {
            id,
            listing_id: listing_id.into(),
            client_user_id,
            labeler_user_id,
            status,
            version: 0,
        }
    }

    /// Both parties, for visibility checks.
    pub fn parties(&self) -> [UserId; 2] {
        [self.client_user_id, self.labeler_user_id]
    }
}
