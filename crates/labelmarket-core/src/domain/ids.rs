//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type で型ごとに区別します。
//! `TaskId` と `ContractId` は実行時には同じ 128-bit 値ですが、
//! コンパイル時には混同できません。
//!
//! Task / AnnotationRaw / Review はこのクレートで採番しますが、
//! Contract / Asset / User は外部の CRUD 層から渡される ID です。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "contract-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// JSON には ULID 文字列としてそのまま出力されます（プレフィックスなし）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh random id stamped with the current wall clock.
    ///
    /// Only for records created outside this crate (contracts, assets, users)
    /// and for tests; task-side ids come from an `IdGenerator`.
    pub fn random() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($marker:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(Task, "task-");
id_marker!(Contract, "contract-");
id_marker!(Asset, "asset-");
id_marker!(User, "user-");
id_marker!(Annotation, "annotation-");
id_marker!(Review, "review-");

/// Identifier of a Task (one asset's unit of work under a contract).
pub type TaskId = Id<Task>;

/// Identifier of a Contract (owned by the external CRUD layer).
pub type ContractId = Id<Contract>;

/// Identifier of an Asset (owned by the external CRUD layer).
pub type AssetId = Id<Asset>;

/// Identifier of a User (client, labeler or admin).
pub type UserId = Id<User>;

/// Identifier of an AnnotationRaw row.
pub type AnnotationId = Id<Annotation>;

/// Identifier of a QC Review.
pub type ReviewId = Id<Review>;
