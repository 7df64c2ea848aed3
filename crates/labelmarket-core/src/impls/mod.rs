//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryStore**: 開発用・テスト用の EntityStore
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します（例: Postgres 上の EntityStore）。

pub mod inmem_store;

// 主要な型を再エクスポート
pub use self::inmem_store::{InMemoryStore, InMemoryTx};
