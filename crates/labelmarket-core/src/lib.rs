//! labelmarket-core
//!
//! Task leasing and lifecycle core of the labeling marketplace.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, lease, annotation, review, contract, actor, errors）
//! - **ports**: 抽象化レイヤー（EntityStore, Clock, TokenGenerator, IdGenerator）
//! - **app**: アプリケーションロジック（builder, lease_manager, lifecycle, reaper_loop）
//! - **impls**: 実装（InMemoryStore）
//! - **config**: LeaseConfig（ファイル or 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{
    App, AppBuilder, BuildError, LeaseGrant, LeaseManager, Page, ReaperHandle, ReaperLoop,
    ReviewQuery, SweepReport, TaskLifecycle, TaskQuery,
};
pub use self::config::{ConfigError, LeaseConfig};
pub use self::domain::{LeaseError, StoreError};
