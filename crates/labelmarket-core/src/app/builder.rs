//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 省略したポートは本番用のデフォルト（SystemClock など）で埋める

use std::sync::Arc;

use super::lease_manager::LeaseManager;
use super::lifecycle::TaskLifecycle;
use super::reaper_loop::ReaperLoop;
use crate::config::{ConfigError, LeaseConfig};
use crate::ports::{
    Clock, EntityStore, IdGenerator, RandomTokenGenerator, SystemClock, TokenGenerator,
    UlidGenerator,
};

/// AppBuilder はストアとポートを束ねて App を構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(InMemoryStore::new())
///     .config(LeaseConfig::load(Some(path))?)
///     .build()?;
/// let grant = app.leases.acquire(&actor, task_id, None).await?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に LeaseConfig::validate() を通す
/// - 不正なら BuildError を返し、App は作られない
pub struct AppBuilder<S> {
    store: Arc<S>,
    clock: Option<Arc<dyn Clock>>,
    tokens: Option<Arc<dyn TokenGenerator>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: LeaseConfig,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl<S: EntityStore> AppBuilder<S> {
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Build over a store the caller keeps a handle to.
    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            clock: None,
            tokens: None,
            ids: None,
            config: LeaseConfig::default(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: LeaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<App<S>, BuildError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(RandomTokenGenerator));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let leases = Arc::new(LeaseManager::new(
            Arc::clone(&self.store),
            Arc::clone(&clock),
            tokens,
            Arc::clone(&ids),
            self.config,
        ));
        let lifecycle = TaskLifecycle::new(
            Arc::clone(&self.store),
            clock,
            ids,
            Arc::clone(&leases),
        );

        Ok(App {
            store: self.store,
            leases,
            lifecycle,
        })
    }
}

/// Wired application.
pub struct App<S> {
    pub store: Arc<S>,
    pub leases: Arc<LeaseManager<S>>,
    pub lifecycle: TaskLifecycle<S>,
}

impl<S: EntityStore + 'static> App<S> {
    /// Reaper over this app's lease manager, on the configured interval.
    pub fn reaper(&self) -> Result<ReaperLoop<S>, ConfigError> {
        ReaperLoop::from_config(Arc::clone(&self.leases))
    }
}
