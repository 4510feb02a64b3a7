//! # Recovery Tracker Backend
//!
//! Local state-and-persistence core of the recovery tracking app. The UI
//! layers talk to two surfaces:
//! - the [`storage::StorageBackend`] protocol for profile and transaction
//!   CRUD, and
//! - the [`domain::RecoveryService`] for urge recording, streaks and goals.
//!
//! Everything is wired once at process start through [`Backend::new`]; the
//! storage backend choice (SQLite vs in-memory) is fixed for the lifetime
//! of the process.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod config;
pub mod domain;
pub mod errors;
pub mod storage;

pub use config::AppConfig;
pub use errors::PersistenceError;

/// Main backend struct that owns the storage backend and the stateful
/// domain service.
pub struct Backend {
    pub storage: Arc<dyn storage::StorageBackend>,
    pub recovery: domain::RecoveryService,
}

impl Backend {
    /// Construct the backend from config: pick the storage backend, wait
    /// for it to load, and prime the recovery service's caches.
    pub async fn new(config: AppConfig) -> Result<Self> {
        if !config.test_mode {
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        }

        let storage = storage::create_backend(&config);
        storage
            .wait_for_load()
            .await
            .context("storage backend failed to load")?;

        let recovery = domain::RecoveryService::new(storage.clone(), config.debounce);
        recovery.load().await.context("loading recovery state")?;

        info!("Backend initialized");
        Ok(Self { storage, recovery })
    }

    /// Construct a backend from the process environment.
    pub async fn from_env() -> Result<Self> {
        Self::new(AppConfig::from_env()).await
    }
}

/// Install the default tracing subscriber for the embedding app. Safe to
/// call once at startup; tests use their own subscribers.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
