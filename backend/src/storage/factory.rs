//! Backend selection.
//!
//! One backend is constructed at process start from the runtime config and
//! handed to every consumer by reference; the choice is never switched
//! mid-run.

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::storage::{MemoryBackend, SqliteBackend, StorageBackend};

/// Construct the configured storage backend. Must be called from within the
/// async runtime: the durable backend spawns its store-open task
/// immediately.
pub fn create_backend(config: &AppConfig) -> Arc<dyn StorageBackend> {
    if config.test_mode {
        info!("Test mode: using in-memory storage backend");
        Arc::new(MemoryBackend::new())
    } else {
        let url = config.database_url();
        info!("Using SQLite storage backend at {}", url);
        Arc::new(SqliteBackend::open(url, config.load_timeout))
    }
}
