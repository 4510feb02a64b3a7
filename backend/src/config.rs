//! Runtime configuration.
//!
//! Read once at process start; backend selection derived from it is fixed
//! for the lifetime of the process.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that switches the process to the in-memory backend.
pub const TEST_MODE_ENV: &str = "RECOVERY_TRACKER_TEST_MODE";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RECOVERY_TRACKER_DATA_DIR";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the SQLite database file.
    pub data_dir: PathBuf,
    /// When set, the in-memory backend is used instead of SQLite.
    pub test_mode: bool,
    /// Quiet window after the last mutation before the cache is flushed.
    pub debounce: Duration,
    /// Upper bound on waiting for the durable store to open.
    pub load_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(env::temp_dir)
            .join("recovery-tracker");
        Self {
            data_dir,
            test_mode: false,
            debounce: Duration::from_millis(500),
            load_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Build the config from the process environment, falling back to
    /// platform defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        config.test_mode = env::var(TEST_MODE_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.data_dir.join("recovery.db").display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_points_into_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/tmp/rt-test"),
            ..Default::default()
        };
        assert_eq!(config.database_url(), "sqlite:/tmp/rt-test/recovery.db");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.test_mode);
        assert_eq!(config.debounce, Duration::from_millis(500));
    }
}
