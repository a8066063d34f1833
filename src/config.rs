//! Configuration for the percolator
//!
//! All settings have defaults, so `PercolatorConfig::default()` gives an
//! in-memory store that retains original queries and purges every 5 minutes.

use crate::error::{PercolatorError, Result};
use crate::storage::database::DEFAULT_READ_POOL_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default slow-evaluation threshold: 2ms
pub const DEFAULT_SLOW_LOG_LIMIT_NANOS: u64 = 2_000_000;

/// Default number of pending records that triggers an intermediate commit
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 5000;

/// Time unit for the purge frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a [`Duration`]
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}

/// Query store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. `None` keeps the store in memory.
    pub path: Option<PathBuf>,

    /// Read-only connections serving matches and scans of a file store
    pub read_pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

/// Main percolator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PercolatorConfig {
    /// Keep the serialized original of every query in the store
    pub store_queries: bool,

    /// How often the background task purges the query cache
    pub purge_frequency: u64,

    /// Unit of `purge_frequency`
    pub purge_frequency_unit: TimeUnit,

    /// Pending records above this count are committed mid-batch
    pub commit_batch_size: usize,

    /// Evaluations slower than this are recorded in the slow log
    pub slow_log_limit_nanos: u64,

    /// Query store settings
    pub storage: StorageConfig,
}

impl Default for PercolatorConfig {
    fn default() -> Self {
        Self {
            store_queries: true,
            purge_frequency: 5,
            purge_frequency_unit: TimeUnit::Minutes,
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            slow_log_limit_nanos: DEFAULT_SLOW_LOG_LIMIT_NANOS,
            storage: StorageConfig::default(),
        }
    }
}

impl PercolatorConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.purge_frequency == 0 {
            return Err(PercolatorError::Config(
                "purge_frequency must be greater than zero".to_string(),
            ));
        }
        if self.commit_batch_size == 0 {
            return Err(PercolatorError::Config(
                "commit_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.storage.read_pool_size == 0 {
            return Err(PercolatorError::Config(
                "storage.read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between background purges
    pub fn purge_interval(&self) -> Duration {
        self.purge_frequency_unit.to_duration(self.purge_frequency)
    }

    pub fn with_store_queries(mut self, store_queries: bool) -> Self {
        self.store_queries = store_queries;
        self
    }

    pub fn with_purge_frequency(mut self, frequency: u64, unit: TimeUnit) -> Self {
        self.purge_frequency = frequency;
        self.purge_frequency_unit = unit;
        self
    }

    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size;
        self
    }

    pub fn with_slow_log_limit(mut self, limit_nanos: u64) -> Self {
        self.slow_log_limit_nanos = limit_nanos;
        self
    }

    pub fn with_storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage.path = Some(path.into());
        self
    }

    pub fn with_read_pool_size(mut self, size: usize) -> Self {
        self.storage.read_pool_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PercolatorConfig::default();
        assert!(config.store_queries);
        assert_eq!(config.purge_interval(), Duration::from_secs(300));
        assert_eq!(config.commit_batch_size, 5000);
        assert_eq!(config.slow_log_limit_nanos, 2_000_000);
        assert!(config.storage.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_time_units() {
        assert_eq!(TimeUnit::Milliseconds.to_duration(250), Duration::from_millis(250));
        assert_eq!(TimeUnit::Seconds.to_duration(2), Duration::from_secs(2));
        assert_eq!(TimeUnit::Hours.to_duration(1), Duration::from_secs(3600));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = PercolatorConfig::default().with_purge_frequency(0, TimeUnit::Seconds);
        assert!(matches!(config.validate(), Err(PercolatorError::Config(_))));

        let config = PercolatorConfig::default().with_commit_batch_size(0);
        assert!(matches!(config.validate(), Err(PercolatorError::Config(_))));

        let config = PercolatorConfig::default().with_read_pool_size(0);
        assert!(matches!(config.validate(), Err(PercolatorError::Config(_))));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"store_queries": false, "purge_frequency": 10, "purge_frequency_unit": "seconds"}}"#
        )
        .unwrap();

        let config = PercolatorConfig::from_file(file.path()).unwrap();
        assert!(!config.store_queries);
        assert_eq!(config.purge_interval(), Duration::from_secs(10));
        assert_eq!(config.commit_batch_size, DEFAULT_COMMIT_BATCH_SIZE);
        assert_eq!(config.storage.read_pool_size, DEFAULT_READ_POOL_SIZE);
    }
}
