//! Configuration management system for Porter
//!
//! This crate provides layered configuration for the Porter task engine,
//! supporting YAML and TOML files, validation, and environment variable
//! overrides.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML, and JSON configuration files
//! - **Validation**: Type-safe configuration with validation on build
//! - **Environment overrides**: `PORTER__SECTION__KEY` variables
//! - **Defaults**: Sensible default values for every option
//!
//! # Examples
//!
//! ```rust
//! use porter_config::{Config, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_env_prefix("PORTER")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! assert!(config.queueing.auto_queue);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use porter_types::{CopyChunkSize, ErrorPolicy, EstimateBudget, LiveTaskLimit, SampleInterval};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for Porter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler queueing behavior
    pub queueing: QueueingConfig,
    /// Executor behavior
    pub execution: ExecutionConfig,
    /// Progress sampling and polling
    pub progress: ProgressConfig,
    /// Error escalation
    pub errors: ErrorsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler queueing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueingConfig {
    /// Queue new tasks automatically while other tasks are live
    pub auto_queue: bool,
    /// Run queued tasks concurrently when their volumes do not conflict
    pub smart: bool,
    /// Maximum number of tasks running unqueued at once
    pub live_task_limit: LiveTaskLimit,
    /// Pause all queued tasks when a running task aborts on error
    pub pause_queued_on_error: bool,
}

impl Default for QueueingConfig {
    fn default() -> Self {
        Self {
            auto_queue: true,
            smart: false,
            live_task_limit: LiveTaskLimit::default(),
            pause_queued_on_error: true,
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Chunk size for file payload copies
    pub chunk_size: CopyChunkSize,
    /// Preserve modification/access times on copy
    pub preserve_timestamps: bool,
    /// Time budget for the pre-run total-size walk
    pub estimate_budget: EstimateBudget,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CopyChunkSize::default(),
            preserve_timestamps: true,
            estimate_budget: EstimateBudget::default(),
        }
    }
}

/// Progress sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Interval between throughput samples
    pub sample_interval: SampleInterval,
    /// Interval at which observers poll task snapshots
    pub poll_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            sample_interval: SampleInterval::default(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Error escalation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorsConfig {
    /// Default abort-vs-continue policy for new tasks
    pub policy: ErrorPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable file logging
    pub enable_file_logging: bool,
    /// Log file path
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_file_logging: false,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.queueing.auto_queue);
        assert!(!config.queueing.smart);
        assert_eq!(config.queueing.live_task_limit.get(), 1);
        assert!(config.execution.preserve_timestamps);
        assert_eq!(
            config.progress.sample_interval.get(),
            Duration::from_secs(2)
        );
        assert_eq!(config.errors.policy, ErrorPolicy::Continue);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = Config::default();
        let text = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            back.execution.chunk_size.get(),
            config.execution.chunk_size.get()
        );
    }
}
