//! Executor configuration via `sqlexec.toml`
//!
//! Every field has a default, so an empty file (or `ExecutorConfig::default()`)
//! is a valid configuration: serial execution, 30 second shutdown grace.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ExecError, ExecResult};
use crate::types::Concurrency;

/// Config file name conventionally used for executor settings.
pub const CONFIG_FILE_NAME: &str = "sqlexec.toml";

fn default_concurrency() -> String {
    "serial".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    30_000
}

fn default_idle_keep_alive_ms() -> u64 {
    60_000
}

fn default_thread_name_prefix() -> String {
    "sqlexec-worker".to_string()
}

/// Executor configuration.
///
/// # Example
///
/// ```toml
/// # "serial" (default), "unbounded", or a worker count such as "4"
/// concurrency = "4"
/// shutdown_grace_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Concurrency bound: `"serial"`, `"unbounded"`, or a positive integer.
    #[serde(default = "default_concurrency")]
    pub concurrency: String,
    /// How long `close()` waits for in-flight tasks before cancelling them.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// How long an idle worker of an unbounded executor lingers.
    #[serde(default = "default_idle_keep_alive_ms")]
    pub idle_keep_alive_ms: u64,
    /// Worker thread name prefix; threads are `{prefix}-{n}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Reject submissions once this many tasks are waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_depth: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            idle_keep_alive_ms: default_idle_keep_alive_ms(),
            thread_name_prefix: default_thread_name_prefix(),
            max_queue_depth: None,
        }
    }
}

impl ExecutorConfig {
    /// Create an ExecutorConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency bound
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency.to_string();
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the idle keep-alive for unbounded workers
    pub fn with_idle_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.idle_keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Bound the number of waiting tasks
    pub fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = Some(max_queue_depth);
        self
    }

    /// Parse the concurrency string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"serial"`, `"unbounded"` or a
    /// positive integer.
    pub fn concurrency(&self) -> ExecResult<Concurrency> {
        self.concurrency.parse()
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Idle keep-alive for unbounded workers
    pub fn idle_keep_alive(&self) -> Duration {
        Duration::from_millis(self.idle_keep_alive_ms)
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::Config` naming the first invalid field.
    pub fn validate(&self) -> ExecResult<()> {
        self.concurrency()?;
        if self.thread_name_prefix.is_empty() {
            return Err(ExecError::config("thread_name_prefix must not be empty"));
        }
        if self.max_queue_depth == Some(0) {
            return Err(ExecError::config("max_queue_depth must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# sqlexec executor configuration
#
# Concurrency: "serial" (default), "unbounded", or a worker count like "4"
#   "serial"    = one worker, tasks run in submission order
#   "unbounded" = a worker per submission when none is idle
concurrency = "serial"

# How long shutdown waits for in-flight tasks before cancelling them
shutdown_grace_ms = 30000

# How long an idle worker of an unbounded executor lingers
idle_keep_alive_ms = 60000

# Worker thread names are "<prefix>-<n>"
thread_name_prefix = "sqlexec-worker"

# Reject submissions once this many tasks are waiting (default: unlimited)
# max_queue_depth = 1024
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> ExecResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ExecutorConfig = toml::from_str(&content).map_err(|e| {
            ExecError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> ExecResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                ExecError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> ExecResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ExecError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            ExecError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
