//! Configuration schema.
//!
//! ```yaml
//! identity:
//!   name: cortex
//!   role: personal knowledge assistant
//!
//! logging:
//!   level: debug
//!   format: pretty
//!
//! runtime:
//!   data_dir: ./data
//!
//! plugins:
//!   notes:
//!     index_on_start: true
//! ```
//!
//! The `plugins` map is dynamic: each plugin owns the shape of its section
//! and deserializes it through its context (`ctx.config()`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration for a Cortex process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CortexConfig {
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
    pub runtime: RuntimeConfig,
    /// Per-plugin sections, keyed by plugin id.
    pub plugins: HashMap<String, Value>,
}

/// Who the assistant presents itself as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub role: String,
    pub description: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "cortex".to_string(),
            role: "personal knowledge assistant".to_string(),
            description: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level: trace, debug, info, warn, error.
    pub level: LogLevel,
    pub format: LogFormat,
    /// Module-specific overrides, e.g. `{ "cortex_jobs": "debug" }`.
    pub filters: HashMap<String, LogLevel>,
    /// Log file path; when set, output also goes to a rolling file.
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            filters: HashMap::new(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Runtime behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root directory for plugin data subdirectories.
    pub data_dir: PathBuf,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}
