//! # cortex-runtime
//!
//! Process orchestration for the Cortex plugin host: configuration loading
//! (figment, YAML/TOML, env overrides), logging setup, and the run loop
//! with graceful shutdown.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigLoader, CortexConfig, load_config};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{CortexRuntime, CortexRuntimeBuilder};
