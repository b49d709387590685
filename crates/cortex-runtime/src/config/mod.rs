//! Configuration loading, schema, and validation.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, load_config};
pub use schema::{
    CortexConfig, IdentityConfig, LogFormat, LogLevel, LoggingConfig, RuntimeConfig,
};
pub use validation::validate_config;
