//! Logging setup on top of `tracing-subscriber`.
//!
//! # Example
//!
//! ```rust,ignore
//! LoggingBuilder::new()
//!     .with_level("debug")
//!     .directive("cortex_jobs=trace")
//!     .init();
//! ```

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

/// Builder for the process-wide tracing subscriber.
#[derive(Default)]
pub struct LoggingBuilder {
    level: Option<String>,
    directives: Vec<String>,
    format: LogFormat,
    file_path: Option<PathBuf>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preconfigured from a [`LoggingConfig`] section.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new().with_level(config.level.as_str());
        for (module, level) in &config.filters {
            builder = builder.directive(&format!("{module}={level}"));
        }
        builder.format = config.format;
        builder.file_path = config.file_path.clone();
        builder
    }

    /// Sets the base level (`trace` ... `error`).
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = Some(level.to_string());
        self
    }

    /// Adds a filter directive such as `cortex_host=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Also writes logs to a daily-rolling file at `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    fn build_filter(&self) -> EnvFilter {
        // RUST_LOG wins over configured levels.
        let base = self.level.as_deref().unwrap_or("info");
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Installs the subscriber. Panics if one is already set; prefer
    /// [`try_init`](Self::try_init) when unsure.
    pub fn init(self) {
        self.try_init().expect("logging already initialized");
    }

    /// Installs the subscriber, returning an error if one is already set.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.build_filter();

        let file_layer = self.file_path.as_ref().map(|path| {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "cortex.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            fmt::layer().with_ansi(false).with_writer(appender)
        });

        let registry = tracing_subscriber::registry().with(filter).with(file_layer);

        match self.format {
            #[cfg(feature = "json-log")]
            LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => registry.with(fmt::layer().compact()).try_init()?,
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init()?,
            LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
        }
        Ok(())
    }
}
