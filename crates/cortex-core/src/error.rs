//! Error types shared across the Cortex core.

use thiserror::Error;

/// Errors raised by the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// Payload or response (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A subscriber handled the request and reported an error.
    #[error("handler error: {0}")]
    Handler(String),
}

/// Errors raised by external collaborator services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors raised by template formatters.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("format error: {0}")]
    Format(String),

    #[error("parse error: {0}")]
    Parse(String),
}
