//! Interface error types.

use thiserror::Error;

use cortex_core::ServiceError;
use cortex_host::{ContextError, RegistryError};

/// Errors raised by user-facing interfaces.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The platform adapter failed to deliver a message.
    #[error("send failed: {0}")]
    Send(String),

    /// The platform adapter failed to edit a message.
    #[error("edit failed: {0}")]
    Edit(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
