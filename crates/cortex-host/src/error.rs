//! Host error types.

use thiserror::Error;

/// Errors raised during plugin registration and initialization.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A plugin declared an empty id.
    #[error("plugin id must not be empty")]
    EmptyId,

    /// The id is already taken; carries the version of the existing plugin.
    #[error("plugin '{id}' is already registered (existing version {existing_version})")]
    Duplicate { id: String, existing_version: String },

    /// `register` itself failed; the plugin transitions to `Error`.
    #[error("{0}")]
    RegisterFailed(String),

    /// Operation requires a plugin that is not registered.
    #[error("unknown plugin '{0}'")]
    Unknown(String),

    /// `disable`/`enable` called in the wrong state.
    #[error("plugin '{id}' is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl PluginError {
    pub fn register_failed(message: impl Into<String>) -> Self {
        Self::RegisterFailed(message.into())
    }
}

/// Errors raised by the shell's write-once service registries.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The key is already taken; registries are write-once-per-key.
    #[error("'{key}' is already registered in the {registry} registry")]
    Conflict { registry: &'static str, key: String },

    /// Lookup failed.
    #[error("'{key}' is not registered in the {registry} registry")]
    NotFound { registry: &'static str, key: String },

    /// A registered item was found but its operation failed.
    #[error("{registry} '{key}' failed: {message}")]
    Failed {
        registry: &'static str,
        key: String,
        message: String,
    },
}

impl RegistryError {
    pub fn conflict(registry: &'static str, key: impl Into<String>) -> Self {
        Self::Conflict {
            registry,
            key: key.into(),
        }
    }

    pub fn not_found(registry: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            registry,
            key: key.into(),
        }
    }
}

/// Programmer errors in context usage, plus propagated job-write failures.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A context was read before the plugin's `register` stored it.
    #[error("context accessed before register() ran")]
    NotInitialized,

    /// A context slot was written twice.
    #[error("context already set")]
    AlreadySet,

    /// Interface-tier job writes require explicitly scoped types.
    #[error("job type '{0}' must be scoped as 'pluginId:type' at the interface tier")]
    UnscopedJobType(String),

    /// The underlying job queue rejected the write.
    #[error(transparent)]
    Queue(#[from] cortex_jobs::JobError),
}

/// Errors raised while assembling the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("shell is missing the {0} service")]
    MissingService(&'static str),
}
