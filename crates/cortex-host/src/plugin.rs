//! The plugin contract.
//!
//! A plugin is a self-contained unit that registers capabilities into the
//! shell. Its `register` builds a context of the appropriate tier, wires
//! handlers, templates, data sources and daemons, and returns a
//! [`Capabilities`] bundle for the registrar to fan out.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Notes;
//!
//! #[async_trait]
//! impl Plugin for Notes {
//!     fn id(&self) -> &str { "notes" }
//!     fn package_name(&self) -> &str { "cortex-plugin-notes" }
//!     fn version(&self) -> &str { "0.1.0" }
//!     fn plugin_type(&self) -> PluginType { PluginType::Service }
//!
//!     async fn register(&self, shell: &Arc<Shell>) -> Result<Capabilities, PluginError> {
//!         let ctx = ServiceContext::new(Arc::clone(shell), self.id());
//!         ctx.register_job_handler("index", Arc::new(IndexHandler))?;
//!         Ok(ctx.capabilities().tool(make_search_tool(&ctx)).build())
//!     }
//! }
//! ```

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cortex_core::Capabilities;

use crate::error::{ContextError, PluginError};
use crate::shell::Shell;

/// Functional tier of a plugin, selecting the context it is entitled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Read-only foundation plugins.
    Core,
    /// Plugins that own data and background work.
    Service,
    /// Plugins that render conversations to users.
    Interface,
}

/// Serializable descriptor of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub package_name: String,
}

/// A unit of functionality registered into the shell.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Process-unique plugin id; also the namespace prefix for everything
    /// the plugin emits.
    fn id(&self) -> &str;

    /// Cargo package the plugin ships in.
    fn package_name(&self) -> &str;

    fn version(&self) -> &str;

    fn plugin_type(&self) -> PluginType;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Ids of plugins that must be `Initialized` before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once by the manager, in dependency order.
    ///
    /// Returning `Err` marks the plugin `Error`; healthy neighbors continue.
    async fn register(&self, shell: &Arc<Shell>) -> Result<Capabilities, PluginError>;

    /// Best-effort teardown, called in reverse initialization order.
    async fn shutdown(&self) {}

    /// Assembled metadata snapshot.
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            id: self.id().to_string(),
            version: self.version().to_string(),
            plugin_type: self.plugin_type(),
            description: self.description().map(str::to_string),
            dependencies: self.dependencies(),
            package_name: self.package_name().to_string(),
        }
    }
}

/// Lifecycle status tracked by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PluginStatus {
    Registered,
    Initialized,
    Error,
    Disabled,
}

impl PluginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Initialized => "INITIALIZED",
            Self::Error => "ERROR",
            Self::Disabled => "DISABLED",
        }
    }
}

/// Manager-owned record of a plugin. Created at registration, mutated only
/// by the manager, kept for process lifetime.
#[derive(Clone)]
pub struct PluginInfo {
    pub plugin: Arc<dyn Plugin>,
    pub status: PluginStatus,
    pub dependencies: Vec<String>,
    pub error: Option<String>,
}

impl std::fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInfo")
            .field("id", &self.plugin.id())
            .field("status", &self.status)
            .field("dependencies", &self.dependencies)
            .field("error", &self.error)
            .finish()
    }
}

/// Write-once slot a plugin can use to stash its context during `register`.
///
/// Reading before `register` ran is a programmer error and surfaces as
/// [`ContextError::NotInitialized`] rather than a panic.
pub struct ContextSlot<T>(OnceLock<T>);

impl<T> ContextSlot<T> {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn set(&self, value: T) -> Result<(), ContextError> {
        self.0.set(value).map_err(|_| ContextError::AlreadySet)
    }

    pub fn get(&self) -> Result<&T, ContextError> {
        self.0.get().ok_or(ContextError::NotInitialized)
    }
}

impl<T> Default for ContextSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_slot_errors_before_set() {
        let slot: ContextSlot<u32> = ContextSlot::new();
        assert!(matches!(slot.get(), Err(ContextError::NotInitialized)));
        slot.set(7).unwrap();
        assert_eq!(*slot.get().unwrap(), 7);
        assert!(matches!(slot.set(8), Err(ContextError::AlreadySet)));
    }
}
