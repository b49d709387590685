//! Plugin lifecycle management.
//!
//! [`PluginManager`] is the central owner of all registered plugins. It:
//!
//! - Accepts plugins and records them with status [`PluginStatus::Registered`].
//! - Drives initialization with a **fixed-point loop**: each pass initializes
//!   every plugin whose dependencies are all `Initialized`, and the loop
//!   repeats until a pass makes no progress. A dependency that initializes
//!   late in one pass is picked up in the next, because unmet-ness is
//!   computed from live status, not from a pass-local set.
//! - Contains failures: a plugin whose `register` fails turns `Error` and its
//!   dependents follow with `Unmet dependencies: ...`, while healthy
//!   neighbors keep initializing.
//! - Publishes every transition on `system:plugin:lifecycle`.
//!
//! ```text
//! REGISTERED ──register ok──→ INITIALIZED ──disable──→ DISABLED ──enable──→ INITIALIZED
//!      │                           │
//!      ├──register err──→ ERROR    └──dep failure──→ ERROR
//!      └──unmet deps after fixpoint──→ ERROR
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use cortex_core::{LifecycleEvent, MessageBus, PluginLifecyclePayload, system};

use crate::daemon::DaemonRegistry;
use crate::error::PluginError;
use crate::plugin::{Plugin, PluginInfo, PluginStatus};
use crate::registrar::CapabilityRegistrar;
use crate::shell::Shell;

/// Central manager for plugin registration and lifecycle.
pub struct PluginManager {
    bus: Arc<MessageBus>,
    daemons: Arc<DaemonRegistry>,
    registrar: Arc<CapabilityRegistrar>,
    plugins: RwLock<HashMap<String, PluginInfo>>,
    /// Registration order; initialization passes scan in this order.
    order: RwLock<Vec<String>>,
    /// Order in which plugins reached `Initialized`; shutdown reverses it.
    init_order: RwLock<Vec<String>>,
}

impl PluginManager {
    pub(crate) fn new(
        bus: Arc<MessageBus>,
        daemons: Arc<DaemonRegistry>,
        registrar: Arc<CapabilityRegistrar>,
    ) -> Self {
        Self {
            bus,
            daemons,
            registrar,
            plugins: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            init_order: RwLock::new(Vec::new()),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Records a plugin with status `Registered`.
    ///
    /// Rejects empty ids, and duplicates with an error carrying the existing
    /// plugin's version. Validation happens before anything is stored.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let id = plugin.id().to_string();
        if id.trim().is_empty() {
            return Err(PluginError::EmptyId);
        }
        {
            let mut plugins = self.plugins.write();
            if let Some(existing) = plugins.get(&id) {
                return Err(PluginError::Duplicate {
                    id,
                    existing_version: existing.plugin.version().to_string(),
                });
            }
            let dependencies = plugin.dependencies();
            plugins.insert(
                id.clone(),
                PluginInfo {
                    plugin,
                    status: PluginStatus::Registered,
                    dependencies,
                    error: None,
                },
            );
            self.order.write().push(id.clone());
        }
        info!(plugin = %id, "Plugin registered");
        self.emit(&id, LifecycleEvent::Registered, None).await;
        Ok(())
    }

    // ─── Initialization ──────────────────────────────────────────────────────

    /// Runs the fixed-point initialization loop.
    ///
    /// Plugins left unprocessed at the fixed point (circular or dangling
    /// dependencies, or dependents of failed plugins) are marked `Error`
    /// with `Unmet dependencies: <list>`; their `register` is never called.
    pub async fn initialize_all(&self, shell: &Arc<Shell>) {
        let mut attempted: HashSet<String> = HashSet::new();

        loop {
            // Only freshly registered plugins participate; a second
            // initialize pass leaves initialized/disabled/failed ones alone.
            let pending: Vec<(String, Arc<dyn Plugin>, Vec<String>)> = {
                let plugins = self.plugins.read();
                self.order
                    .read()
                    .iter()
                    .filter(|id| !attempted.contains(*id))
                    .filter_map(|id| plugins.get(id).map(|info| (id, info)))
                    .filter(|(_, info)| info.status == PluginStatus::Registered)
                    .map(|(id, info)| {
                        (id.clone(), Arc::clone(&info.plugin), info.dependencies.clone())
                    })
                    .collect()
            };

            let mut progressed = false;
            for (id, plugin, dependencies) in pending {
                if !self.unmet(&dependencies).is_empty() {
                    continue;
                }
                attempted.insert(id.clone());
                progressed = true;
                self.initialize_one(&id, plugin, shell).await;
            }

            if !progressed {
                break;
            }
        }

        let unreachable: Vec<(String, Vec<String>)> = {
            let plugins = self.plugins.read();
            self.order
                .read()
                .iter()
                .filter(|id| !attempted.contains(*id))
                .filter(|id| {
                    plugins.get(id.as_str()).map(|i| i.status) == Some(PluginStatus::Registered)
                })
                .map(|id| {
                    let deps = plugins
                        .get(id.as_str())
                        .map(|i| i.dependencies.clone())
                        .unwrap_or_default();
                    let unmet: Vec<String> = deps
                        .into_iter()
                        .filter(|dep| {
                            plugins.get(dep.as_str()).map(|i| i.status)
                                != Some(PluginStatus::Initialized)
                        })
                        .collect();
                    (id.clone(), unmet)
                })
                .collect()
        };
        for (id, unmet) in unreachable {
            let message = format!("Unmet dependencies: {}", unmet.join(", "));
            warn!(plugin = %id, "{message}");
            self.set_status(&id, PluginStatus::Error, Some(message.clone()));
            self.emit(&id, LifecycleEvent::Error, Some(message)).await;
        }
    }

    async fn initialize_one(&self, id: &str, plugin: Arc<dyn Plugin>, shell: &Arc<Shell>) {
        self.emit(id, LifecycleEvent::BeforeInitialize, None).await;

        match plugin.register(shell).await {
            Ok(capabilities) => {
                self.set_status(id, PluginStatus::Initialized, None);
                self.init_order.write().push(id.to_string());
                self.registrar.register(id, capabilities).await;
                // Daemon start failures are logged inside the registry and do
                // not flip the plugin to Error.
                self.daemons.start_plugin(id).await;
                info!(plugin = %id, "Plugin initialized");
                self.emit(id, LifecycleEvent::Initialized, None).await;
            }
            Err(e) => {
                let message = e.to_string();
                error!(plugin = %id, error = %message, "Plugin register failed");
                self.set_status(id, PluginStatus::Error, Some(message.clone()));
                self.emit(id, LifecycleEvent::Error, Some(message)).await;
            }
        }
    }

    /// Dependencies that are missing from the registry or not `Initialized`.
    fn unmet(&self, dependencies: &[String]) -> Vec<String> {
        let plugins = self.plugins.read();
        dependencies
            .iter()
            .filter(|dep| {
                plugins.get(dep.as_str()).map(|i| i.status) != Some(PluginStatus::Initialized)
            })
            .cloned()
            .collect()
    }

    // ─── Disable / enable ────────────────────────────────────────────────────

    /// Transitions `Initialized → Disabled`, stopping the plugin's daemons.
    pub async fn disable(&self, id: &str) -> Result<(), PluginError> {
        self.expect_status(id, PluginStatus::Initialized)?;
        self.daemons.stop_plugin(id).await;
        self.set_status(id, PluginStatus::Disabled, None);
        info!(plugin = %id, "Plugin disabled");
        self.emit(id, LifecycleEvent::Disabled, None).await;
        Ok(())
    }

    /// Transitions `Disabled → Initialized`, restarting the plugin's daemons.
    pub async fn enable(&self, id: &str) -> Result<(), PluginError> {
        self.expect_status(id, PluginStatus::Disabled)?;
        self.daemons.start_plugin(id).await;
        self.set_status(id, PluginStatus::Initialized, None);
        info!(plugin = %id, "Plugin enabled");
        self.emit(id, LifecycleEvent::Enabled, None).await;
        Ok(())
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Manager-owned record for a plugin.
    pub fn get(&self, id: &str) -> Option<PluginInfo> {
        self.plugins.read().get(id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<PluginStatus> {
        self.plugins.read().get(id).map(|i| i.status)
    }

    /// All plugin ids in registration order.
    pub fn list_ids(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Ids of plugins in `Error` status.
    pub fn list_failed(&self) -> Vec<String> {
        let plugins = self.plugins.read();
        self.order
            .read()
            .iter()
            .filter(|id| plugins.get(*id).map(|i| i.status) == Some(PluginStatus::Error))
            .cloned()
            .collect()
    }

    pub fn package_name(&self, id: &str) -> Option<String> {
        self.plugins
            .read()
            .get(id)
            .map(|i| i.plugin.package_name().to_string())
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.read().len()
    }

    /// Ids in the order they reached `Initialized`.
    pub fn initialized_order(&self) -> Vec<String> {
        self.init_order.read().clone()
    }

    // ─── Shutdown ────────────────────────────────────────────────────────────

    /// Calls `shutdown` on initialized plugins in reverse init order.
    pub async fn shutdown_all(&self) {
        let order: Vec<String> = self.init_order.read().iter().rev().cloned().collect();
        for id in order {
            let plugin = {
                let plugins = self.plugins.read();
                plugins.get(&id).filter(|i| i.status == PluginStatus::Initialized).map(|i| Arc::clone(&i.plugin))
            };
            if let Some(plugin) = plugin {
                plugin.shutdown().await;
            }
        }
    }

    // ─── Internal ────────────────────────────────────────────────────────────

    fn set_status(&self, id: &str, status: PluginStatus, error: Option<String>) {
        if let Some(info) = self.plugins.write().get_mut(id) {
            info.status = status;
            info.error = error;
        }
    }

    fn expect_status(&self, id: &str, expected: PluginStatus) -> Result<(), PluginError> {
        let plugins = self.plugins.read();
        let info = plugins
            .get(id)
            .ok_or_else(|| PluginError::Unknown(id.to_string()))?;
        if info.status != expected {
            return Err(PluginError::InvalidState {
                id: id.to_string(),
                expected: expected.as_str(),
                actual: info.status.as_str(),
            });
        }
        Ok(())
    }

    async fn emit(&self, plugin_id: &str, event: LifecycleEvent, error: Option<String>) {
        let payload = PluginLifecyclePayload {
            plugin_id: plugin_id.to_string(),
            event,
            error,
            timestamp: Utc::now(),
        };
        let _ = self
            .bus
            .broadcast_channel(&system::PLUGIN_LIFECYCLE, &payload, "shell")
            .await;
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestPlugin, tap_lifecycle, test_shell};

    #[tokio::test]
    async fn initializes_in_dependency_order() {
        let shell = test_shell();
        // Registered deliberately in reverse dependency order.
        shell
            .register_plugin(TestPlugin::ok("c", &["b"]))
            .await
            .unwrap();
        shell
            .register_plugin(TestPlugin::ok("b", &["a"]))
            .await
            .unwrap();
        shell.register_plugin(TestPlugin::ok("a", &[])).await.unwrap();

        let log = tap_lifecycle(&shell);
        shell.initialize_plugins().await;

        let initialized: Vec<String> = log
            .lock()
            .iter()
            .filter(|(_, e)| *e == LifecycleEvent::Initialized)
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(initialized, ["a", "b", "c"]);
        assert_eq!(shell.manager().initialized_order(), ["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            assert_eq!(shell.manager().status(id), Some(PluginStatus::Initialized));
        }
    }

    #[tokio::test]
    async fn failure_is_contained_to_the_dependent_chain() {
        let shell = test_shell();
        shell.register_plugin(TestPlugin::ok("a", &[])).await.unwrap();
        shell
            .register_plugin(TestPlugin::failing("b", &["a"], "boom"))
            .await
            .unwrap();
        shell
            .register_plugin(TestPlugin::ok("c", &["b"]))
            .await
            .unwrap();
        shell.register_plugin(TestPlugin::ok("d", &[])).await.unwrap();

        let log = tap_lifecycle(&shell);
        shell.initialize_plugins().await;

        let manager = shell.manager();
        assert_eq!(manager.status("a"), Some(PluginStatus::Initialized));
        assert_eq!(manager.status("b"), Some(PluginStatus::Error));
        assert_eq!(manager.status("c"), Some(PluginStatus::Error));
        assert_eq!(manager.status("d"), Some(PluginStatus::Initialized));

        let errors = log
            .lock()
            .iter()
            .filter(|(_, e)| *e == LifecycleEvent::Error)
            .count();
        assert_eq!(errors, 2);

        assert_eq!(manager.get("b").unwrap().error.as_deref(), Some("boom"));
        assert_eq!(
            manager.get("c").unwrap().error.as_deref(),
            Some("Unmet dependencies: b")
        );
        assert_eq!(manager.list_failed(), ["b", "c"]);
    }

    #[tokio::test]
    async fn dependency_cycles_end_in_error() {
        let shell = test_shell();
        shell
            .register_plugin(TestPlugin::ok("a", &["b"]))
            .await
            .unwrap();
        shell
            .register_plugin(TestPlugin::ok("b", &["a"]))
            .await
            .unwrap();

        shell.initialize_plugins().await;
        assert_eq!(shell.manager().status("a"), Some(PluginStatus::Error));
        assert_eq!(shell.manager().status("b"), Some(PluginStatus::Error));
    }

    #[tokio::test]
    async fn dangling_dependency_ends_in_error() {
        let shell = test_shell();
        shell
            .register_plugin(TestPlugin::ok("a", &["ghost"]))
            .await
            .unwrap();

        shell.initialize_plugins().await;
        let info = shell.manager().get("a").unwrap();
        assert_eq!(info.status, PluginStatus::Error);
        assert_eq!(info.error.as_deref(), Some("Unmet dependencies: ghost"));
    }

    #[tokio::test]
    async fn duplicate_registration_reports_existing_version() {
        let shell = test_shell();
        shell.register_plugin(TestPlugin::ok("a", &[])).await.unwrap();
        let err = shell
            .register_plugin(TestPlugin::ok("a", &[]))
            .await
            .unwrap_err();
        match err {
            PluginError::Duplicate {
                id,
                existing_version,
            } => {
                assert_eq!(id, "a");
                assert_eq!(existing_version, "0.0.1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let shell = test_shell();
        let err = shell
            .register_plugin(TestPlugin::ok("", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::EmptyId));
    }

    #[tokio::test]
    async fn disable_requires_initialized_and_enable_requires_disabled() {
        let shell = test_shell();
        shell.register_plugin(TestPlugin::ok("a", &[])).await.unwrap();

        // Not initialized yet.
        assert!(shell.manager().disable("a").await.is_err());

        shell.initialize_plugins().await;
        shell.manager().disable("a").await.unwrap();
        assert_eq!(shell.manager().status("a"), Some(PluginStatus::Disabled));

        assert!(shell.manager().disable("a").await.is_err());
        shell.manager().enable("a").await.unwrap();
        assert_eq!(shell.manager().status("a"), Some(PluginStatus::Initialized));
    }
}
