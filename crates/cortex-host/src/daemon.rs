//! Daemon registry: long-lived start/stop/healthcheck processes owned by
//! plugins.
//!
//! Keyed `pluginId:name`. Each daemon moves through
//! `stopped → starting → running → stopping → {stopped | error}`
//! independently; a failing start is logged and parked in `error` without
//! affecting its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use cortex_core::{Daemon, DaemonHealth, ServiceError};

use crate::context::scope::scoped_key;
use crate::error::RegistryError;

/// Lifecycle state of one daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

struct DaemonEntry {
    plugin_id: String,
    daemon: Arc<dyn Daemon>,
    state: DaemonState,
}

/// Registry of all plugin-owned daemons.
pub struct DaemonRegistry {
    entries: RwLock<HashMap<String, DaemonEntry>>,
}

impl DaemonRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a daemon under `pluginId:name`, initially `stopped`.
    pub fn register(
        &self,
        plugin_id: &str,
        name: &str,
        daemon: Arc<dyn Daemon>,
    ) -> Result<(), RegistryError> {
        let key = scoped_key(plugin_id, name);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(RegistryError::conflict("daemon", key));
        }
        info!(daemon = %key, "Daemon registered");
        entries.insert(
            key,
            DaemonEntry {
                plugin_id: plugin_id.to_string(),
                daemon,
                state: DaemonState::Stopped,
            },
        );
        Ok(())
    }

    /// Current state of a daemon by scoped name.
    pub fn state(&self, name: &str) -> Option<DaemonState> {
        self.entries.read().get(name).map(|e| e.state)
    }

    /// Scoped names and states of all daemons owned by `plugin_id`.
    pub fn states_for_plugin(&self, plugin_id: &str) -> Vec<(String, DaemonState)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.plugin_id == plugin_id)
            .map(|(k, e)| (k.clone(), e.state))
            .collect()
    }

    /// Starts one daemon. A start failure parks the daemon in `error`.
    pub async fn start(&self, name: &str) -> Result<(), RegistryError> {
        let daemon = self.begin(name, DaemonState::Starting, DaemonState::Stopped)?;
        match daemon.start().await {
            Ok(()) => {
                self.set_state(name, DaemonState::Running);
                info!(daemon = %name, "Daemon started");
                Ok(())
            }
            Err(e) => {
                error!(daemon = %name, error = %e, "Daemon failed to start");
                self.set_state(name, DaemonState::Error);
                Err(RegistryError::Failed {
                    registry: "daemon",
                    key: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Stops one daemon.
    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let daemon = self.begin(name, DaemonState::Stopping, DaemonState::Running)?;
        match daemon.stop().await {
            Ok(()) => {
                self.set_state(name, DaemonState::Stopped);
                info!(daemon = %name, "Daemon stopped");
                Ok(())
            }
            Err(e) => {
                warn!(daemon = %name, error = %e, "Daemon failed to stop cleanly");
                self.set_state(name, DaemonState::Error);
                Err(RegistryError::Failed {
                    registry: "daemon",
                    key: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Runs the daemon's health check.
    pub async fn check_health(&self, name: &str) -> Result<DaemonHealth, RegistryError> {
        let daemon = self
            .entries
            .read()
            .get(name)
            .map(|e| Arc::clone(&e.daemon))
            .ok_or_else(|| RegistryError::not_found("daemon", name))?;
        Ok(daemon.health_check().await)
    }

    /// Starts every daemon owned by `plugin_id`. Failures are logged and do
    /// not stop the fan-out.
    pub async fn start_plugin(&self, plugin_id: &str) {
        for (name, state) in self.states_for_plugin(plugin_id) {
            if state != DaemonState::Stopped {
                continue;
            }
            // Failures are already logged; siblings keep starting.
            let _ = self.start(&name).await;
        }
    }

    /// Stops every running daemon owned by `plugin_id`.
    pub async fn stop_plugin(&self, plugin_id: &str) {
        for (name, state) in self.states_for_plugin(plugin_id) {
            if state != DaemonState::Running {
                continue;
            }
            let _ = self.stop(&name).await;
        }
    }

    /// Stops every running daemon in the registry.
    pub async fn stop_all(&self) {
        let plugins: Vec<String> = {
            let entries = self.entries.read();
            let mut ids: Vec<String> = entries.values().map(|e| e.plugin_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        for plugin_id in plugins {
            self.stop_plugin(&plugin_id).await;
        }
    }

    /// Moves `name` into `transition` if currently in `expected`, returning
    /// the daemon handle for the async half of the operation.
    fn begin(
        &self,
        name: &str,
        transition: DaemonState,
        expected: DaemonState,
    ) -> Result<Arc<dyn Daemon>, RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::not_found("daemon", name))?;
        if entry.state != expected {
            return Err(RegistryError::Failed {
                registry: "daemon",
                key: name.to_string(),
                message: format!("expected {expected:?}, daemon is {:?}", entry.state),
            });
        }
        entry.state = transition;
        Ok(Arc::clone(&entry.daemon))
    }

    fn set_state(&self, name: &str, state: DaemonState) {
        if let Some(entry) = self.entries.write().get_mut(name) {
            entry.state = state;
        }
    }
}

impl Default for DaemonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagDaemon {
        running: AtomicBool,
        fail_start: bool,
    }

    impl FlagDaemon {
        fn new(fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                running: AtomicBool::new(false),
                fail_start,
            })
        }
    }

    #[async_trait]
    impl Daemon for FlagDaemon {
        async fn start(&self) -> Result<(), ServiceError> {
            if self.fail_start {
                return Err(ServiceError::failed("refused"));
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), ServiceError> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_stop_cycle() {
        let registry = DaemonRegistry::new();
        registry.register("sync", "watcher", FlagDaemon::new(false)).unwrap();

        registry.start("sync:watcher").await.unwrap();
        assert_eq!(registry.state("sync:watcher"), Some(DaemonState::Running));
        registry.stop("sync:watcher").await.unwrap();
        assert_eq!(registry.state("sync:watcher"), Some(DaemonState::Stopped));
    }

    #[tokio::test]
    async fn failing_start_does_not_affect_siblings() {
        let registry = DaemonRegistry::new();
        registry.register("sync", "bad", FlagDaemon::new(true)).unwrap();
        registry.register("sync", "good", FlagDaemon::new(false)).unwrap();

        registry.start_plugin("sync").await;
        assert_eq!(registry.state("sync:bad"), Some(DaemonState::Error));
        assert_eq!(registry.state("sync:good"), Some(DaemonState::Running));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = DaemonRegistry::new();
        registry.register("sync", "watcher", FlagDaemon::new(false)).unwrap();
        assert!(
            registry
                .register("sync", "watcher", FlagDaemon::new(false))
                .is_err()
        );
    }
}
