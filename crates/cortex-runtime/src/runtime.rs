//! Process orchestration: build the shell from configuration, initialize
//! plugins, run until a shutdown signal, tear down gracefully.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tracing::{info, warn};

use cortex_core::{
    AgentService, AiService, AppInfo, ContentService, ConversationStore, EntityService,
    IdentityInfo, McpService, PermissionService,
};
use cortex_host::{Plugin, Shell};

use crate::config::CortexConfig;
use crate::error::RuntimeResult;
use crate::logging::LoggingBuilder;

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The Cortex process runtime.
///
/// # Example
///
/// ```rust,ignore
/// let config = cortex_runtime::load_config()?;
/// let runtime = CortexRuntime::builder(config)
///     .ai(my_ai)
///     .entities(my_store)
///     // ... remaining services ...
///     .plugin(Arc::new(NotesPlugin::default()))
///     .build()?;
/// runtime.run().await
/// ```
pub struct CortexRuntime {
    shell: Arc<Shell>,
    pending_plugins: tokio::sync::Mutex<Vec<Arc<dyn Plugin>>>,
}

impl CortexRuntime {
    /// Starts assembling a runtime from a loaded configuration.
    pub fn builder(config: CortexConfig) -> CortexRuntimeBuilder {
        CortexRuntimeBuilder {
            config,
            shell: Shell::builder(),
            plugins: Vec::new(),
        }
    }

    pub fn shell(&self) -> &Arc<Shell> {
        &self.shell
    }

    /// Registers queued plugins and runs the initialization fixpoint.
    pub async fn initialize(&self) -> RuntimeResult<()> {
        let plugins: Vec<Arc<dyn Plugin>> =
            std::mem::take(&mut *self.pending_plugins.lock().await);
        for plugin in plugins {
            self.shell.register_plugin(plugin).await?;
        }
        self.shell.initialize_plugins().await;

        let failed = self.shell.manager().list_failed();
        if !failed.is_empty() {
            warn!(failed = ?failed, "Some plugins failed to initialize");
        }
        Ok(())
    }

    /// Runs until Ctrl+C (or SIGTERM on unix), then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.initialize().await?;
        info!("Cortex is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.shell.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` resolves, then tears down. Useful in tests and
    /// embedded setups.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.initialize().await?;
        shutdown.await;
        self.shell.shutdown().await;
        Ok(())
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, watching Ctrl+C only");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    }
}

/// Builder wiring configuration, collaborator services, and plugins.
pub struct CortexRuntimeBuilder {
    config: CortexConfig,
    shell: cortex_host::ShellBuilder,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl CortexRuntimeBuilder {
    pub fn ai(mut self, service: Arc<dyn AiService>) -> Self {
        self.shell = self.shell.ai(service);
        self
    }

    pub fn entities(mut self, service: Arc<dyn EntityService>) -> Self {
        self.shell = self.shell.entities(service);
        self
    }

    pub fn content(mut self, service: Arc<dyn ContentService>) -> Self {
        self.shell = self.shell.content(service);
        self
    }

    pub fn conversations(mut self, service: Arc<dyn ConversationStore>) -> Self {
        self.shell = self.shell.conversations(service);
        self
    }

    pub fn permissions(mut self, service: Arc<dyn PermissionService>) -> Self {
        self.shell = self.shell.permissions(service);
        self
    }

    pub fn mcp(mut self, service: Arc<dyn McpService>) -> Self {
        self.shell = self.shell.mcp(service);
        self
    }

    pub fn agent(mut self, service: Arc<dyn AgentService>) -> Self {
        self.shell = self.shell.agent(service);
        self
    }

    /// Queues a plugin for registration during `initialize`.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Initializes logging (once per process) and assembles the shell.
    pub fn build(self) -> RuntimeResult<CortexRuntime> {
        if LOGGING_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            && let Err(e) = LoggingBuilder::from_config(&self.config.logging).try_init()
        {
            // A subscriber installed by the embedding application wins.
            eprintln!("cortex: logging init skipped: {e}");
        }

        let identity = IdentityInfo {
            name: self.config.identity.name.clone(),
            role: self.config.identity.role.clone(),
            description: self.config.identity.description.clone(),
        };
        let app_info = AppInfo {
            name: "cortex".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let shell = self
            .shell
            .identity(identity)
            .app_info(app_info)
            .data_dir(self.config.runtime.data_dir.clone())
            .plugin_configs(self.config.plugins.clone())
            .build()?;

        Ok(CortexRuntime {
            shell,
            pending_plugins: tokio::sync::Mutex::new(self.plugins),
        })
    }
}
