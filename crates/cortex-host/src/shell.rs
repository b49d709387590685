//! The shell: process-wide host exposing services to plugins.
//!
//! Everything that used to be a reach-for-it-anywhere singleton is owned
//! here and passed explicitly into constructors; test harnesses build a
//! shell directly with in-memory services.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use cortex_core::{
    AgentService, AiService, AppInfo, ContentService, ConversationStore, EntityService,
    IdentityInfo, McpService, MessageBus, PermissionService, PluginsReadyPayload, system,
};
use cortex_jobs::JobQueue;

use crate::commands::CommandRegistry;
use crate::daemon::DaemonRegistry;
use crate::data_sources::DataSourceRegistry;
use crate::error::{PluginError, ShellError};
use crate::eval::EvalHandlerRegistry;
use crate::manager::PluginManager;
use crate::plugin::Plugin;
use crate::registrar::CapabilityRegistrar;
use crate::routes::RouteTable;
use crate::templates::{TemplateRegistry, ViewTemplateRegistry};

/// External collaborator services injected into the shell.
#[derive(Clone)]
pub struct ShellServices {
    pub ai: Arc<dyn AiService>,
    pub entities: Arc<dyn EntityService>,
    pub content: Arc<dyn ContentService>,
    pub conversations: Arc<dyn ConversationStore>,
    pub permissions: Arc<dyn PermissionService>,
    pub mcp: Arc<dyn McpService>,
    pub agent: Arc<dyn AgentService>,
}

/// The process-wide plugin host.
pub struct Shell {
    bus: Arc<MessageBus>,
    jobs: Arc<JobQueue>,
    manager: PluginManager,
    daemons: Arc<DaemonRegistry>,
    templates: Arc<TemplateRegistry>,
    view_templates: Arc<ViewTemplateRegistry>,
    data_sources: Arc<DataSourceRegistry>,
    evals: Arc<EvalHandlerRegistry>,
    commands: Arc<CommandRegistry>,
    routes: Arc<RouteTable>,
    services: ShellServices,
    identity: IdentityInfo,
    app_info: AppInfo,
    data_dir: PathBuf,
    plugin_configs: HashMap<String, Value>,
    ready_published: AtomicBool,
}

impl Shell {
    /// Starts assembling a shell.
    pub fn builder() -> ShellBuilder {
        ShellBuilder::default()
    }

    // ─── Plugin lifecycle ────────────────────────────────────────────────────

    /// Registers a plugin with the manager (status `Registered`).
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        self.manager.register(plugin).await
    }

    /// Initializes every registered plugin in dependency order, then
    /// publishes `system:plugins:ready` exactly once.
    pub async fn initialize_plugins(self: &Arc<Self>) {
        self.manager.initialize_all(self).await;

        if !self.ready_published.swap(true, Ordering::SeqCst) {
            let payload = PluginsReadyPayload {
                timestamp: Utc::now(),
                plugin_count: self.manager.plugin_count(),
            };
            let _ = self
                .bus
                .broadcast_channel(&system::PLUGINS_READY, &payload, "shell")
                .await;
            info!(plugins = payload.plugin_count, "All plugins resolved");
        }
    }

    /// Best-effort teardown: stop daemons, let plugins shut down in reverse
    /// initialization order, stop the job queue.
    pub async fn shutdown(&self) {
        self.daemons.stop_all().await;
        self.manager.shutdown_all().await;
        self.jobs.stop();
        info!("Shell shut down");
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    pub fn daemons(&self) -> &Arc<DaemonRegistry> {
        &self.daemons
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn view_templates(&self) -> &Arc<ViewTemplateRegistry> {
        &self.view_templates
    }

    pub fn data_sources(&self) -> &Arc<DataSourceRegistry> {
        &self.data_sources
    }

    pub fn evals(&self) -> &Arc<EvalHandlerRegistry> {
        &self.evals
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn services(&self) -> &ShellServices {
        &self.services
    }

    pub fn identity(&self) -> &IdentityInfo {
        &self.identity
    }

    pub fn app_info(&self) -> &AppInfo {
        &self.app_info
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Raw config section for `plugin_id`, or an empty object.
    pub fn plugin_config(&self, plugin_id: &str) -> Value {
        self.plugin_configs
            .get(plugin_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("app", &self.app_info.name)
            .field("plugins", &self.manager.plugin_count())
            .finish()
    }
}

/// Builder for [`Shell`]. All seven collaborator services are required; the
/// rest has sensible defaults.
#[derive(Default)]
pub struct ShellBuilder {
    ai: Option<Arc<dyn AiService>>,
    entities: Option<Arc<dyn EntityService>>,
    content: Option<Arc<dyn ContentService>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    permissions: Option<Arc<dyn PermissionService>>,
    mcp: Option<Arc<dyn McpService>>,
    agent: Option<Arc<dyn AgentService>>,
    identity: Option<IdentityInfo>,
    app_info: Option<AppInfo>,
    data_dir: Option<PathBuf>,
    plugin_configs: HashMap<String, Value>,
}

impl ShellBuilder {
    pub fn ai(mut self, service: Arc<dyn AiService>) -> Self {
        self.ai = Some(service);
        self
    }

    pub fn entities(mut self, service: Arc<dyn EntityService>) -> Self {
        self.entities = Some(service);
        self
    }

    pub fn content(mut self, service: Arc<dyn ContentService>) -> Self {
        self.content = Some(service);
        self
    }

    pub fn conversations(mut self, service: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(service);
        self
    }

    pub fn permissions(mut self, service: Arc<dyn PermissionService>) -> Self {
        self.permissions = Some(service);
        self
    }

    pub fn mcp(mut self, service: Arc<dyn McpService>) -> Self {
        self.mcp = Some(service);
        self
    }

    pub fn agent(mut self, service: Arc<dyn AgentService>) -> Self {
        self.agent = Some(service);
        self
    }

    pub fn identity(mut self, identity: IdentityInfo) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn app_info(mut self, app_info: AppInfo) -> Self {
        self.app_info = Some(app_info);
        self
    }

    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Per-plugin config sections, keyed by plugin id.
    pub fn plugin_configs(mut self, configs: HashMap<String, Value>) -> Self {
        self.plugin_configs = configs;
        self
    }

    /// Builds the shell and spawns the job queue's dispatch loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Arc<Shell>, ShellError> {
        let services = ShellServices {
            ai: self.ai.ok_or(ShellError::MissingService("ai"))?,
            entities: self.entities.ok_or(ShellError::MissingService("entity"))?,
            content: self.content.ok_or(ShellError::MissingService("content"))?,
            conversations: self
                .conversations
                .ok_or(ShellError::MissingService("conversation"))?,
            permissions: self
                .permissions
                .ok_or(ShellError::MissingService("permission"))?,
            mcp: self.mcp.ok_or(ShellError::MissingService("mcp"))?,
            agent: self.agent.ok_or(ShellError::MissingService("agent"))?,
        };

        let bus = Arc::new(MessageBus::new());
        let jobs = JobQueue::start(Arc::clone(&bus));
        let daemons = Arc::new(DaemonRegistry::new());
        let commands = Arc::new(CommandRegistry::new());
        let routes = Arc::new(RouteTable::new());
        let registrar = Arc::new(CapabilityRegistrar::new(
            Arc::clone(&bus),
            Arc::clone(&services.mcp),
            Arc::clone(&services.permissions),
            Arc::clone(&commands),
            Arc::clone(&routes),
        ));
        let manager = PluginManager::new(Arc::clone(&bus), Arc::clone(&daemons), registrar);

        Ok(Arc::new(Shell {
            bus,
            jobs,
            manager,
            daemons,
            templates: Arc::new(TemplateRegistry::new()),
            view_templates: Arc::new(ViewTemplateRegistry::new()),
            data_sources: Arc::new(DataSourceRegistry::new()),
            evals: Arc::new(EvalHandlerRegistry::new()),
            commands,
            routes,
            services,
            identity: self.identity.unwrap_or_else(|| IdentityInfo {
                name: "cortex".to_string(),
                role: "personal knowledge assistant".to_string(),
                description: None,
            }),
            app_info: self.app_info.unwrap_or_else(|| AppInfo {
                name: "cortex".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            data_dir: self.data_dir.unwrap_or_else(|| PathBuf::from("./data")),
            plugin_configs: self.plugin_configs,
            ready_published: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestPlugin, test_shell};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Deferred producers that wait for `system:plugins:ready` reach
    /// consumers that subscribed during their own `register`.
    #[tokio::test]
    async fn plugins_ready_gates_deferred_producers() {
        let shell = test_shell();

        let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        // Consumer: subscribes to the widget channel during register.
        shell
            .register_plugin(TestPlugin::with_register("dashboard", &[], move |shell, _| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    shell.bus().subscribe(
                        "dashboard:register-widget",
                        Arc::new(move |msg| {
                            let sink = Arc::clone(&sink);
                            Box::pin(async move {
                                sink.lock().push(msg.payload);
                                None
                            })
                        }),
                    );
                    Ok(cortex_core::Capabilities::none())
                })
            }))
            .await
            .unwrap();

        // Producer: holds its one-time registration until the ready edge.
        shell
            .register_plugin(TestPlugin::with_register("sys", &[], |shell, _| {
                Box::pin(async move {
                    let bus = Arc::clone(shell.bus());
                    shell.bus().subscribe(
                        cortex_core::system::PLUGINS_READY.name(),
                        Arc::new(move |_msg| {
                            let bus = Arc::clone(&bus);
                            Box::pin(async move {
                                bus.broadcast(
                                    "dashboard:register-widget",
                                    json!({"id": "w1", "pluginId": "sys"}),
                                    "sys",
                                )
                                .await;
                                None
                            })
                        }),
                    );
                    Ok(cortex_core::Capabilities::none())
                })
            }))
            .await
            .unwrap();

        shell.initialize_plugins().await;

        let widgets = received.lock();
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0], json!({"id": "w1", "pluginId": "sys"}));
    }

    #[tokio::test]
    async fn ready_is_published_once() {
        let shell = test_shell();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_in = Arc::clone(&count);
        shell.bus().subscribe_channel(
            &system::PLUGINS_READY,
            move |_payload: PluginsReadyPayload| {
                let count = Arc::clone(&count_in);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        shell.initialize_plugins().await;
        shell.initialize_plugins().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_service_fails_the_build() {
        let result = Shell::builder().build();
        assert!(matches!(result, Err(ShellError::MissingService("ai"))));
    }
}
