//! In-crate test support: null collaborator services and scriptable plugins.
//!
//! The public, reusable mocks live in `cortex-harness`; this module carries
//! only what the host's own unit tests need.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use cortex_core::{
    AgentResponse, AgentService, AiReply, AiService, Capabilities, ContentCapabilities,
    ContentService, Conversation, ConversationStore, EntityService, EntityTypeDefinition,
    LifecycleEvent, McpService, MessageContext, MessageRole, PermissionLevel, PermissionService,
    PluginLifecyclePayload, QueryOptions, ResourceInfo, ServiceError, StoredMessage, ToolInfo,
    system,
};

use crate::plugin::{Plugin, PluginType};
use crate::shell::Shell;

pub(crate) struct NullAi;

#[async_trait]
impl AiService for NullAi {
    async fn query(&self, _prompt: &str, _options: &QueryOptions) -> Result<AiReply, ServiceError> {
        Ok(AiReply {
            text: "ok".to_string(),
            structured: None,
        })
    }

    async fn generate(&self, _prompt: &str, _schema: &Value) -> Result<Value, ServiceError> {
        Ok(Value::Null)
    }
}

pub(crate) struct NullEntities;

#[async_trait]
impl EntityService for NullEntities {
    async fn get(&self, _t: &str, _id: &str) -> Result<Option<Value>, ServiceError> {
        Ok(None)
    }

    async fn search(&self, _t: &str, _q: &str, _l: usize) -> Result<Vec<Value>, ServiceError> {
        Ok(Vec::new())
    }

    async fn create(&self, _t: &str, _e: Value) -> Result<String, ServiceError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn update(&self, _t: &str, _id: &str, _e: Value) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn delete(&self, _t: &str, _id: &str) -> Result<bool, ServiceError> {
        Ok(false)
    }

    async fn register_entity_type(&self, _d: EntityTypeDefinition) -> Result<(), ServiceError> {
        Ok(())
    }
}

pub(crate) struct NullContent;

#[async_trait]
impl ContentService for NullContent {
    async fn resolve(&self, name: &str, _data: &Value) -> Result<String, ServiceError> {
        Err(ServiceError::unsupported(name.to_string()))
    }

    fn capabilities(&self) -> ContentCapabilities {
        ContentCapabilities::default()
    }
}

pub(crate) struct NullConversations;

#[async_trait]
impl ConversationStore for NullConversations {
    async fn find(&self, _i: &str, _c: &str) -> Result<Option<Conversation>, ServiceError> {
        Ok(None)
    }

    async fn messages(&self, _id: &str, _l: usize) -> Result<Vec<StoredMessage>, ServiceError> {
        Ok(Vec::new())
    }

    async fn start(&self, interface_type: &str, channel_id: &str) -> Result<Conversation, ServiceError> {
        Ok(Conversation {
            id: Uuid::new_v4().to_string(),
            interface_type: interface_type.to_string(),
            channel_id: channel_id.to_string(),
            started_at: Utc::now(),
        })
    }

    async fn add_message(
        &self,
        _id: &str,
        _role: MessageRole,
        _content: &str,
        _metadata: Value,
    ) -> Result<String, ServiceError> {
        Ok(Uuid::new_v4().to_string())
    }
}

pub(crate) struct OpenPermissions;

#[async_trait]
impl PermissionService for OpenPermissions {
    async fn level(&self, _i: &str, _u: &str) -> PermissionLevel {
        PermissionLevel::Anchor
    }
}

pub(crate) struct NullMcp;

#[async_trait]
impl McpService for NullMcp {
    async fn register_plugin_tools(&self, _p: &str, _t: &[ToolInfo]) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn register_plugin_resources(
        &self,
        _p: &str,
        _r: &[ResourceInfo],
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

pub(crate) struct NullAgent;

#[async_trait]
impl AgentService for NullAgent {
    async fn handle(
        &self,
        _text: &str,
        _context: &MessageContext,
    ) -> Result<AgentResponse, ServiceError> {
        Ok(AgentResponse {
            text: "ok".to_string(),
            job_id: None,
            batch_id: None,
        })
    }
}

/// A shell with null collaborators, for unit tests.
pub(crate) fn test_shell() -> Arc<Shell> {
    Shell::builder()
        .ai(Arc::new(NullAi))
        .entities(Arc::new(NullEntities))
        .content(Arc::new(NullContent))
        .conversations(Arc::new(NullConversations))
        .permissions(Arc::new(OpenPermissions))
        .mcp(Arc::new(NullMcp))
        .agent(Arc::new(NullAgent))
        .build()
        .expect("test shell")
}

type RegisterFn = Box<
    dyn Fn(Arc<Shell>, String) -> BoxFuture<'static, Result<Capabilities, crate::error::PluginError>>
        + Send
        + Sync,
>;

/// A scriptable plugin for lifecycle tests.
pub(crate) struct TestPlugin {
    id: String,
    deps: Vec<String>,
    plugin_type: PluginType,
    register_fn: RegisterFn,
}

impl TestPlugin {
    pub(crate) fn ok(id: &str, deps: &[&str]) -> Arc<dyn Plugin> {
        Self::with_register(id, deps, |_, _| {
            Box::pin(async { Ok(Capabilities::none()) })
        })
    }

    pub(crate) fn failing(id: &str, deps: &[&str], message: &'static str) -> Arc<dyn Plugin> {
        Self::with_register(id, deps, move |_, _| {
            Box::pin(async move { Err(crate::error::PluginError::register_failed(message)) })
        })
    }

    pub(crate) fn with_register<F>(id: &str, deps: &[&str], f: F) -> Arc<dyn Plugin>
    where
        F: Fn(Arc<Shell>, String) -> BoxFuture<'static, Result<Capabilities, crate::error::PluginError>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            plugin_type: PluginType::Service,
            register_fn: Box::new(f),
        })
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn package_name(&self) -> &str {
        "cortex-test-plugin"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    async fn register(
        &self,
        shell: &Arc<Shell>,
    ) -> Result<Capabilities, crate::error::PluginError> {
        (self.register_fn)(Arc::clone(shell), self.id.clone()).await
    }
}

/// Collects `(plugin_id, event)` pairs from the lifecycle channel.
pub(crate) fn tap_lifecycle(shell: &Shell) -> Arc<Mutex<Vec<(String, LifecycleEvent)>>> {
    let log: Arc<Mutex<Vec<(String, LifecycleEvent)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    shell.bus().subscribe_channel(
        &system::PLUGIN_LIFECYCLE,
        move |payload: PluginLifecyclePayload| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push((payload.plugin_id, payload.event));
                Ok(())
            }
        },
    );
    log
}
