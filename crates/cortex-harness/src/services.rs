//! In-memory implementations of the shell's collaborator services.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use cortex_core::{
    AgentResponse, AgentService, AiReply, AiService, ContentCapabilities, ContentService,
    Conversation, ConversationStore, EntityService, EntityTypeDefinition, McpService,
    MessageContext, MessageRole, PermissionLevel, PermissionService, QueryOptions, ResourceInfo,
    ServiceError, StoredMessage, ToolInfo,
};

// ─── AI ──────────────────────────────────────────────────────────────────────

/// Echoes prompts back, prefixed, so tests can assert the path was taken.
pub struct EchoAi;

#[async_trait]
impl AiService for EchoAi {
    async fn query(&self, prompt: &str, _options: &QueryOptions) -> Result<AiReply, ServiceError> {
        Ok(AiReply {
            text: format!("echo: {prompt}"),
            structured: None,
        })
    }

    async fn generate(&self, prompt: &str, _schema: &Value) -> Result<Value, ServiceError> {
        Ok(Value::String(format!("generated: {prompt}")))
    }
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// HashMap-backed entity store; search is substring matching over the
/// serialized entity.
pub struct MemoryEntityService {
    entities: Mutex<HashMap<(String, String), Value>>,
    types: Mutex<Vec<EntityTypeDefinition>>,
}

impl MemoryEntityService {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            types: Mutex::new(Vec::new()),
        }
    }

    /// Registered entity-type names, for assertions.
    pub fn type_names(&self) -> Vec<String> {
        self.types.lock().iter().map(|d| d.name.clone()).collect()
    }

    pub fn count(&self, entity_type: &str) -> usize {
        self.entities
            .lock()
            .keys()
            .filter(|(t, _)| t == entity_type)
            .count()
    }
}

impl Default for MemoryEntityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityService for MemoryEntityService {
    async fn get(&self, entity_type: &str, id: &str) -> Result<Option<Value>, ServiceError> {
        Ok(self
            .entities
            .lock()
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned())
    }

    async fn search(
        &self,
        entity_type: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ServiceError> {
        let entities = self.entities.lock();
        Ok(entities
            .iter()
            .filter(|((t, _), v)| t == entity_type && v.to_string().contains(query))
            .map(|(_, v)| v.clone())
            .take(limit)
            .collect())
    }

    async fn create(&self, entity_type: &str, entity: Value) -> Result<String, ServiceError> {
        let id = Uuid::new_v4().to_string();
        self.entities
            .lock()
            .insert((entity_type.to_string(), id.clone()), entity);
        Ok(id)
    }

    async fn update(&self, entity_type: &str, id: &str, entity: Value) -> Result<(), ServiceError> {
        let key = (entity_type.to_string(), id.to_string());
        let mut entities = self.entities.lock();
        if !entities.contains_key(&key) {
            return Err(ServiceError::not_found(format!("{entity_type}/{id}")));
        }
        entities.insert(key, entity);
        Ok(())
    }

    async fn delete(&self, entity_type: &str, id: &str) -> Result<bool, ServiceError> {
        Ok(self
            .entities
            .lock()
            .remove(&(entity_type.to_string(), id.to_string()))
            .is_some())
    }

    async fn register_entity_type(
        &self,
        definition: EntityTypeDefinition,
    ) -> Result<(), ServiceError> {
        self.types.lock().push(definition);
        Ok(())
    }
}

// ─── Content ─────────────────────────────────────────────────────────────────

/// Resolves templates as `name: <data>`; enough to observe the call.
pub struct PassthroughContent;

#[async_trait]
impl ContentService for PassthroughContent {
    async fn resolve(&self, template_name: &str, data: &Value) -> Result<String, ServiceError> {
        Ok(format!("{template_name}: {data}"))
    }

    fn capabilities(&self) -> ContentCapabilities {
        ContentCapabilities {
            can_resolve: true,
            can_generate: false,
        }
    }
}

// ─── Conversations ───────────────────────────────────────────────────────────

/// In-memory conversation store keyed by `(interface_type, channel_id)`.
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<(String, String), Conversation>>,
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Every stored message, in insertion order.
    pub fn all_messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().len()
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find(
        &self,
        interface_type: &str,
        channel_id: &str,
    ) -> Result<Option<Conversation>, ServiceError> {
        Ok(self
            .conversations
            .lock()
            .get(&(interface_type.to_string(), channel_id.to_string()))
            .cloned())
    }

    async fn messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ServiceError> {
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect())
    }

    async fn start(
        &self,
        interface_type: &str,
        channel_id: &str,
    ) -> Result<Conversation, ServiceError> {
        let key = (interface_type.to_string(), channel_id.to_string());
        let mut conversations = self.conversations.lock();
        if let Some(existing) = conversations.get(&key) {
            return Ok(existing.clone());
        }
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            interface_type: interface_type.to_string(),
            channel_id: channel_id.to_string(),
            started_at: Utc::now(),
        };
        conversations.insert(key, conversation.clone());
        Ok(conversation)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Value,
    ) -> Result<String, ServiceError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            metadata,
            timestamp: Utc::now(),
        };
        let id = message.id.clone();
        self.messages.lock().push(message);
        Ok(id)
    }
}

// ─── Permissions ─────────────────────────────────────────────────────────────

/// Answers one fixed level for every caller.
pub struct FixedPermissions {
    level: Mutex<PermissionLevel>,
}

impl FixedPermissions {
    pub fn new(level: PermissionLevel) -> Self {
        Self {
            level: Mutex::new(level),
        }
    }

    pub fn set_level(&self, level: PermissionLevel) {
        *self.level.lock() = level;
    }
}

#[async_trait]
impl PermissionService for FixedPermissions {
    async fn level(&self, _interface_type: &str, _user_id: &str) -> PermissionLevel {
        *self.level.lock()
    }
}

// ─── MCP ─────────────────────────────────────────────────────────────────────

/// Records which tools and resources each plugin registered.
pub struct RecordingMcp {
    tools: Mutex<HashMap<String, Vec<ToolInfo>>>,
    resources: Mutex<HashMap<String, Vec<ResourceInfo>>>,
}

impl RecordingMcp {
    pub fn new() -> Self {
        Self {
            tools: Mutex::new(HashMap::new()),
            resources: Mutex::new(HashMap::new()),
        }
    }

    pub fn tool_names(&self, plugin_id: &str) -> Vec<String> {
        self.tools
            .lock()
            .get(plugin_id)
            .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn resource_uris(&self, plugin_id: &str) -> Vec<String> {
        self.resources
            .lock()
            .get(plugin_id)
            .map(|resources| resources.iter().map(|r| r.uri.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for RecordingMcp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpService for RecordingMcp {
    async fn register_plugin_tools(
        &self,
        plugin_id: &str,
        tools: &[ToolInfo],
    ) -> Result<(), ServiceError> {
        self.tools
            .lock()
            .entry(plugin_id.to_string())
            .or_default()
            .extend(tools.iter().cloned());
        Ok(())
    }

    async fn register_plugin_resources(
        &self,
        plugin_id: &str,
        resources: &[ResourceInfo],
    ) -> Result<(), ServiceError> {
        self.resources
            .lock()
            .entry(plugin_id.to_string())
            .or_default()
            .extend(resources.iter().cloned());
        Ok(())
    }
}

// ─── Agent ───────────────────────────────────────────────────────────────────

type AgentHandler = Arc<
    dyn Fn(String, MessageContext) -> BoxFuture<'static, Result<AgentResponse, ServiceError>>
        + Send
        + Sync,
>;

/// Agent mock: scripted responses first, then a custom handler, then echo.
pub struct ScriptedAgent {
    script: Mutex<VecDeque<AgentResponse>>,
    handler: Mutex<Option<AgentHandler>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            handler: Mutex::new(None),
        }
    }

    /// Queues a canned response for the next message.
    pub fn push(&self, response: AgentResponse) {
        self.script.lock().push_back(response);
    }

    /// Installs a handler invoked when the script is empty.
    pub fn set_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(String, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AgentResponse, ServiceError>> + Send + 'static,
    {
        let handler: AgentHandler = Arc::new(move |text, ctx| Box::pin(handler(text, ctx)));
        *self.handler.lock() = Some(handler);
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentService for ScriptedAgent {
    async fn handle(
        &self,
        text: &str,
        context: &MessageContext,
    ) -> Result<AgentResponse, ServiceError> {
        if let Some(response) = self.script.lock().pop_front() {
            return Ok(response);
        }
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            return handler(text.to_string(), context.clone()).await;
        }
        Ok(AgentResponse {
            text: format!("echo: {text}"),
            job_id: None,
            batch_id: None,
        })
    }
}
