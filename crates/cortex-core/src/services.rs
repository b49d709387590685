//! Contracts for the shell's external collaborators.
//!
//! The core never implements these — the AI client, the entity store, the
//! content formatter, the conversation database, the MCP transport, and the
//! agent loop live outside the plugin host and are injected into the shell
//! as trait objects. `cortex-harness` ships in-memory implementations for
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{ResourceInfo, ToolInfo};
use crate::error::ServiceError;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Permission tier of a caller, ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Public,
    Trusted,
    Anchor,
}

/// Who the assistant presents itself as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Display name; interfaces match mentions against it.
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Host application info surfaced to plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

/// Resolves a caller's permission tier.
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn level(&self, interface_type: &str, user_id: &str) -> PermissionLevel;
}

// ─── AI ──────────────────────────────────────────────────────────────────────

/// Options for a model query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// A model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiReply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
}

/// The language-model client.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Free-form query (available to all tiers).
    async fn query(&self, prompt: &str, options: &QueryOptions) -> Result<AiReply, ServiceError>;

    /// Structured content generation (service tier).
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, ServiceError>;

    /// Image generation (service tier). Probe with
    /// [`supports_image_generation`](Self::supports_image_generation) first.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ServiceError> {
        let _ = prompt;
        Err(ServiceError::unsupported("image generation"))
    }

    fn supports_image_generation(&self) -> bool {
        false
    }
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Registration record for a plugin-declared entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    pub name: String,
    pub schema: Value,
    /// Adapter identifier understood by the entity store.
    pub adapter: String,
    #[serde(default)]
    pub config: Value,
}

/// The embedded key-value / vector store.
///
/// Core-tier contexts expose only the read half; service-tier contexts add
/// writes and entity-type registration.
#[async_trait]
pub trait EntityService: Send + Sync {
    async fn get(&self, entity_type: &str, id: &str) -> Result<Option<Value>, ServiceError>;
    async fn search(
        &self,
        entity_type: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ServiceError>;
    async fn create(&self, entity_type: &str, entity: Value) -> Result<String, ServiceError>;
    async fn update(&self, entity_type: &str, id: &str, entity: Value) -> Result<(), ServiceError>;
    async fn delete(&self, entity_type: &str, id: &str) -> Result<bool, ServiceError>;
    async fn register_entity_type(
        &self,
        definition: EntityTypeDefinition,
    ) -> Result<(), ServiceError>;
}

// ─── Content ─────────────────────────────────────────────────────────────────

/// What the content formatter can do, for capability introspection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCapabilities {
    pub can_resolve: bool,
    pub can_generate: bool,
}

/// The markdown template formatter.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn resolve(&self, template_name: &str, data: &Value) -> Result<String, ServiceError>;
    fn capabilities(&self) -> ContentCapabilities;
}

// ─── Conversations ───────────────────────────────────────────────────────────

/// A conversation bound to `(interface_type, channel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub interface_type: String,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
}

/// A message stored in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// The conversation database.
///
/// Reads are core-tier; `start` and `add_message` are interface-tier.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find(
        &self,
        interface_type: &str,
        channel_id: &str,
    ) -> Result<Option<Conversation>, ServiceError>;
    async fn messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ServiceError>;
    /// Starts a conversation, or returns the existing one for the channel.
    async fn start(
        &self,
        interface_type: &str,
        channel_id: &str,
    ) -> Result<Conversation, ServiceError>;
    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Value,
    ) -> Result<String, ServiceError>;
}

// ─── Agent & MCP ─────────────────────────────────────────────────────────────

/// Normalized context of one inbound user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub interface_type: String,
    pub user_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub permission_level: PermissionLevel,
    #[serde(default)]
    pub is_direct: bool,
}

/// Reply produced by the agent loop for one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub text: String,
    /// Set when the reply enqueued a trackable job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Set when the reply enqueued a trackable batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

/// The agent loop consumed by message-based interfaces.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn handle(
        &self,
        text: &str,
        context: &MessageContext,
    ) -> Result<AgentResponse, ServiceError>;
}

/// The MCP registration facade (the wire transport lives outside the core).
#[async_trait]
pub trait McpService: Send + Sync {
    async fn register_plugin_tools(
        &self,
        plugin_id: &str,
        tools: &[ToolInfo],
    ) -> Result<(), ServiceError>;
    async fn register_plugin_resources(
        &self,
        plugin_id: &str,
        resources: &[ResourceInfo],
    ) -> Result<(), ServiceError>;
}

// ─── Data sources ────────────────────────────────────────────────────────────

/// A plugin-registered pull-based data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, query: Value) -> Result<Value, ServiceError>;
}

// ─── Daemons ─────────────────────────────────────────────────────────────────

/// Reported health of a daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl DaemonHealth {
    /// A healthy report stamped now.
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            last_check: Utc::now(),
            details: None,
        }
    }

    /// An unhealthy report with a reason.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            last_check: Utc::now(),
            details: None,
        }
    }
}

/// A long-lived subprocess owned by a plugin.
#[async_trait]
pub trait Daemon: Send + Sync {
    async fn start(&self) -> Result<(), ServiceError>;
    async fn stop(&self) -> Result<(), ServiceError>;
    async fn health_check(&self) -> DaemonHealth {
        DaemonHealth::healthy()
    }
}
