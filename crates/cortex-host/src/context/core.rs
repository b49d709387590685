//! Core-tier context: the read-only foundation every plugin gets.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use cortex_core::{
    AiReply, AppInfo, Conversation, IdentityInfo, MessageHandler, MessageResponse, QueryOptions,
    ServiceError, StoredMessage, Subscription, Template,
};
use cortex_jobs::{BatchStatus, Job, JobStatus};

use crate::context::CapabilityBuilder;
use crate::context::scope::scoped_key;
use crate::error::RegistryError;
use crate::shell::Shell;

/// Read-only foundation view of the shell, scoped to one plugin.
#[derive(Clone)]
pub struct CoreContext {
    shell: Arc<Shell>,
    plugin_id: String,
}

impl CoreContext {
    pub fn new(shell: Arc<Shell>, plugin_id: impl Into<String>) -> Self {
        Self {
            shell,
            plugin_id: plugin_id.into(),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub(crate) fn shell(&self) -> &Arc<Shell> {
        &self.shell
    }

    /// Tracing span carrying the plugin id; handlers run inside it.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("plugin", plugin = %self.plugin_id)
    }

    /// Starts a capability bundle with this plugin's namespacing applied.
    pub fn capabilities(&self) -> CapabilityBuilder {
        CapabilityBuilder::new(&self.plugin_id)
    }

    /// This plugin's raw config section, or an empty object.
    pub fn config(&self) -> Value {
        self.shell.plugin_config(&self.plugin_id)
    }

    // ─── Identity & environment ──────────────────────────────────────────────

    pub fn identity(&self) -> IdentityInfo {
        self.shell.identity().clone()
    }

    pub fn app_info(&self) -> AppInfo {
        self.shell.app_info().clone()
    }

    /// Per-plugin data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.shell.data_dir().join(&self.plugin_id)
    }

    // ─── Messaging ───────────────────────────────────────────────────────────

    /// Request/response send; the plugin id is the message source.
    pub async fn send(&self, channel: &str, payload: Value) -> Option<MessageResponse> {
        self.shell.bus().send(channel, payload, &self.plugin_id).await
    }

    /// Fan-out send with no response.
    pub async fn broadcast(&self, channel: &str, payload: Value) {
        self.shell
            .bus()
            .broadcast(channel, payload, &self.plugin_id)
            .await;
    }

    pub fn subscribe(&self, channel: &str, handler: MessageHandler) -> Subscription {
        self.shell.bus().subscribe(channel, handler)
    }

    // ─── Entities (read-only) ────────────────────────────────────────────────

    pub async fn entity(&self, entity_type: &str, id: &str) -> Result<Option<Value>, ServiceError> {
        self.shell.services().entities.get(entity_type, id).await
    }

    pub async fn search_entities(
        &self,
        entity_type: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ServiceError> {
        self.shell
            .services()
            .entities
            .search(entity_type, query, limit)
            .await
    }

    // ─── Templates ───────────────────────────────────────────────────────────

    /// Registers a template under `pluginId:name`.
    pub fn register_template(&self, template: Template) -> Result<(), RegistryError> {
        self.shell.templates().register(&self.plugin_id, template)
    }

    /// Formats data through a template; bare names resolve within this
    /// plugin's namespace.
    pub fn format_template(&self, name: &str, data: &Value) -> Result<String, RegistryError> {
        self.shell
            .templates()
            .format(&scoped_key(&self.plugin_id, name), data)
    }

    pub fn parse_template(&self, name: &str, text: &str) -> Result<Value, RegistryError> {
        self.shell
            .templates()
            .parse(&scoped_key(&self.plugin_id, name), text)
    }

    // ─── AI ──────────────────────────────────────────────────────────────────

    pub async fn ai_query(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<AiReply, ServiceError> {
        self.shell.services().ai.query(prompt, options).await
    }

    // ─── Job monitoring ──────────────────────────────────────────────────────

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.shell.jobs().status(job_id)
    }

    pub fn active_jobs(&self) -> Vec<Job> {
        self.shell.jobs().active()
    }

    pub fn batch_status(&self, batch_id: &str) -> Option<BatchStatus> {
        self.shell.jobs().batch_status(batch_id)
    }

    // ─── Conversations (read-only) ───────────────────────────────────────────

    pub async fn conversation(
        &self,
        interface_type: &str,
        channel_id: &str,
    ) -> Result<Option<Conversation>, ServiceError> {
        self.shell
            .services()
            .conversations
            .find(interface_type, channel_id)
            .await
    }

    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ServiceError> {
        self.shell
            .services()
            .conversations
            .messages(conversation_id, limit)
            .await
    }
}

impl std::fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreContext")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}
