//! Interface-tier context: transports, daemons, conversation writes, and
//! job writes without auto-scoping.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use cortex_core::{
    AgentService, Conversation, Daemon, McpService, MessageRole, PermissionLevel, ServiceError,
    ToolContext,
};
use cortex_jobs::{BatchOperation, EnqueueOptions, JobHandler};

use crate::commands::CommandRegistry;
use crate::context::CoreContext;
use crate::context::scope::{job_metadata, operation_label, scoped_key};
use crate::error::{ContextError, RegistryError};
use crate::routes::RegisteredRoute;
use crate::shell::Shell;

/// Context handed to interface plugins. Extends [`CoreContext`].
#[derive(Clone)]
pub struct InterfaceContext {
    core: CoreContext,
}

impl InterfaceContext {
    pub fn new(shell: Arc<Shell>, plugin_id: impl Into<String>) -> Self {
        Self {
            core: CoreContext::new(shell, plugin_id),
        }
    }

    // ─── Transports & agent ──────────────────────────────────────────────────

    pub fn mcp(&self) -> Arc<dyn McpService> {
        Arc::clone(&self.shell().services().mcp)
    }

    pub fn agent(&self) -> Arc<dyn AgentService> {
        Arc::clone(&self.shell().services().agent)
    }

    /// Permission level of `user_id` on this interface.
    pub async fn permission_level(&self, user_id: &str) -> PermissionLevel {
        self.shell()
            .services()
            .permissions
            .level(self.plugin_id(), user_id)
            .await
    }

    // ─── Daemons ─────────────────────────────────────────────────────────────

    /// Registers a daemon under `pluginId:name`; the manager starts it once
    /// this plugin initializes.
    pub fn register_daemon(
        &self,
        name: &str,
        daemon: Arc<dyn Daemon>,
    ) -> Result<(), RegistryError> {
        self.shell()
            .daemons()
            .register(self.plugin_id(), name, daemon)
    }

    // ─── Job writes (explicit scope required) ────────────────────────────────

    /// Enqueues a job. Unlike the service tier, the type must already be
    /// scoped (`pluginId:type`); a bare type is rejected.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        tool_context: Option<&ToolContext>,
    ) -> Result<String, ContextError> {
        if !job_type.contains(':') {
            return Err(ContextError::UnscopedJobType(job_type.to_string()));
        }
        let metadata = job_metadata(
            self.plugin_id(),
            operation_label(job_type),
            tool_context,
            None,
        );
        let id = self
            .shell()
            .jobs()
            .enqueue(job_type, payload, metadata, EnqueueOptions::default())
            .await?;
        Ok(id)
    }

    /// Enqueues a batch of explicitly scoped operations.
    pub async fn enqueue_batch(
        &self,
        operations: Vec<BatchOperation>,
        tool_context: Option<&ToolContext>,
    ) -> Result<String, ContextError> {
        if let Some(op) = operations.iter().find(|op| !op.op_type.contains(':')) {
            return Err(ContextError::UnscopedJobType(op.op_type.clone()));
        }
        let batch_id = Uuid::new_v4().to_string();
        let metadata = job_metadata(self.plugin_id(), "batch_processing", tool_context, None);
        let id = self
            .shell()
            .jobs()
            .enqueue_batch(operations, metadata, batch_id)
            .await?;
        Ok(id)
    }

    /// Registers a job handler; the type is always prefixed `pluginId:`.
    pub fn register_job_handler(
        &self,
        job_type: &str,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), ContextError> {
        let scoped = scoped_key(self.plugin_id(), job_type);
        self.shell().jobs().register_handler(scoped, handler)?;
        Ok(())
    }

    // ─── Conversation writes ─────────────────────────────────────────────────

    /// Starts (or resumes) the conversation for a channel on this interface.
    pub async fn start_conversation(
        &self,
        channel_id: &str,
    ) -> Result<Conversation, ServiceError> {
        self.shell()
            .services()
            .conversations
            .start(self.plugin_id(), channel_id)
            .await
    }

    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Value,
    ) -> Result<String, ServiceError> {
        self.shell()
            .services()
            .conversations
            .add_message(conversation_id, role, content, metadata)
            .await
    }

    // ─── Routes & commands ───────────────────────────────────────────────────

    /// Every plugin-declared API route, for webserver interfaces to bind.
    pub fn api_routes(&self) -> Vec<RegisteredRoute> {
        self.shell().routes().all()
    }

    /// The shared command registry, for routing `/command` input.
    pub fn commands(&self) -> Arc<CommandRegistry> {
        Arc::clone(self.shell().commands())
    }
}

impl Deref for InterfaceContext {
    type Target = CoreContext;

    fn deref(&self) -> &CoreContext {
        &self.core
    }
}

impl std::fmt::Debug for InterfaceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceContext")
            .field("plugin_id", &self.plugin_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_shell;
    use serde_json::json;

    #[tokio::test]
    async fn unscoped_job_types_are_rejected() {
        let shell = test_shell();
        let ctx = InterfaceContext::new(Arc::clone(&shell), "cli");

        let err = ctx.enqueue("index", json!({}), None).await.unwrap_err();
        assert!(matches!(err, ContextError::UnscopedJobType(t) if t == "index"));

        let err = ctx
            .enqueue_batch(vec![BatchOperation::new("import", json!({}))], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::UnscopedJobType(_)));
    }

    #[tokio::test]
    async fn scoped_job_types_pass_through_verbatim() {
        let shell = test_shell();
        let ctx = InterfaceContext::new(Arc::clone(&shell), "cli");

        let id = ctx
            .enqueue("notes:index", json!({}), None)
            .await
            .unwrap();
        let job = shell.jobs().job(&id).unwrap();
        assert_eq!(job.job_type, "notes:index");
        // The enqueuer is still the interface plugin.
        assert_eq!(job.metadata.plugin_id, "cli");
    }
}
