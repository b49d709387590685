//! Service-tier context: entity ownership and job writes with auto-scoping.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use cortex_core::{
    ContentCapabilities, DataSource, EntityTypeDefinition, ServiceError, ToolContext,
};
use cortex_jobs::{BatchOperation, EnqueueOptions, JobHandler};

use crate::context::CoreContext;
use crate::context::scope::{job_metadata, operation_label, scoped_job_type, scoped_key};
use crate::error::{ContextError, RegistryError};
use crate::eval::EvalHandler;
use crate::shell::Shell;

/// Context handed to service plugins. Extends [`CoreContext`] with writes.
#[derive(Clone)]
pub struct ServiceContext {
    core: CoreContext,
}

impl ServiceContext {
    pub fn new(shell: Arc<Shell>, plugin_id: impl Into<String>) -> Self {
        Self {
            core: CoreContext::new(shell, plugin_id),
        }
    }

    // ─── Entities (full) ─────────────────────────────────────────────────────

    pub async fn create_entity(
        &self,
        entity_type: &str,
        entity: Value,
    ) -> Result<String, ServiceError> {
        self.shell()
            .services()
            .entities
            .create(entity_type, entity)
            .await
    }

    pub async fn update_entity(
        &self,
        entity_type: &str,
        id: &str,
        entity: Value,
    ) -> Result<(), ServiceError> {
        self.shell()
            .services()
            .entities
            .update(entity_type, id, entity)
            .await
    }

    pub async fn delete_entity(&self, entity_type: &str, id: &str) -> Result<bool, ServiceError> {
        self.shell()
            .services()
            .entities
            .delete(entity_type, id)
            .await
    }

    /// Registers an entity type (schema + adapter + config) with the store.
    pub async fn register_entity_type(
        &self,
        definition: EntityTypeDefinition,
    ) -> Result<(), ServiceError> {
        self.shell()
            .services()
            .entities
            .register_entity_type(definition)
            .await
    }

    // ─── Data sources ────────────────────────────────────────────────────────

    /// Registers a data source under `pluginId:name`.
    pub fn register_data_source(
        &self,
        source: Arc<dyn DataSource>,
    ) -> Result<(), RegistryError> {
        self.shell()
            .data_sources()
            .register(self.plugin_id(), source)
    }

    // ─── AI generation ───────────────────────────────────────────────────────

    pub async fn ai_generate(&self, prompt: &str, schema: &Value) -> Result<Value, ServiceError> {
        self.shell().services().ai.generate(prompt, schema).await
    }

    /// Probe before calling: not every model stack can draw.
    pub fn supports_image_generation(&self) -> bool {
        self.shell().services().ai.supports_image_generation()
    }

    pub async fn ai_generate_image(&self, prompt: &str) -> Result<Vec<u8>, ServiceError> {
        self.shell().services().ai.generate_image(prompt).await
    }

    // ─── Content ─────────────────────────────────────────────────────────────

    pub async fn resolve_content(
        &self,
        template_name: &str,
        data: &Value,
    ) -> Result<String, ServiceError> {
        self.shell()
            .services()
            .content
            .resolve(template_name, data)
            .await
    }

    pub fn content_capabilities(&self) -> ContentCapabilities {
        self.shell().services().content.capabilities()
    }

    // ─── Job writes (auto-scoped) ────────────────────────────────────────────

    /// Enqueues a job. Colon-less types are scoped to `pluginId:type`.
    ///
    /// `tool_context` carries the routing triple into the job's metadata;
    /// pass `None` for silent background work.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        tool_context: Option<&ToolContext>,
    ) -> Result<String, ContextError> {
        self.enqueue_targeted(job_type, payload, tool_context, None)
            .await
    }

    /// Like [`enqueue`](Self::enqueue) with a display target attached.
    pub async fn enqueue_targeted(
        &self,
        job_type: &str,
        payload: Value,
        tool_context: Option<&ToolContext>,
        operation_target: Option<String>,
    ) -> Result<String, ContextError> {
        let scoped = scoped_job_type(self.plugin_id(), job_type);
        let metadata = job_metadata(
            self.plugin_id(),
            operation_label(&scoped),
            tool_context,
            operation_target,
        );
        let id = self
            .shell()
            .jobs()
            .enqueue(scoped, payload, metadata, EnqueueOptions::default())
            .await?;
        Ok(id)
    }

    /// Enqueues a batch: generates the batch id, scopes each operation's
    /// type, and stamps `operation_type = "batch_processing"`.
    pub async fn enqueue_batch(
        &self,
        operations: Vec<BatchOperation>,
        tool_context: Option<&ToolContext>,
    ) -> Result<String, ContextError> {
        let batch_id = Uuid::new_v4().to_string();
        let operations: Vec<BatchOperation> = operations
            .into_iter()
            .map(|op| BatchOperation {
                op_type: scoped_job_type(self.plugin_id(), &op.op_type),
                data: op.data,
            })
            .collect();
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

    // ─── Misc lookups ────────────────────────────────────────────────────────

    /// View template lookup by scoped name.
    pub fn view_template(&self, name: &str) -> Option<Value> {
        self.shell().view_templates().get(name)
    }

    /// Package name of any registered plugin.
    pub fn package_name(&self, plugin_id: &str) -> Option<String> {
        self.shell().manager().package_name(plugin_id)
    }

    /// Registers an evaluation handler under `(pluginId, handler_id)`.
    pub fn register_eval_handler(
        &self,
        handler_id: &str,
        handler: Arc<dyn EvalHandler>,
    ) -> Result<(), RegistryError> {
        self.shell()
            .evals()
            .register(self.plugin_id(), handler_id, handler)
    }
}

impl Deref for ServiceContext {
    type Target = CoreContext;

    fn deref(&self) -> &CoreContext {
        &self.core
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
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
    async fn bare_job_types_are_scoped_to_the_plugin() {
        let shell = test_shell();
        let ctx = ServiceContext::new(Arc::clone(&shell), "notes");

        let id = ctx.enqueue("index", json!({}), None).await.unwrap();
        let job = shell.jobs().job(&id).unwrap();
        assert_eq!(job.job_type, "notes:index");
        assert_eq!(job.metadata.operation_type, "index");
        assert_eq!(job.metadata.plugin_id, "notes");

        // Already-scoped types pass through untouched.
        let id = ctx.enqueue("links:fetch", json!({}), None).await.unwrap();
        assert_eq!(shell.jobs().job(&id).unwrap().job_type, "links:fetch");
    }

    #[tokio::test]
    async fn tool_context_routing_lands_in_job_metadata() {
        let shell = test_shell();
        let ctx = ServiceContext::new(Arc::clone(&shell), "notes");
        let tool_ctx = ToolContext::new("cli", "user-1").with_channel("chan-1");

        let id = ctx
            .enqueue("index", json!({}), Some(&tool_ctx))
            .await
            .unwrap();
        let job = shell.jobs().job(&id).unwrap();
        assert_eq!(job.metadata.interface_type.as_deref(), Some("cli"));
        assert_eq!(job.metadata.channel_id.as_deref(), Some("chan-1"));

        // No tool context: a silent background job.
        let id = ctx.enqueue("index2", json!({}), None).await.unwrap();
        let job = shell.jobs().job(&id).unwrap();
        assert!(job.metadata.interface_type.is_none());
        assert!(job.metadata.channel_id.is_none());
    }

    #[tokio::test]
    async fn batches_share_the_generated_batch_id() {
        let shell = test_shell();
        let ctx = ServiceContext::new(Arc::clone(&shell), "notes");

        let batch_id = ctx
            .enqueue_batch(
                vec![
                    BatchOperation::new("import", json!({"n": 1})),
                    BatchOperation::new("import", json!({"n": 2})),
                ],
                None,
            )
            .await
            .unwrap();

        let children = shell.jobs().batch_children(&batch_id);
        assert_eq!(children.len(), 2);
        for child in children {
            let job = shell.jobs().job(&child).unwrap();
            assert_eq!(job.root_job_id, batch_id);
            assert_eq!(job.job_type, "notes:import");
            assert_eq!(job.metadata.plugin_id, "notes");
            assert_eq!(job.metadata.operation_type, "batch_processing");
        }
    }

    #[tokio::test]
    async fn job_handlers_are_always_prefixed() {
        let shell = test_shell();
        let ctx = ServiceContext::new(Arc::clone(&shell), "notes");
        ctx.register_job_handler(
            "index",
            Arc::new(cortex_jobs::FnJobHandler(|_p, _c, _r| {
                Box::pin(async { Ok(serde_json::Value::Null) })
                    as futures::future::BoxFuture<'static, _>
            })),
        )
        .unwrap();
        assert!(shell.jobs().has_handler("notes:index"));
        assert!(!shell.jobs().has_handler("index"));
    }
}
