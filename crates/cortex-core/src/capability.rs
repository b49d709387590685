//! Capability model: tools, resources, commands, and API routes.
//!
//! A plugin's `register` returns a [`Capabilities`] bundle. Ownership of the
//! bundle transfers to the shell, which fans the items out into the service
//! registries (see the capability registrar in `cortex-host`).

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::services::PermissionLevel;

// ─── Tools ───────────────────────────────────────────────────────────────────

/// Who may call a tool.
///
/// `Anchor` is the default: only fully trusted callers. Only tools marked
/// `Public` are callable by unauthenticated callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolVisibility {
    Public,
    Trusted,
    #[default]
    Anchor,
}

impl ToolVisibility {
    /// Returns `true` when a caller at `level` may invoke a tool with this
    /// visibility.
    pub fn allows(self, level: PermissionLevel) -> bool {
        match self {
            Self::Public => true,
            Self::Trusted => level >= PermissionLevel::Trusted,
            Self::Anchor => level >= PermissionLevel::Anchor,
        }
    }
}

/// Serializable descriptor of a tool (everything but the handler).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Fully prefixed name (`pluginId_name` once registered).
    pub name: String,
    pub description: String,
    /// JSON schema for the tool input.
    pub input_schema: Value,
    #[serde(default)]
    pub visibility: ToolVisibility,
}

/// Result of a tool invocation.
///
/// Invalid input or handler failure produces `success = false` with an error
/// string; tools never surface as panics or thrown errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    /// A successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed response with an error message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Progress payload a tool may stream back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    pub current: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Callback a tool uses to stream progress to the invoking transport.
pub type ProgressSender =
    Arc<dyn Fn(ProgressNotification) -> BoxFuture<'static, ()> + Send + Sync>;

/// Caller-side context handed to every tool invocation.
///
/// The `(interface_type, channel_id)` pair is the **only** mechanism by which
/// jobs enqueued inside a tool handler know where to deliver progress.
#[derive(Clone)]
pub struct ToolContext {
    pub interface_type: String,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub progress_token: Option<String>,
    pub progress: Option<ProgressSender>,
}

impl ToolContext {
    /// A context for `user_id` arriving over `interface_type`.
    pub fn new(interface_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            interface_type: interface_type.into(),
            user_id: user_id.into(),
            channel_id: None,
            progress_token: None,
            progress: None,
        }
    }

    /// Sets the originating channel.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Attaches a progress token and sink.
    pub fn with_progress(mut self, token: impl Into<String>, sender: ProgressSender) -> Self {
        self.progress_token = Some(token.into());
        self.progress = Some(sender);
        self
    }

    /// Streams a progress notification back to the caller, if one listens.
    pub async fn send_progress(&self, notification: ProgressNotification) {
        if let Some(sender) = &self.progress {
            sender(notification).await;
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("interface_type", &self.interface_type)
            .field("user_id", &self.user_id)
            .field("channel_id", &self.channel_id)
            .field("progress_token", &self.progress_token)
            .finish()
    }
}

/// Type-erased async tool handler.
pub type ToolHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, ToolResponse> + Send + Sync>;

/// A callable tool: descriptor plus handler.
#[derive(Clone)]
pub struct Tool {
    pub info: ToolInfo,
    pub handler: ToolHandler,
}

impl Tool {
    /// Creates a tool from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResponse> + Send + 'static,
    {
        Self {
            info: ToolInfo {
                name: name.into(),
                description: description.into(),
                input_schema,
                visibility: ToolVisibility::default(),
            },
            handler: Arc::new(move |input, ctx| Box::pin(handler(input, ctx))),
        }
    }

    /// Overrides the default `Anchor` visibility.
    pub fn with_visibility(mut self, visibility: ToolVisibility) -> Self {
        self.info.visibility = visibility;
        self
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("info", &self.info).finish()
    }
}

// ─── Resources ───────────────────────────────────────────────────────────────

/// Serializable descriptor of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Fully prefixed URI (`pluginId_uri` once registered).
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One content block of a resource read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

/// Result of reading a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContents {
    pub contents: Vec<ResourceContent>,
}

/// Type-erased async resource reader.
pub type ResourceHandler =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ResourceContents, ServiceError>> + Send + Sync>;

/// A readable resource: descriptor plus handler.
#[derive(Clone)]
pub struct Resource {
    pub info: ResourceInfo,
    pub handler: ResourceHandler,
}

impl Resource {
    /// Creates a resource from an async closure.
    pub fn new<F, Fut>(uri: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceContents, ServiceError>> + Send + 'static,
    {
        Self {
            info: ResourceInfo {
                uri: uri.into(),
                name: name.into(),
                description: None,
                mime_type: None,
            },
            handler: Arc::new(move || Box::pin(handler())),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.info.mime_type = Some(mime_type.into());
        self
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("info", &self.info).finish()
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Serializable descriptor of a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
}

/// Caller-side context handed to a command handler.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub interface_type: String,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub user_level: PermissionLevel,
}

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum CommandResponse {
    /// Plain reply text.
    Message { message: String },
    /// The command enqueued a single job.
    JobOperation { message: String, job_id: String },
    /// The command enqueued a batch.
    BatchOperation {
        message: String,
        batch_id: String,
        operation_count: usize,
    },
}

/// Type-erased async command handler.
pub type CommandHandler =
    Arc<dyn Fn(Vec<String>, CommandContext) -> BoxFuture<'static, CommandResponse> + Send + Sync>;

/// An executable command: descriptor plus handler.
#[derive(Clone)]
pub struct Command {
    pub info: CommandInfo,
    pub handler: CommandHandler,
}

impl Command {
    /// Creates a command from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<String>, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResponse> + Send + 'static,
    {
        Self {
            info: CommandInfo {
                name: name.into(),
                description: description.into(),
                usage: None,
            },
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Sets the usage string shown by `/help`.
    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.info.usage = Some(usage.into());
        self
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("info", &self.info).finish()
    }
}

// ─── API routes ──────────────────────────────────────────────────────────────

/// HTTP method of an API route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Delete,
}

/// A plugin-declared HTTP route, bound to one of its tools.
///
/// The shell exposes registered routes under `/api/{plugin_id}{path}`; a
/// webserver interface binds handlers that marshal requests into the named
/// tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoute {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Unprefixed tool name within the declaring plugin.
    pub tool: String,
    #[serde(default)]
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_redirect: Option<String>,
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Everything a plugin exposes to the outside world.
///
/// Produced by `Plugin::register`; consumed by the capability registrar.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub commands: Vec<Command>,
    pub api_routes: Vec<ApiRoute>,
}

impl Capabilities {
    /// An empty bundle.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_route(mut self, route: ApiRoute) -> Self {
        self.api_routes.push(route);
        self
    }

    /// Total number of items across all capability kinds.
    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.commands.len() + self.api_routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_visibility_defaults_to_anchor() {
        let info: ToolInfo = serde_json::from_value(json!({
            "name": "notes_create",
            "description": "Create a note",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(info.visibility, ToolVisibility::Anchor);
        assert!(!info.visibility.allows(PermissionLevel::Public));
        assert!(info.visibility.allows(PermissionLevel::Anchor));
    }

    #[test]
    fn api_route_defaults() {
        let route: ApiRoute = serde_json::from_value(json!({
            "path": "/capture",
            "tool": "capture"
        }))
        .unwrap();
        assert_eq!(route.method, HttpMethod::Post);
        assert!(!route.public);
        assert!(route.success_redirect.is_none());
    }

    #[test]
    fn command_response_wire_shape() {
        let response = CommandResponse::JobOperation {
            message: "queued".into(),
            job_id: "j-1".into(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({"type": "job-operation", "message": "queued", "jobId": "j-1"})
        );
    }
}
