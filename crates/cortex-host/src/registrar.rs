//! Capability registrar.
//!
//! Translates a plugin's [`Capabilities`] bundle into registry writes with
//! per-item try/continue semantics: one malformed item is logged and skipped,
//! its siblings still land. Each batch is logged as "registered N of M".
//!
//! Registration also binds the per-plugin bus bridge channels:
//! `plugin:<id>:tool:execute` and `plugin:<id>:resource:get` dispatch into
//! the plugin's handlers, and tool progress is forwarded on
//! `plugin:<id>:progress`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use cortex_core::{
    Capabilities, CommandRegisterPayload, MessageResponse, MessageBus, PermissionService,
    ProgressSender, Resource, ResourceGetPayload, ResourceRegisterPayload, McpService, Tool,
    ToolContext, ToolExecutePayload, ToolProgressPayload, ToolRegisterPayload, ToolResponse,
    system,
};

use crate::commands::CommandRegistry;
use crate::context::scope;
use crate::routes::RouteTable;

/// Fans plugin capabilities out into the shell's registries.
pub struct CapabilityRegistrar {
    bus: Arc<MessageBus>,
    mcp: Arc<dyn McpService>,
    permissions: Arc<dyn PermissionService>,
    commands: Arc<CommandRegistry>,
    routes: Arc<RouteTable>,
}

impl CapabilityRegistrar {
    pub(crate) fn new(
        bus: Arc<MessageBus>,
        mcp: Arc<dyn McpService>,
        permissions: Arc<dyn PermissionService>,
        commands: Arc<CommandRegistry>,
        routes: Arc<RouteTable>,
    ) -> Self {
        Self {
            bus,
            mcp,
            permissions,
            commands,
            routes,
        }
    }

    /// Registers everything in `capabilities` on behalf of `plugin_id`.
    pub async fn register(&self, plugin_id: &str, capabilities: Capabilities) {
        self.register_tools(plugin_id, capabilities.tools).await;
        self.register_resources(plugin_id, capabilities.resources)
            .await;
        self.register_commands(plugin_id, capabilities.commands)
            .await;
        self.register_routes(plugin_id, capabilities.api_routes);
    }

    async fn register_tools(&self, plugin_id: &str, tools: Vec<Tool>) {
        if tools.is_empty() {
            return;
        }
        let total = tools.len();
        let mut accepted: HashMap<String, Tool> = HashMap::new();

        for mut tool in tools {
            tool.info.name = scope::tool_name(plugin_id, &tool.info.name);
            let payload = ToolRegisterPayload {
                plugin_id: plugin_id.to_string(),
                tool: tool.info.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self
                .bus
                .broadcast_channel(&system::TOOL_REGISTER, &payload, "shell")
                .await
            {
                warn!(plugin = %plugin_id, tool = %tool.info.name, error = %e, "Skipping tool");
                continue;
            }
            accepted.insert(tool.info.name.clone(), tool);
        }

        let infos: Vec<_> = accepted.values().map(|t| t.info.clone()).collect();
        if let Err(e) = self.mcp.register_plugin_tools(plugin_id, &infos).await {
            warn!(plugin = %plugin_id, error = %e, "MCP tool registration failed");
        }
        info!(
            plugin = %plugin_id,
            "Registered {} of {} tools",
            accepted.len(),
            total
        );
        self.bind_tool_channel(plugin_id, accepted);
    }

    /// Subscribes `plugin:<id>:tool:execute` and dispatches into the
    /// plugin's tools, enforcing visibility against the caller's permission
    /// level.
    fn bind_tool_channel(&self, plugin_id: &str, tools: HashMap<String, Tool>) {
        let tools = Arc::new(tools);
        let permissions = Arc::clone(&self.permissions);
        let bus = Arc::clone(&self.bus);
        let progress_channel = system::progress(plugin_id);
        let plugin = plugin_id.to_string();

        self.bus.subscribe(
            system::tool_execute(plugin_id),
            Arc::new(move |msg| {
                let tools = Arc::clone(&tools);
                let permissions = Arc::clone(&permissions);
                let bus = Arc::clone(&bus);
                let progress_channel = progress_channel.clone();
                let plugin = plugin.clone();
                Box::pin(async move {
                    let payload: ToolExecutePayload = match serde_json::from_value(msg.payload) {
                        Ok(p) => p,
                        Err(e) => return Some(MessageResponse::error(e.to_string())),
                    };
                    let Some(tool) = tools.get(&payload.tool_name) else {
                        return Some(MessageResponse::error(format!(
                            "unknown tool '{}'",
                            payload.tool_name
                        )));
                    };

                    let level = permissions
                        .level(&payload.interface_type, &payload.user_id)
                        .await;
                    if !tool.info.visibility.allows(level) {
                        return Some(tool_reply(ToolResponse::err("permission denied")));
                    }

                    let mut ctx =
                        ToolContext::new(payload.interface_type, payload.user_id);
                    if let Some(channel_id) = payload.channel_id {
                        ctx = ctx.with_channel(channel_id);
                    }
                    if payload.has_progress
                        && let Some(token) = payload.progress_token
                    {
                        let sender = progress_forwarder(
                            Arc::clone(&bus),
                            progress_channel.clone(),
                            token.clone(),
                            plugin.clone(),
                        );
                        ctx = ctx.with_progress(token, sender);
                    }

                    let response = (tool.handler)(payload.args, ctx).await;
                    Some(tool_reply(response))
                })
            }),
        );
    }

    async fn register_resources(&self, plugin_id: &str, resources: Vec<Resource>) {
        if resources.is_empty() {
            return;
        }
        let total = resources.len();
        let mut accepted: HashMap<String, Resource> = HashMap::new();

        for mut resource in resources {
            resource.info.uri = scope::resource_uri(plugin_id, &resource.info.uri);
            let payload = ResourceRegisterPayload {
                plugin_id: plugin_id.to_string(),
                resource: resource.info.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self
                .bus
                .broadcast_channel(&system::RESOURCE_REGISTER, &payload, "shell")
                .await
            {
                warn!(plugin = %plugin_id, resource = %resource.info.uri, error = %e, "Skipping resource");
                continue;
            }
            accepted.insert(resource.info.uri.clone(), resource);
        }

        let infos: Vec<_> = accepted.values().map(|r| r.info.clone()).collect();
        if let Err(e) = self.mcp.register_plugin_resources(plugin_id, &infos).await {
            warn!(plugin = %plugin_id, error = %e, "MCP resource registration failed");
        }
        info!(
            plugin = %plugin_id,
            "Registered {} of {} resources",
            accepted.len(),
            total
        );

        let resources = Arc::new(accepted);
        self.bus.subscribe(
            system::resource_get(plugin_id),
            Arc::new(move |msg| {
                let resources = Arc::clone(&resources);
                Box::pin(async move {
                    let payload: ResourceGetPayload = match serde_json::from_value(msg.payload) {
                        Ok(p) => p,
                        Err(e) => return Some(MessageResponse::error(e.to_string())),
                    };
                    let Some(resource) = resources.get(&payload.resource_uri) else {
                        return Some(MessageResponse::error(format!(
                            "unknown resource '{}'",
                            payload.resource_uri
                        )));
                    };
                    match (resource.handler)().await {
                        Ok(contents) => match serde_json::to_value(contents) {
                            Ok(value) => Some(MessageResponse::data(value)),
                            Err(e) => Some(MessageResponse::error(e.to_string())),
                        },
                        Err(e) => Some(MessageResponse::error(e.to_string())),
                    }
                })
            }),
        );
    }

    async fn register_commands(&self, plugin_id: &str, commands: Vec<cortex_core::Command>) {
        if commands.is_empty() {
            return;
        }
        let total = commands.len();
        let mut registered = 0;

        for command in commands {
            let payload = CommandRegisterPayload {
                plugin_id: plugin_id.to_string(),
                command: command.info.clone(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.commands.register(plugin_id, command) {
                warn!(plugin = %plugin_id, error = %e, "Skipping command");
                continue;
            }
            if let Err(e) = self
                .bus
                .broadcast_channel(&system::COMMAND_REGISTER, &payload, "shell")
                .await
            {
                warn!(plugin = %plugin_id, command = %payload.command.name, error = %e, "Command register message failed");
            }
            registered += 1;
        }

        info!(
            plugin = %plugin_id,
            "Registered {registered} of {total} commands"
        );
    }

    fn register_routes(&self, plugin_id: &str, routes: Vec<cortex_core::ApiRoute>) {
        if routes.is_empty() {
            return;
        }
        let total = routes.len();
        for route in &routes {
            self.routes.register(plugin_id, route.clone());
        }
        info!(plugin = %plugin_id, "Registered {total} of {total} API routes");
    }
}

fn tool_reply(response: ToolResponse) -> MessageResponse {
    match serde_json::to_value(&response) {
        Ok(value) => MessageResponse::data(value),
        Err(e) => MessageResponse::error(e.to_string()),
    }
}

/// Builds a [`ProgressSender`] that republishes notifications on the
/// plugin's progress channel for the transport to pick up.
fn progress_forwarder(
    bus: Arc<MessageBus>,
    channel: String,
    token: String,
    plugin_id: String,
) -> ProgressSender {
    Arc::new(move |notification| {
        let bus = Arc::clone(&bus);
        let channel = channel.clone();
        let token = token.clone();
        let plugin_id = plugin_id.clone();
        Box::pin(async move {
            let payload = ToolProgressPayload {
                progress_token: token,
                notification,
            };
            match serde_json::to_value(&payload) {
                Ok(value) => {
                    bus.broadcast(&channel, value, &plugin_id).await;
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Dropping progress notification");
                }
            }
        })
    })
}
