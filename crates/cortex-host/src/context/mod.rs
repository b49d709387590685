//! Per-plugin, capability-scoped views of the shell.
//!
//! Three strictly widening tiers:
//!
//! | Tier | Adds |
//! |------|------|
//! | [`CoreContext`] | messaging, templates, AI query, read-only entities and conversations, job monitoring |
//! | [`ServiceContext`] | entity writes, entity types, data sources, content generation, job writes with auto-scoping, eval handlers |
//! | [`InterfaceContext`] | agent + MCP access, permissions, daemons, job writes **without** auto-scoping, conversation writes, route enumeration |
//!
//! Shared behavior lives in free functions in [`scope`], parameterized by
//! plugin id, instead of an inheritance chain.

pub mod core;
pub mod interface;
pub mod scope;
pub mod service;

pub use self::core::CoreContext;
pub use self::interface::InterfaceContext;
pub use self::service::ServiceContext;

use cortex_core::{ApiRoute, Capabilities, Command, Resource, Tool};

/// Builds a [`Capabilities`] bundle, stamping every tool name and resource
/// URI with the owning plugin's id.
pub struct CapabilityBuilder {
    plugin_id: String,
    capabilities: Capabilities,
}

impl CapabilityBuilder {
    pub(crate) fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            capabilities: Capabilities::none(),
        }
    }

    pub fn tool(mut self, mut tool: Tool) -> Self {
        tool.info.name = scope::tool_name(&self.plugin_id, &tool.info.name);
        self.capabilities.tools.push(tool);
        self
    }

    pub fn resource(mut self, mut resource: Resource) -> Self {
        resource.info.uri = scope::resource_uri(&self.plugin_id, &resource.info.uri);
        self.capabilities.resources.push(resource);
        self
    }

    /// Commands keep their bare names; collisions surface at the registry.
    pub fn command(mut self, command: Command) -> Self {
        self.capabilities.commands.push(command);
        self
    }

    pub fn route(mut self, route: ApiRoute) -> Self {
        self.capabilities.api_routes.push(route);
        self
    }

    pub fn build(self) -> Capabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_prefixes_tools_and_resources() {
        let caps = CapabilityBuilder::new("notes")
            .tool(Tool::new("search", "Search notes", json!({}), |_, _| async {
                cortex_core::ToolResponse::ok(json!([]))
            }))
            .resource(Resource::new("recent", "Recent notes", || async {
                Ok(cortex_core::ResourceContents { contents: vec![] })
            }))
            .build();

        assert_eq!(caps.tools[0].info.name, "notes_search");
        assert_eq!(caps.resources[0].info.uri, "notes_recent");
    }
}
