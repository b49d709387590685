//! Shell-local API route table.
//!
//! Plugins declare routes in their capabilities; a webserver interface later
//! reads the table and binds HTTP handlers that marshal requests into the
//! named tool invocation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cortex_core::ApiRoute;

/// A route as exposed to webserver interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredRoute {
    pub plugin_id: String,
    /// `/api/{plugin_id}{path}`.
    pub full_path: String,
    pub definition: ApiRoute,
}

/// Append-only table of plugin-declared API routes.
pub struct RouteTable {
    routes: RwLock<Vec<RegisteredRoute>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, plugin_id: &str, route: ApiRoute) {
        let path = if route.path.starts_with('/') {
            route.path.clone()
        } else {
            format!("/{}", route.path)
        };
        let full_path = format!("/api/{plugin_id}{path}");
        debug!(route = %full_path, method = ?route.method, "API route registered");
        self.routes.write().push(RegisteredRoute {
            plugin_id: plugin_id.to_string(),
            full_path,
            definition: route,
        });
    }

    /// All registered routes, in registration order.
    pub fn all(&self) -> Vec<RegisteredRoute> {
        self.routes.read().clone()
    }

    /// Routes declared by one plugin.
    pub fn for_plugin(&self, plugin_id: &str) -> Vec<RegisteredRoute> {
        self.routes
            .read()
            .iter()
            .filter(|r| r.plugin_id == plugin_id)
            .cloned()
            .collect()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::HttpMethod;
    use serde_json::json;

    #[test]
    fn full_path_includes_plugin_prefix() {
        let table = RouteTable::new();
        let route: ApiRoute =
            serde_json::from_value(json!({"path": "/capture", "tool": "capture"})).unwrap();
        table.register("links", route);

        let all = table.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].full_path, "/api/links/capture");
        assert_eq!(all[0].definition.method, HttpMethod::Post);
    }
}
