//! Template and view-template registries.
//!
//! Both are write-once-per-key, keyed `pluginId:name`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use cortex_core::Template;

use crate::context::scope::scoped_key;
use crate::error::RegistryError;

/// Registry of data templates (schema + prompt + formatter).
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `template` under `pluginId:name`.
    pub fn register(&self, plugin_id: &str, template: Template) -> Result<(), RegistryError> {
        let key = scoped_key(plugin_id, &template.name);
        let mut templates = self.templates.write();
        if templates.contains_key(&key) {
            return Err(RegistryError::conflict("template", key));
        }
        debug!(template = %key, "Template registered");
        templates.insert(key, template);
        Ok(())
    }

    /// Looks up a template by scoped name.
    pub fn get(&self, name: &str) -> Option<Template> {
        self.templates.read().get(name).cloned()
    }

    /// Renders data through the named template.
    pub fn format(&self, name: &str, data: &Value) -> Result<String, RegistryError> {
        let template = self
            .get(name)
            .ok_or_else(|| RegistryError::not_found("template", name))?;
        template.format(data).map_err(|e| RegistryError::Failed {
            registry: "template",
            key: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Parses text back through the named template.
    pub fn parse(&self, name: &str, text: &str) -> Result<Value, RegistryError> {
        let template = self
            .get(name)
            .ok_or_else(|| RegistryError::not_found("template", name))?;
        template.parse(text).map_err(|e| RegistryError::Failed {
            registry: "template",
            key: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of view templates (opaque render definitions for interfaces).
pub struct ViewTemplateRegistry {
    views: RwLock<HashMap<String, Value>>,
}

impl ViewTemplateRegistry {
    pub fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        plugin_id: &str,
        name: &str,
        definition: Value,
    ) -> Result<(), RegistryError> {
        let key = scoped_key(plugin_id, name);
        let mut views = self.views.write();
        if views.contains_key(&key) {
            return Err(RegistryError::conflict("view-template", key));
        }
        views.insert(key, definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.views.read().get(name).cloned()
    }
}

impl Default for ViewTemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::JsonFormatter;
    use serde_json::json;
    use std::sync::Arc;

    fn sample() -> Template {
        Template::new(
            "digest",
            "Daily digest",
            json!({"type": "object"}),
            "Digest the day.",
            Arc::new(JsonFormatter),
        )
    }

    #[test]
    fn registration_is_write_once() {
        let registry = TemplateRegistry::new();
        registry.register("notes", sample()).unwrap();
        let err = registry.register("notes", sample()).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
        assert!(registry.get("notes:digest").is_some());
    }

    #[test]
    fn format_and_parse_round_trip() {
        let registry = TemplateRegistry::new();
        registry.register("notes", sample()).unwrap();
        let data = json!({"entries": ["a", "b"]});
        let text = registry.format("notes:digest", &data).unwrap();
        assert_eq!(registry.parse("notes:digest", &text).unwrap(), data);
    }
}
