//! Templates: schema-validated, round-trippable content definitions.
//!
//! A template couples a JSON schema, a base prompt for generation, and a
//! formatter that renders data to text and parses it back. The contract is
//! `parse(format(d)) == d` for any `d` valid under the schema.

use std::sync::Arc;

use serde_json::Value;

use crate::error::TemplateError;
use crate::services::PermissionLevel;

/// Bidirectional renderer between structured data and text.
pub trait TemplateFormatter: Send + Sync {
    fn format(&self, data: &Value) -> Result<String, TemplateError>;
    fn parse(&self, text: &str) -> Result<Value, TemplateError>;
}

/// A registered template. Stored under `pluginId:name`.
#[derive(Clone)]
pub struct Template {
    pub name: String,
    pub description: String,
    /// JSON schema the data must satisfy.
    pub schema: Value,
    /// Prompt prefix used when content is generated from this template.
    pub base_prompt: String,
    pub formatter: Arc<dyn TemplateFormatter>,
    pub required_permission: PermissionLevel,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        base_prompt: impl Into<String>,
        formatter: Arc<dyn TemplateFormatter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            base_prompt: base_prompt.into(),
            formatter,
            required_permission: PermissionLevel::Anchor,
        }
    }

    pub fn with_permission(mut self, level: PermissionLevel) -> Self {
        self.required_permission = level;
        self
    }

    /// Renders `data` through the formatter.
    pub fn format(&self, data: &Value) -> Result<String, TemplateError> {
        self.formatter.format(data)
    }

    /// Parses text back into data.
    pub fn parse(&self, text: &str) -> Result<Value, TemplateError> {
        self.formatter.parse(text)
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("required_permission", &self.required_permission)
            .finish()
    }
}

/// Formatter that renders data as pretty JSON and parses it back.
///
/// The simplest formatter satisfying the round-trip contract; plugins with
/// richer markdown layouts supply their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl TemplateFormatter for JsonFormatter {
    fn format(&self, data: &Value) -> Result<String, TemplateError> {
        serde_json::to_string_pretty(data).map_err(|e| TemplateError::Format(e.to_string()))
    }

    fn parse(&self, text: &str) -> Result<Value, TemplateError> {
        serde_json::from_str(text).map_err(|e| TemplateError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_formatter_round_trips() {
        let template = Template::new(
            "summary",
            "Daily summary",
            json!({"type": "object"}),
            "Summarize the day.",
            Arc::new(JsonFormatter),
        );
        let data = json!({"title": "Tuesday", "items": [1, 2, 3]});
        let rendered = template.format(&data).unwrap();
        assert_eq!(template.parse(&rendered).unwrap(), data);
    }
}
