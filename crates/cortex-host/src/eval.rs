//! Evaluation handler registry.
//!
//! Plugins expose handlers that external YAML test cases can invoke
//! directly. The registry is keyed `(plugin_id, handler_id)`; handler output
//! is validated against an [`EvalExpectation`] using dot- and bracket-path
//! rules.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use cortex_core::ServiceError;

use crate::error::RegistryError;

/// A plugin-exposed evaluation entry point.
#[async_trait]
pub trait EvalHandler: Send + Sync {
    async fn run(&self, input: Value) -> Result<Value, ServiceError>;
}

/// Registry of evaluation handlers, keyed `(plugin_id, handler_id)`.
pub struct EvalHandlerRegistry {
    handlers: RwLock<HashMap<(String, String), Arc<dyn EvalHandler>>>,
}

impl EvalHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        plugin_id: &str,
        handler_id: &str,
        handler: Arc<dyn EvalHandler>,
    ) -> Result<(), RegistryError> {
        let key = (plugin_id.to_string(), handler_id.to_string());
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&key) {
            return Err(RegistryError::conflict(
                "eval-handler",
                format!("{plugin_id}:{handler_id}"),
            ));
        }
        debug!(plugin = %plugin_id, handler = %handler_id, "Eval handler registered");
        handlers.insert(key, handler);
        Ok(())
    }

    pub async fn invoke(
        &self,
        plugin_id: &str,
        handler_id: &str,
        input: Value,
    ) -> Result<Value, RegistryError> {
        let handler = self
            .handlers
            .read()
            .get(&(plugin_id.to_string(), handler_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                RegistryError::not_found("eval-handler", format!("{plugin_id}:{handler_id}"))
            })?;
        handler.run(input).await.map_err(|e| RegistryError::Failed {
            registry: "eval-handler",
            key: format!("{plugin_id}:{handler_id}"),
            message: e.to_string(),
        })
    }

    pub fn handler_ids(&self, plugin_id: &str) -> Vec<String> {
        self.handlers
            .read()
            .keys()
            .filter(|(p, _)| p == plugin_id)
            .map(|(_, h)| h.clone())
            .collect()
    }
}

impl Default for EvalHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Expectations ────────────────────────────────────────────────────────────

/// One validation rule applied to every output item.
///
/// Exactly one of `exists` / `equals` / `matches` is expected; `matches` is
/// a regex applied to the string at `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRule {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
}

/// Declarative expectation over a handler's output list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalExpectation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Substrings that must each appear in at least one serialized item.
    #[serde(default)]
    pub items_contain: Vec<String>,
    /// Rules applied to every item.
    #[serde(default)]
    pub validate_each: Vec<PathRule>,
}

impl EvalExpectation {
    /// Validates `output` (treated as a list; a lone value counts as one
    /// item). Returns the list of violations, empty on success.
    pub fn check(&self, output: &Value) -> Vec<String> {
        let items: Vec<&Value> = match output {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut violations = Vec::new();

        if let Some(exact) = self.exact_items
            && items.len() != exact
        {
            violations.push(format!("expected exactly {exact} items, got {}", items.len()));
        }
        if let Some(min) = self.min_items
            && items.len() < min
        {
            violations.push(format!("expected at least {min} items, got {}", items.len()));
        }
        if let Some(max) = self.max_items
            && items.len() > max
        {
            violations.push(format!("expected at most {max} items, got {}", items.len()));
        }

        for needle in &self.items_contain {
            let found = items
                .iter()
                .any(|item| item.to_string().contains(needle.as_str()));
            if !found {
                violations.push(format!("no item contains '{needle}'"));
            }
        }

        for rule in &self.validate_each {
            for (index, item) in items.iter().enumerate() {
                if let Some(violation) = check_rule(rule, item) {
                    violations.push(format!("item {index}: {violation}"));
                }
            }
        }

        violations
    }
}

fn check_rule(rule: &PathRule, item: &Value) -> Option<String> {
    let value = resolve_path(item, &rule.path);

    if let Some(expected) = rule.exists {
        let actual = value.is_some();
        if actual != expected {
            return Some(format!(
                "path '{}' {}",
                rule.path,
                if expected { "is missing" } else { "should not exist" }
            ));
        }
    }

    if let Some(expected) = &rule.equals {
        match value {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Some(format!(
                    "path '{}' is {actual}, expected {expected}",
                    rule.path
                ));
            }
            None => return Some(format!("path '{}' is missing", rule.path)),
        }
    }

    if let Some(pattern) = &rule.matches {
        let Some(actual) = value else {
            return Some(format!("path '{}' is missing", rule.path));
        };
        let text = match actual {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match regex_lite::Regex::new(pattern) {
            Ok(re) if re.is_match(&text) => {}
            Ok(_) => {
                return Some(format!(
                    "path '{}' value '{text}' does not match /{pattern}/",
                    rule.path
                ));
            }
            Err(e) => return Some(format!("invalid pattern /{pattern}/: {e}")),
        }
    }

    None
}

/// Resolves a dot- and bracket-path (`a.b[0].c`) against a JSON value.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        let (name, indices) = split_indices(segment)?;
        if !name.is_empty() {
            current = current.as_object()?.get(name)?;
        }
        for index in indices {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

/// Splits `items[0][2]` into `("items", [0, 2])`.
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let name_end = segment.find('[').unwrap_or(segment.len());
    let name = &segment[..name_end];
    let mut indices = Vec::new();
    let mut rest = &segment[name_end..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        indices.push(stripped[..close].parse().ok()?);
        rest = &stripped[close + 1..];
    }
    rest.is_empty().then_some((name, indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_resolution_handles_dots_and_brackets() {
        let value = json!({"results": [{"tags": ["a", "b"]}, {"tags": []}]});
        assert_eq!(
            resolve_path(&value, "results[0].tags[1]"),
            Some(&json!("b"))
        );
        assert_eq!(resolve_path(&value, "results[1].tags[0]"), None);
        assert_eq!(resolve_path(&value, "missing.path"), None);
    }

    #[test]
    fn expectation_counts_and_contains() {
        let expectation: EvalExpectation = serde_json::from_value(json!({
            "minItems": 1,
            "maxItems": 3,
            "itemsContain": ["alpha"]
        }))
        .unwrap();
        let output = json!([{"title": "alpha"}, {"title": "beta"}]);
        assert!(expectation.check(&output).is_empty());

        let missing = json!([{"title": "beta"}]);
        let violations = expectation.check(&missing);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("alpha"));
    }

    #[test]
    fn validate_each_rules() {
        let expectation: EvalExpectation = serde_json::from_value(json!({
            "exactItems": 2,
            "validateEach": [
                {"path": "id", "exists": true},
                {"path": "kind", "equals": "note"},
                {"path": "title", "matches": "^[A-Z]"}
            ]
        }))
        .unwrap();
        let good = json!([
            {"id": 1, "kind": "note", "title": "Alpha"},
            {"id": 2, "kind": "note", "title": "Beta"}
        ]);
        assert!(expectation.check(&good).is_empty());

        let bad = json!([
            {"id": 1, "kind": "note", "title": "alpha"},
            {"kind": "task", "title": "Beta"}
        ]);
        let violations = expectation.check(&bad);
        assert!(violations.iter().any(|v| v.contains("does not match")));
        assert!(violations.iter().any(|v| v.contains("is missing")));
        assert!(violations.iter().any(|v| v.contains("expected \"note\"") || v.contains("expected")));
    }

    #[tokio::test]
    async fn registry_is_write_once_per_key() {
        struct Echo;
        #[async_trait]
        impl EvalHandler for Echo {
            async fn run(&self, input: Value) -> Result<Value, ServiceError> {
                Ok(input)
            }
        }

        let registry = EvalHandlerRegistry::new();
        registry.register("notes", "search", Arc::new(Echo)).unwrap();
        assert!(registry.register("notes", "search", Arc::new(Echo)).is_err());

        let out = registry
            .invoke("notes", "search", json!({"q": "x"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"q": "x"}));
    }
}
