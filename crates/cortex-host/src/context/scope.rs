//! Namespacing helpers.
//!
//! Free functions parameterized by `plugin_id` stamp every plugin-produced
//! identifier so nothing two plugins emit can collide. All helpers are
//! idempotent: an already-prefixed name passes through unchanged.

use cortex_core::ToolContext;
use cortex_jobs::JobMetadata;

/// Prefixes a tool name: `search` → `notes_search`.
pub fn tool_name(plugin_id: &str, name: &str) -> String {
    let prefix = format!("{plugin_id}_");
    if name.starts_with(&prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

/// Prefixes a resource URI: `recent` → `notes_recent`.
pub fn resource_uri(plugin_id: &str, uri: &str) -> String {
    tool_name(plugin_id, uri)
}

/// Colon-scopes a registry key: `digest` → `notes:digest`.
pub fn scoped_key(plugin_id: &str, name: &str) -> String {
    let prefix = format!("{plugin_id}:");
    if name.starts_with(&prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

/// Scopes a job type, leaving already-scoped types (`other:type`) alone.
pub fn scoped_job_type(plugin_id: &str, job_type: &str) -> String {
    if job_type.contains(':') {
        job_type.to_string()
    } else {
        format!("{plugin_id}:{job_type}")
    }
}

/// Display label for a job type: the part after the scope.
pub fn operation_label(job_type: &str) -> &str {
    job_type
        .split_once(':')
        .map(|(_, tail)| tail)
        .unwrap_or(job_type)
}

/// Builds job routing metadata from an optional tool context.
///
/// Passing `None` produces a silent background job: no `interface_type`, no
/// `channel_id`, and therefore no chat output anywhere.
pub fn job_metadata(
    plugin_id: &str,
    operation_type: impl Into<String>,
    tool_context: Option<&ToolContext>,
    operation_target: Option<String>,
) -> JobMetadata {
    JobMetadata {
        operation_type: operation_type.into(),
        plugin_id: plugin_id.to_string(),
        interface_type: tool_context.map(|c| c.interface_type.clone()),
        channel_id: tool_context.and_then(|c| c.channel_id.clone()),
        operation_target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_prefixed_once() {
        assert_eq!(tool_name("notes", "search"), "notes_search");
        assert_eq!(tool_name("notes", "notes_search"), "notes_search");
    }

    #[test]
    fn job_types_scope_unless_already_scoped() {
        assert_eq!(scoped_job_type("notes", "index"), "notes:index");
        assert_eq!(scoped_job_type("notes", "links:fetch"), "links:fetch");
    }

    #[test]
    fn operation_label_strips_scope() {
        assert_eq!(operation_label("notes:index"), "index");
        assert_eq!(operation_label("index"), "index");
    }

    #[test]
    fn metadata_copies_routing_from_tool_context() {
        let ctx = ToolContext::new("cli", "user-1").with_channel("chan-9");
        let metadata = job_metadata("notes", "index", Some(&ctx), None);
        assert_eq!(metadata.interface_type.as_deref(), Some("cli"));
        assert_eq!(metadata.channel_id.as_deref(), Some("chan-9"));
        assert_eq!(metadata.plugin_id, "notes");

        let silent = job_metadata("notes", "index", None, None);
        assert!(silent.interface_type.is_none());
        assert!(silent.channel_id.is_none());
    }
}
