//! Note-taking service plugin.
//!
//! Demonstrates the full service-tier surface: an entity type, a
//! round-trippable template, a job handler with progress reporting, tools,
//! a slash command, a resource, an API route, and an eval handler.
//!
//! Configure via `cortex.yaml`:
//!
//! ```yaml
//! plugins:
//!   notes:
//!     index_on_start: true
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use cortex_core::{
    ApiRoute, Capabilities, Command, CommandResponse, EntityTypeDefinition, HttpMethod, Resource,
    ResourceContent, ResourceContents, ServiceError, Template, TemplateError, TemplateFormatter,
    Tool, ToolContext, ToolResponse, ToolVisibility,
};
use cortex_host::{EvalHandler, Plugin, PluginError, PluginType, ServiceContext, Shell};
use cortex_jobs::{JobContext, JobError, JobHandler, ProgressReporter};

/// Plugin configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Enqueue a background index pass during registration.
    pub index_on_start: bool,
}

/// The note-taking plugin.
#[derive(Default)]
pub struct NotesPlugin;

#[async_trait]
impl Plugin for NotesPlugin {
    fn id(&self) -> &str {
        "notes"
    }

    fn package_name(&self) -> &str {
        "cortex-plugin-notes"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Service
    }

    fn description(&self) -> Option<&str> {
        Some("Capture and search short notes")
    }

    async fn register(&self, shell: &Arc<Shell>) -> Result<Capabilities, PluginError> {
        let ctx = ServiceContext::new(Arc::clone(shell), self.id());
        let config: NotesConfig = serde_json::from_value(ctx.config()).unwrap_or_default();

        ctx.register_entity_type(EntityTypeDefinition {
            name: "note".to_string(),
            schema: note_schema(),
            adapter: "markdown".to_string(),
            config: json!({}),
        })
        .await
        .map_err(register_failed)?;

        ctx.register_template(Template::new(
            "note",
            "A captured note with title and body",
            note_schema(),
            "Write a short note capturing the idea below.",
            Arc::new(NoteFormatter),
        ))
        .map_err(register_failed)?;

        ctx.register_job_handler("index", Arc::new(IndexHandler { ctx: ctx.clone() }))
            .map_err(register_failed)?;

        ctx.register_eval_handler("search", Arc::new(SearchEval { ctx: ctx.clone() }))
            .map_err(register_failed)?;

        if config.index_on_start {
            // Silent background pass: no tool context, so no chat output.
            let job_id = ctx
                .enqueue("index", json!({"reason": "startup"}), None)
                .await
                .map_err(register_failed)?;
            info!(job = %job_id, "Startup index enqueued");
        }

        Ok(ctx
            .capabilities()
            .tool(capture_tool(ctx.clone()))
            .tool(search_tool(ctx.clone()))
            .command(note_command(ctx.clone()))
            .resource(recent_resource(ctx.clone()))
            .route(ApiRoute {
                path: "/capture".to_string(),
                method: HttpMethod::Post,
                tool: "capture".to_string(),
                public: false,
                success_redirect: None,
                error_redirect: None,
            })
            .build())
    }
}

fn register_failed(e: impl std::fmt::Display) -> PluginError {
    PluginError::register_failed(e.to_string())
}

fn note_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "body": {"type": "string"}
        },
        "required": ["title", "body"]
    })
}

// ─── Formatter ───────────────────────────────────────────────────────────────

/// Renders a note as markdown and parses it back.
///
/// `parse(format(d)) == d` for any schema-valid note.
struct NoteFormatter;

impl TemplateFormatter for NoteFormatter {
    fn format(&self, data: &Value) -> Result<String, TemplateError> {
        let title = data["title"]
            .as_str()
            .ok_or_else(|| TemplateError::Format("note is missing a title".to_string()))?;
        let body = data["body"]
            .as_str()
            .ok_or_else(|| TemplateError::Format("note is missing a body".to_string()))?;
        Ok(format!("# {title}\n\n{body}"))
    }

    fn parse(&self, text: &str) -> Result<Value, TemplateError> {
        let rest = text
            .strip_prefix("# ")
            .ok_or_else(|| TemplateError::Parse("expected a '# title' heading".to_string()))?;
        let (title, body) = rest
            .split_once("\n\n")
            .ok_or_else(|| TemplateError::Parse("expected a blank line after the title".to_string()))?;
        Ok(json!({"title": title, "body": body}))
    }
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

struct IndexHandler {
    ctx: ServiceContext,
}

#[async_trait]
impl JobHandler for IndexHandler {
    async fn execute(
        &self,
        _payload: Value,
        context: JobContext,
        progress: &ProgressReporter,
    ) -> Result<Value, JobError> {
        let notes = self
            .ctx
            .search_entities("note", "", usize::MAX)
            .await
            .map_err(|e| JobError::failed(e.to_string()))?;
        let total = notes.len() as u64;
        for (i, _note) in notes.iter().enumerate() {
            progress
                .update(i as u64 + 1, total, None)
                .await;
        }
        info!(job = %context.job_id, indexed = total, "Note index pass finished");
        Ok(json!({"indexed": total}))
    }
}

// ─── Tools, commands, resources ──────────────────────────────────────────────

fn capture_tool(ctx: ServiceContext) -> Tool {
    Tool::new(
        "capture",
        "Capture a note with a title and body",
        note_schema(),
        move |input, _caller| {
            let ctx = ctx.clone();
            async move {
                if input.get("title").and_then(Value::as_str).is_none() {
                    return ToolResponse::err("a note needs a title");
                }
                match ctx.create_entity("note", input).await {
                    Ok(id) => ToolResponse::ok(json!({"id": id})),
                    Err(e) => ToolResponse::err(e.to_string()),
                }
            }
        },
    )
}

fn search_tool(ctx: ServiceContext) -> Tool {
    Tool::new(
        "search",
        "Search notes by text",
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        }),
        move |input, _caller| {
            let ctx = ctx.clone();
            async move {
                let query = input["query"].as_str().unwrap_or_default().to_string();
                match ctx.search_entities("note", &query, 20).await {
                    Ok(results) => ToolResponse::ok(Value::Array(results)),
                    Err(e) => ToolResponse::err(e.to_string()),
                }
            }
        },
    )
    .with_visibility(ToolVisibility::Public)
}

fn note_command(ctx: ServiceContext) -> Command {
    Command::new("note", "Capture a note in the background", move |args, caller| {
        let ctx = ctx.clone();
        async move {
            if args.is_empty() {
                return CommandResponse::Message {
                    message: "Usage: /note <text>".to_string(),
                };
            }
            let text = args.join(" ");
            let mut tool_context =
                ToolContext::new(caller.interface_type.clone(), caller.user_id.clone());
            if let Some(channel) = caller.channel_id.clone() {
                tool_context = tool_context.with_channel(channel);
            }
            let title: String = text.chars().take(40).collect();
            match ctx
                .enqueue_targeted(
                    "capture",
                    json!({"title": title, "body": text}),
                    Some(&tool_context),
                    Some(title.clone()),
                )
                .await
            {
                Ok(job_id) => CommandResponse::JobOperation {
                    message: format!("Capturing \"{title}\""),
                    job_id,
                },
                Err(e) => CommandResponse::Message {
                    message: format!("Could not queue the capture: {e}"),
                },
            }
        }
    })
    .with_usage("/note <text>")
}

fn recent_resource(ctx: ServiceContext) -> Resource {
    Resource::new("recent", "Recently captured notes", move || {
        let ctx = ctx.clone();
        async move {
            let notes = ctx.search_entities("note", "", 10).await?;
            let contents = notes
                .into_iter()
                .map(|note| ResourceContent {
                    uri: "notes_recent".to_string(),
                    mime_type: Some("application/json".to_string()),
                    text: note.to_string(),
                })
                .collect();
            Ok(ResourceContents { contents })
        }
    })
    .with_mime_type("application/json")
}

// ─── Eval ────────────────────────────────────────────────────────────────────

struct SearchEval {
    ctx: ServiceContext,
}

#[async_trait]
impl EvalHandler for SearchEval {
    async fn run(&self, input: Value) -> Result<Value, ServiceError> {
        let query = input["query"].as_str().unwrap_or_default();
        let results = self.ctx.search_entities("note", query, 10).await?;
        Ok(Value::Array(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_harness::TestShell;

    #[test]
    fn note_formatter_round_trips() {
        let formatter = NoteFormatter;
        let note = json!({"title": "Tuesday", "body": "ship the indexer\nthen rest"});
        let text = formatter.format(&note).unwrap();
        assert_eq!(formatter.parse(&text).unwrap(), note);
    }

    #[tokio::test]
    async fn registers_the_full_capability_surface() {
        let harness = TestShell::new();
        harness
            .shell
            .register_plugin(Arc::new(NotesPlugin))
            .await
            .unwrap();
        harness.shell.initialize_plugins().await;

        let mut tools = harness.mcp.tool_names("notes");
        tools.sort();
        assert_eq!(tools, ["notes_capture", "notes_search"]);
        assert_eq!(harness.mcp.resource_uris("notes"), ["notes_recent"]);
        assert!(harness.shell.commands().contains("note"));
        assert!(harness.shell.templates().get("notes:note").is_some());
        assert!(harness.shell.jobs().has_handler("notes:index"));
        assert_eq!(harness.entities.type_names(), ["note"]);
    }

    #[tokio::test]
    async fn index_handler_reports_progress_per_note() {
        let harness = TestShell::new();
        harness
            .shell
            .register_plugin(Arc::new(NotesPlugin))
            .await
            .unwrap();
        harness.shell.initialize_plugins().await;

        let ctx = ServiceContext::new(Arc::clone(&harness.shell), "notes");
        ctx.create_entity("note", json!({"title": "a", "body": "b"}))
            .await
            .unwrap();

        let mut probe = cortex_harness::ProgressProbe::attach(harness.shell.bus());
        let job_id = ctx.enqueue("index", json!({}), None).await.unwrap();
        let terminal = probe.terminal_for(&job_id).await;
        assert_eq!(terminal.status, cortex_jobs::JobStatus::Completed);
    }
}
