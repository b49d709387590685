//! End-to-end scenarios across the full shell: a service plugin with tools,
//! commands, jobs, templates, and eval handlers, driven through a recorded
//! message interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use cortex_core::{
    AgentResponse, ApiRoute, Capabilities, Command, CommandResponse, ConversationStore,
    EntityService, EntityTypeDefinition, HttpMethod, JsonFormatter, MessageResponse,
    PermissionLevel, ServiceError, Template, Tool, ToolContext, ToolResponse, system,
};
use cortex_harness::{ProgressProbe, RecordingAdapter, TestShell};
use cortex_host::{
    EvalHandler, InterfaceContext, Plugin, PluginError, PluginType, ServiceContext, Shell,
};
use cortex_interface::{IncomingMessage, MessageInterface, PendingConfirmation};
use cortex_jobs::FnJobHandler;

// ─── A realistic service plugin ──────────────────────────────────────────────

struct NotesPlugin;

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

#[async_trait]
impl Plugin for NotesPlugin {
    fn id(&self) -> &str {
        "notes"
    }

    fn package_name(&self) -> &str {
        "cortex-plugin-notes"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Service
    }

    async fn register(&self, shell: &Arc<Shell>) -> Result<Capabilities, PluginError> {
        let ctx = ServiceContext::new(Arc::clone(shell), self.id());
        let fail = |e: &dyn std::fmt::Display| PluginError::register_failed(e.to_string());

        ctx.register_job_handler(
            "content_operations",
            Arc::new(FnJobHandler(|_payload, _ctx, _progress| {
                Box::pin(async move { Ok(json!({"ok": true})) })
                    as BoxFuture<'static, Result<Value, cortex_jobs::JobError>>
            })),
        )
        .map_err(|e| fail(&e))?;

        ctx.register_template(Template::new(
            "note",
            "A captured note",
            json!({"type": "object"}),
            "Write a note.",
            Arc::new(JsonFormatter),
        ))
        .map_err(|e| fail(&e))?;

        ctx.register_eval_handler("search", Arc::new(SearchEval { ctx: ctx.clone() }))
            .map_err(|e| fail(&e))?;

        ctx.register_entity_type(EntityTypeDefinition {
            name: "note".to_string(),
            schema: json!({"type": "object"}),
            adapter: "markdown".to_string(),
            config: json!({}),
        })
        .await
        .map_err(|e| fail(&e))?;

        let tool_ctx = ctx.clone();
        let capture_tool = Tool::new(
            "capture",
            "Capture a note",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            move |input, _caller| {
                let ctx = tool_ctx.clone();
                async move {
                    match ctx.create_entity("note", input).await {
                        Ok(id) => ToolResponse::ok(json!({"id": id})),
                        Err(e) => ToolResponse::err(e.to_string()),
                    }
                }
            },
        );

        let command_ctx = ctx.clone();
        let note_command = Command::new("note", "Capture a note as a job", move |args, caller| {
            let ctx = command_ctx.clone();
            async move {
                let mut tool_context =
                    ToolContext::new(caller.interface_type.clone(), caller.user_id.clone());
                if let Some(channel) = caller.channel_id.clone() {
                    tool_context = tool_context.with_channel(channel);
                }
                match ctx
                    .enqueue(
                        "content_operations",
                        json!({"text": args.join(" ")}),
                        Some(&tool_context),
                    )
                    .await
                {
                    Ok(job_id) => CommandResponse::JobOperation {
                        message: "Capturing note".to_string(),
                        job_id,
                    },
                    Err(e) => CommandResponse::Message {
                        message: format!("Failed to queue: {e}"),
                    },
                }
            }
        })
        .with_usage("/note <text>");

        Ok(ctx
            .capabilities()
            .tool(capture_tool)
            .command(note_command)
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

async fn initialized_harness() -> TestShell {
    let harness = TestShell::new();
    harness
        .shell
        .register_plugin(Arc::new(NotesPlugin))
        .await
        .unwrap();
    harness.shell.initialize_plugins().await;
    harness
}

/// Polls until `check` passes or two seconds elapse.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─── Capability registration ─────────────────────────────────────────────────

#[tokio::test]
async fn plugin_capabilities_land_in_all_registries() {
    let harness = initialized_harness().await;

    // Tool names carry the plugin prefix all the way into MCP.
    assert_eq!(harness.mcp.tool_names("notes"), ["notes_capture"]);
    // Commands are registered bare.
    assert!(harness.shell.commands().contains("note"));
    // Routes are exposed under /api/{plugin}.
    let routes = harness.shell.routes().for_plugin("notes");
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].full_path, "/api/notes/capture");
    // Entity type reached the store.
    assert_eq!(harness.entities.type_names(), ["note"]);
    // Template and eval handler are scoped.
    assert!(harness.shell.templates().get("notes:note").is_some());
    assert_eq!(harness.shell.evals().handler_ids("notes"), ["search"]);
}

#[tokio::test]
async fn template_round_trips_through_the_registry() {
    let harness = initialized_harness().await;
    let data = json!({"title": "Groceries", "body": "milk, rye"});
    let text = harness.shell.templates().format("notes:note", &data).unwrap();
    assert_eq!(harness.shell.templates().parse("notes:note", &text).unwrap(), data);
}

#[tokio::test]
async fn eval_handlers_run_against_live_services() {
    let harness = initialized_harness().await;
    harness
        .entities
        .create("note", json!({"text": "rust borrow checker"}))
        .await
        .unwrap();

    let out = harness
        .shell
        .evals()
        .invoke("notes", "search", json!({"query": "borrow"}))
        .await
        .unwrap();
    assert_eq!(out.as_array().map(Vec::len), Some(1));
}

// ─── Tool execution over the bus bridge ──────────────────────────────────────

#[tokio::test]
async fn tool_execute_channel_dispatches_and_enforces_visibility() {
    let harness = initialized_harness().await;

    let payload = json!({
        "toolName": "notes_capture",
        "args": {"text": "remember this"},
        "interfaceType": "cli",
        "userId": "user-1"
    });

    let response = harness
        .shell
        .bus()
        .send(&system::tool_execute("notes"), payload.clone(), "test")
        .await;
    let Some(MessageResponse::Success { data: Some(data) }) = response else {
        panic!("expected a tool response");
    };
    let tool_response: ToolResponse = serde_json::from_value(data).unwrap();
    assert!(tool_response.success);
    assert_eq!(harness.entities.count("note"), 1);

    // Anchor-visibility tool, public caller: denied, nothing created.
    harness.permissions.set_level(PermissionLevel::Public);
    let response = harness
        .shell
        .bus()
        .send(&system::tool_execute("notes"), payload, "test")
        .await;
    let Some(MessageResponse::Success { data: Some(data) }) = response else {
        panic!("expected a tool response");
    };
    let tool_response: ToolResponse = serde_json::from_value(data).unwrap();
    assert!(!tool_response.success);
    assert_eq!(tool_response.error.as_deref(), Some("permission denied"));
    assert_eq!(harness.entities.count("note"), 1);
}

// ─── Message pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_reply_precedes_completion_notice() {
    let harness = initialized_harness().await;
    let shell = Arc::clone(&harness.shell);

    // The agent enqueues a fast job and announces it.
    harness.agent.set_handler(move |_text, ctx| {
        let shell = Arc::clone(&shell);
        async move {
            let service = ServiceContext::new(shell, "notes");
            let tool_context = ToolContext::new(ctx.interface_type.clone(), ctx.user_id.clone())
                .with_channel(ctx.channel_id.clone());
            let job_id = service
                .enqueue("content_operations", json!({}), Some(&tool_context))
                .await
                .map_err(|e| ServiceError::failed(e.to_string()))?;
            Ok(AgentResponse {
                text: format!("Queued {job_id}"),
                job_id: Some(job_id),
                batch_id: None,
            })
        }
    });

    let adapter = RecordingAdapter::new();
    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        adapter.clone(),
    );

    interface
        .handle_message(IncomingMessage::new("capture my idea", "chan-1", "user-1").direct())
        .await
        .unwrap();

    // The reply is always the first chat output.
    let sent = adapter.sent();
    assert!(sent[0].1.starts_with("Queued "));
    assert_eq!(sent[0].0, "chan-1");

    // The completion eventually lands in the same channel — as a buffered
    // or fresh send, or as an edit of the tracked reply.
    let completion_adapter = adapter.clone();
    eventually(move || {
        let sent_hit = completion_adapter
            .sent()
            .iter()
            .skip(1)
            .any(|(c, t)| c == "chan-1" && t.starts_with("✅ content_operations completed"));
        let edit_hit = completion_adapter
            .edits()
            .iter()
            .any(|(c, _, t)| c == "chan-1" && t.starts_with("✅ content_operations completed"));
        sent_hit || edit_hit
    })
    .await;
}

#[tokio::test]
async fn background_jobs_stay_silent_but_visible_to_the_ui() {
    let harness = initialized_harness().await;

    let adapter = RecordingAdapter::new();
    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        adapter.clone(),
    );
    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen_in = Arc::clone(&seen);
    interface.router().set_processing_callback(Arc::new(move |events| {
        seen_in.fetch_add(events.len(), std::sync::atomic::Ordering::SeqCst);
    }));

    let mut probe = ProgressProbe::attach(harness.shell.bus());
    let service = ServiceContext::new(Arc::clone(&harness.shell), "notes");
    let job_id = service
        .enqueue("content_operations", json!({}), None)
        .await
        .unwrap();
    probe.terminal_for(&job_id).await;

    assert!(seen.load(std::sync::atomic::Ordering::SeqCst) > 0);
    assert!(adapter.sent().is_empty());
    assert!(adapter.edits().is_empty());
}

#[tokio::test]
async fn slash_commands_route_through_the_registry() {
    let harness = initialized_harness().await;

    let adapter = RecordingAdapter::new();
    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        adapter.clone(),
    );

    interface
        .handle_message(IncomingMessage::new("/note buy rye bread", "chan-1", "user-1").direct())
        .await
        .unwrap();
    assert_eq!(adapter.sent()[0].1, "Capturing note");

    interface
        .handle_message(IncomingMessage::new("/help", "chan-1", "user-1").direct())
        .await
        .unwrap();
    // Completion notices for the /note job may interleave; find the reply.
    let texts = adapter.sent_texts();
    let help = texts
        .iter()
        .find(|t| t.starts_with("Available commands:"))
        .expect("help output");
    assert!(help.contains("/note — Capture a note as a job"));
    assert!(help.contains("usage: /note <text>"));

    interface
        .handle_message(IncomingMessage::new("/bogus", "chan-1", "user-1").direct())
        .await
        .unwrap();
    assert!(adapter.sent_texts().iter().any(|t| t.contains("'/bogus'")));
}

#[tokio::test]
async fn conversations_start_once_and_record_both_sides() {
    let harness = initialized_harness().await;
    let adapter = RecordingAdapter::new();
    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        adapter.clone(),
    );

    interface
        .handle_message(IncomingMessage::new("hello there", "chan-1", "user-1").direct())
        .await
        .unwrap();
    interface
        .handle_message(IncomingMessage::new("second message", "chan-1", "user-1").direct())
        .await
        .unwrap();

    assert_eq!(harness.conversations.conversation_count(), 1);
    let messages = harness.conversations.all_messages();
    // user, assistant, user, assistant
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].metadata["directed"], json!(true));
    assert_eq!(messages[1].content, "echo: hello there");

    // Undirected channel chatter is stored but unanswered.
    interface
        .handle_message(IncomingMessage::new("random chatter", "chan-1", "user-1"))
        .await
        .unwrap();
    let messages = harness.conversations.all_messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[4].metadata["directed"], json!(false));
}

#[tokio::test]
async fn confirmation_flow_runs_the_stored_tool_on_yes() {
    let harness = initialized_harness().await;
    let adapter = RecordingAdapter::new();
    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        adapter.clone(),
    );

    // First turn creates the conversation.
    interface
        .handle_message(IncomingMessage::new("capture something?", "chan-1", "user-1").direct())
        .await
        .unwrap();
    let conversation = harness
        .conversations
        .find("cli", "chan-1")
        .await
        .unwrap()
        .unwrap();

    interface.request_confirmation(
        &conversation.id,
        PendingConfirmation {
            plugin_id: "notes".to_string(),
            tool_name: "notes_capture".to_string(),
            description: "capture the note".to_string(),
            args: json!({"text": "confirmed note"}),
        },
    );

    interface
        .handle_message(IncomingMessage::new("  YES ", "chan-1", "user-1").direct())
        .await
        .unwrap();
    assert!(adapter.sent().last().unwrap().1.starts_with("Done:"));
    assert_eq!(harness.entities.count("note"), 1);

    // A declined confirmation runs nothing.
    interface.request_confirmation(
        &conversation.id,
        PendingConfirmation {
            plugin_id: "notes".to_string(),
            tool_name: "notes_capture".to_string(),
            description: "capture again".to_string(),
            args: json!({"text": "second"}),
        },
    );
    interface
        .handle_message(IncomingMessage::new("nope", "chan-1", "user-1").direct())
        .await
        .unwrap();
    assert!(adapter.sent().last().unwrap().1.starts_with("Cancelled:"));
    assert_eq!(harness.entities.count("note"), 1);

    // An unrecognized reply clears the pending entry and goes to the agent.
    interface.request_confirmation(
        &conversation.id,
        PendingConfirmation {
            plugin_id: "notes".to_string(),
            tool_name: "notes_capture".to_string(),
            description: "third".to_string(),
            args: json!({"text": "third"}),
        },
    );
    interface
        .handle_message(IncomingMessage::new("1. yes", "chan-1", "user-1").direct())
        .await
        .unwrap();
    assert_eq!(adapter.sent().last().unwrap().1, "echo: 1. yes");
    assert_eq!(harness.entities.count("note"), 1);
}

// ─── Interface filtering across two live interfaces ──────────────────────────

#[tokio::test]
async fn progress_events_reach_only_the_named_interface() {
    let harness = initialized_harness().await;

    let cli_adapter = RecordingAdapter::new();
    let web_adapter = RecordingAdapter::new();
    let cli = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "cli"),
        cli_adapter.clone(),
    );
    let web = MessageInterface::new(
        InterfaceContext::new(Arc::clone(&harness.shell), "web"),
        web_adapter.clone(),
    );

    // A job routed to the cli interface.
    let service = ServiceContext::new(Arc::clone(&harness.shell), "notes");
    let tool_context = ToolContext::new("cli", "user-1").with_channel("chan-1");
    let mut probe = ProgressProbe::attach(harness.shell.bus());
    let job_id = service
        .enqueue("content_operations", json!({}), Some(&tool_context))
        .await
        .unwrap();
    probe.terminal_for(&job_id).await;

    eventually(|| !cli_adapter.sent().is_empty()).await;
    assert!(web_adapter.sent().is_empty());
    assert!(web.router().events().is_empty());
    assert!(!cli.router().events().is_empty() || !cli_adapter.sent().is_empty());
}
