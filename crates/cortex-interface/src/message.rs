//! Message-based interface base: the shared input pipeline for chat-like
//! front-ends (terminal, chat bridges, web chat).
//!
//! The pipeline per inbound message:
//!
//! 1. Normalize the partial context (ids, timestamp, permission level).
//! 2. Ensure a conversation exists for the channel (started once).
//! 3. Store the user message with `{directed}` metadata.
//! 4. Decide whether to respond (direct message or mention by default).
//! 5. Thinking indicator + `start_processing_input`.
//! 6. Route: pending confirmation → stored tool; `/cmd` → command registry
//!    (with `/help` enumerating commands); anything else → agent.
//! 7. Send the reply; track any job/batch the reply announced.
//! 8. Store the assistant message, done indicator, `end_processing_input`
//!    (which flushes buffered completions).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use cortex_core::{
    CommandContext, CommandResponse, MessageContext, MessageResponse, MessageRole, ToolResponse,
    system,
};
use cortex_host::InterfaceContext;

use crate::confirmation::{PendingConfirmation, parse_confirmation_response};
use crate::error::InterfaceError;
use crate::progress::{InterfaceAdapter, ProgressRouter};

/// A partially filled inbound message as the platform saw it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    /// Platform message id; generated when absent.
    pub message_id: Option<String>,
    pub timestamp: Option<chrono::DateTime<Utc>>,
    /// Direct messages are always answered.
    pub is_direct: bool,
}

impl IncomingMessage {
    pub fn new(
        text: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            message_id: None,
            timestamp: None,
            is_direct: false,
        }
    }

    pub fn direct(mut self) -> Self {
        self.is_direct = true;
        self
    }
}

/// Default respond rule: direct message, or a mention of any name in
/// `mention_names` (`@name` or the bare name, case-insensitive).
pub fn default_should_respond(message: &IncomingMessage, mention_names: &[String]) -> bool {
    if message.is_direct {
        return true;
    }
    let text = message.text.to_lowercase();
    mention_names.iter().any(|name| {
        let name = name.to_lowercase();
        text.contains(&format!("@{name}")) || text.contains(&name)
    })
}

/// Shared base for message-driven interfaces.
///
/// Concrete interfaces construct one with their [`InterfaceAdapter`] and
/// feed every inbound platform message into
/// [`handle_message`](Self::handle_message).
pub struct MessageInterface {
    context: InterfaceContext,
    adapter: Arc<dyn InterfaceAdapter>,
    router: Arc<ProgressRouter>,
    /// channel id → conversation id, so each channel starts once.
    conversations: Mutex<HashMap<String, String>>,
    /// conversation id → pending confirmation (at most one each).
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl MessageInterface {
    /// Builds the base and subscribes its progress router to `job-progress`.
    pub fn new(context: InterfaceContext, adapter: Arc<dyn InterfaceAdapter>) -> Arc<Self> {
        let router = ProgressRouter::new(context.plugin_id(), Arc::clone(&adapter));
        context.subscribe(system::JOB_PROGRESS, router.subscription_handler());
        Arc::new(Self {
            context,
            adapter,
            router,
            conversations: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn router(&self) -> &Arc<ProgressRouter> {
        &self.router
    }

    pub fn context(&self) -> &InterfaceContext {
        &self.context
    }

    /// Stores a confirmation request for the conversation, replacing any
    /// previous one.
    pub fn request_confirmation(&self, conversation_id: &str, pending: PendingConfirmation) {
        self.pending
            .lock()
            .insert(conversation_id.to_string(), pending);
    }

    /// Runs the full input pipeline for one inbound message.
    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<(), InterfaceError> {
        // 1. Normalize.
        let permission_level = self.context.permission_level(&incoming.user_id).await;
        let message_context = MessageContext {
            interface_type: self.context.plugin_id().to_string(),
            user_id: incoming.user_id.clone(),
            channel_id: incoming.channel_id.clone(),
            message_id: incoming
                .message_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: incoming.timestamp.unwrap_or_else(Utc::now),
            permission_level,
            is_direct: incoming.is_direct,
        };

        // 2. Conversation, started once per channel.
        let conversation_id = self.ensure_conversation(&incoming.channel_id).await?;

        // 3. Store the user message with the directed flag.
        let identity = self.context.identity();
        let mention_names = vec![identity.name.clone(), self.context.plugin_id().to_string()];
        let directed = self.adapter.should_respond(&incoming, &mention_names);
        self.context
            .add_message(
                &conversation_id,
                MessageRole::User,
                &incoming.text,
                json!({ "directed": directed }),
            )
            .await?;

        // 4. Not addressed to us: stop.
        if !directed {
            return Ok(());
        }

        // 5. Indicators and completion buffering.
        self.adapter.show_thinking(&incoming.channel_id).await;
        self.router
            .start_processing_input(Some(incoming.channel_id.clone()));

        // 6. Route. Confirmation replies win over everything else.
        let outcome = match self.take_confirmation_reply(&conversation_id, &incoming.text) {
            Some(pending_reply) => pending_reply.run(self).await,
            None => self.route(&incoming, &message_context).await,
        };

        // 7. Send the reply and track announced work.
        let message_id = self
            .adapter
            .send_message(&incoming.channel_id, &outcome.text)
            .await?;
        if let Some(tracked_id) = &outcome.tracked_id {
            self.router.track_job(tracked_id.clone(), outcome.info.clone());
            self.router
                .track_agent_response(tracked_id.clone(), message_id, &incoming.channel_id);
        }

        // 8. Store the reply, close out indicators, flush buffered
        // completions.
        self.context
            .add_message(
                &conversation_id,
                MessageRole::Assistant,
                &outcome.text,
                json!({}),
            )
            .await?;
        self.adapter.show_done(&incoming.channel_id).await;
        self.router.end_processing_input().await;
        Ok(())
    }

    async fn ensure_conversation(&self, channel_id: &str) -> Result<String, InterfaceError> {
        if let Some(id) = self.conversations.lock().get(channel_id) {
            return Ok(id.clone());
        }
        let conversation = self.context.start_conversation(channel_id).await?;
        self.conversations
            .lock()
            .insert(channel_id.to_string(), conversation.id.clone());
        Ok(conversation.id)
    }

    /// Pops the pending confirmation when the reply parses as yes/no.
    /// An unrecognized reply clears the pending entry and falls through to
    /// normal handling.
    fn take_confirmation_reply(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Option<ConfirmationOutcome> {
        let mut pending_map = self.pending.lock();
        let pending = pending_map.get(conversation_id)?;
        match parse_confirmation_response(text) {
            Some(reply) => {
                let pending = pending.clone();
                pending_map.remove(conversation_id);
                Some(ConfirmationOutcome {
                    pending,
                    confirmed: reply.confirmed,
                })
            }
            None => {
                pending_map.remove(conversation_id);
                None
            }
        }
    }

    async fn route(
        &self,
        incoming: &IncomingMessage,
        message_context: &MessageContext,
    ) -> RouteOutcome {
        let text = incoming.text.trim();
        if let Some(rest) = text.strip_prefix('/') {
            self.run_command(rest, message_context).await
        } else {
            self.run_agent(text, message_context).await
        }
    }

    async fn run_command(&self, input: &str, ctx: &MessageContext) -> RouteOutcome {
        let mut parts = input.split_whitespace();
        let Some(name) = parts.next() else {
            return RouteOutcome::text("Empty command.");
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        if name == "help" {
            return RouteOutcome::text(self.help_text());
        }

        let command_context = CommandContext {
            interface_type: ctx.interface_type.clone(),
            user_id: ctx.user_id.clone(),
            channel_id: Some(ctx.channel_id.clone()),
            user_level: ctx.permission_level,
        };
        match self
            .context
            .commands()
            .execute(name, args, command_context)
            .await
        {
            Ok(CommandResponse::Message { message }) => RouteOutcome::text(message),
            Ok(CommandResponse::JobOperation { message, job_id }) => RouteOutcome {
                text: message,
                tracked_id: Some(job_id.clone()),
                info: json!({ "kind": "job", "jobId": job_id }),
            },
            Ok(CommandResponse::BatchOperation {
                message,
                batch_id,
                operation_count,
            }) => RouteOutcome {
                text: message,
                tracked_id: Some(batch_id.clone()),
                info: json!({
                    "kind": "batch",
                    "batchId": batch_id,
                    "operationCount": operation_count
                }),
            },
            Err(e) => {
                debug!(command = %name, error = %e, "Command failed");
                RouteOutcome::text(format!("Unknown or failing command '/{name}'. Try /help."))
            }
        }
    }

    async fn run_agent(&self, text: &str, ctx: &MessageContext) -> RouteOutcome {
        match self.context.agent().handle(text, ctx).await {
            Ok(response) => {
                let tracked_id = response.job_id.clone().or(response.batch_id.clone());
                let info = json!({
                    "jobId": response.job_id,
                    "batchId": response.batch_id,
                });
                RouteOutcome {
                    text: response.text,
                    tracked_id,
                    info,
                }
            }
            Err(e) => {
                warn!(error = %e, "Agent query failed");
                RouteOutcome::text("Something went wrong answering that.")
            }
        }
    }

    fn help_text(&self) -> String {
        let commands = self.context.commands().list();
        if commands.is_empty() {
            return "No commands registered.".to_string();
        }
        let mut lines = vec!["Available commands:".to_string()];
        for (_plugin, info) in commands {
            let mut line = format!("/{} — {}", info.name, info.description);
            if let Some(usage) = info.usage {
                line.push_str(&format!(" (usage: {usage})"));
            }
            lines.push(line);
        }
        lines.push("/help — list commands".to_string());
        lines.join("\n")
    }
}

/// What routing produced: reply text plus an optionally tracked job/batch.
struct RouteOutcome {
    text: String,
    tracked_id: Option<String>,
    info: Value,
}

impl RouteOutcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tracked_id: None,
            info: Value::Null,
        }
    }
}

/// A parsed yes/no reply bound to its stored confirmation.
struct ConfirmationOutcome {
    pending: PendingConfirmation,
    confirmed: bool,
}

impl ConfirmationOutcome {
    async fn run(self, interface: &MessageInterface) -> RouteOutcome {
        if !self.confirmed {
            return RouteOutcome::text(format!("Cancelled: {}", self.pending.description));
        }

        let payload = json!({
            "toolName": self.pending.tool_name,
            "args": self.pending.args,
            "interfaceType": interface.context.plugin_id(),
            "userId": "confirmation",
        });
        let channel = system::tool_execute(&self.pending.plugin_id);
        match interface.context.send(&channel, payload).await {
            Some(MessageResponse::Success { data }) => {
                let response: Option<ToolResponse> =
                    data.and_then(|d| serde_json::from_value(d).ok());
                match response {
                    Some(r) if r.success => RouteOutcome::text(format!(
                        "Done: {}",
                        self.pending.description
                    )),
                    Some(r) => RouteOutcome::text(format!(
                        "Failed: {}",
                        r.error.unwrap_or_else(|| "unknown error".to_string())
                    )),
                    None => RouteOutcome::text("Done."),
                }
            }
            Some(MessageResponse::Error { message }) => {
                RouteOutcome::text(format!("Failed: {message}"))
            }
            None => RouteOutcome::text("No handler answered the confirmation."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["cortex".to_string(), "cli".to_string()]
    }

    #[test]
    fn direct_messages_are_always_answered() {
        let msg = IncomingMessage::new("anything at all", "c", "u").direct();
        assert!(default_should_respond(&msg, &names()));
    }

    #[test]
    fn mentions_are_answered_case_insensitively() {
        let msg = IncomingMessage::new("hey @Cortex, summarize today", "c", "u");
        assert!(default_should_respond(&msg, &names()));

        let msg = IncomingMessage::new("ask CORTEX about it", "c", "u");
        assert!(default_should_respond(&msg, &names()));
    }

    #[test]
    fn unaddressed_channel_chatter_is_ignored() {
        let msg = IncomingMessage::new("lunch anyone?", "c", "u");
        assert!(!default_should_respond(&msg, &names()));
    }
}
