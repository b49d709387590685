//! Terminal assistant: the notes plugin plus a stdin-driven interface,
//! wired through the full runtime with in-memory collaborator services.
//!
//! ```text
//! $ cargo run -p cortex-assistant
//! > /note try the new espresso place
//! cortex> Capturing "try the new espresso place"
//! cortex> ✅ capture completed (try the new espresso place)
//! > /quit
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use cortex::cortex_core::{
    AgentResponse, AgentService, AiService, MessageContext, PermissionLevel, QueryOptions,
    ServiceError,
};
use cortex::cortex_host::InterfaceContext;
use cortex::cortex_interface::InterfaceError;
use cortex::prelude::*;
use cortex_harness::{
    EchoAi, FixedPermissions, MemoryConversationStore, MemoryEntityService, PassthroughContent,
    RecordingMcp,
};
use cortex_plugin_notes::NotesPlugin;

/// Prints replies to stdout; message ids are line counters.
struct TerminalAdapter {
    counter: AtomicUsize,
}

#[async_trait]
impl InterfaceAdapter for TerminalAdapter {
    async fn send_message(&self, _channel_id: &str, text: &str) -> Result<String, InterfaceError> {
        println!("cortex> {text}");
        Ok(format!("line-{}", self.counter.fetch_add(1, Ordering::Relaxed)))
    }

    async fn edit_message(
        &self,
        _channel_id: &str,
        _message_id: &str,
        text: &str,
    ) -> Result<(), InterfaceError> {
        println!("cortex (update)> {text}");
        Ok(())
    }
}

/// Minimal agent loop: forwards the message to the model client.
struct ModelAgent {
    ai: Arc<dyn AiService>,
}

#[async_trait]
impl AgentService for ModelAgent {
    async fn handle(
        &self,
        text: &str,
        _context: &MessageContext,
    ) -> Result<AgentResponse, ServiceError> {
        let reply = self.ai.query(text, &QueryOptions::default()).await?;
        Ok(AgentResponse {
            text: reply.text,
            job_id: None,
            batch_id: None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config().unwrap_or_else(|e| {
        eprintln!("cortex-assistant: falling back to default config: {e}");
        CortexConfig::default()
    });

    let ai: Arc<dyn AiService> = Arc::new(EchoAi);
    let runtime = CortexRuntime::builder(config)
        .ai(Arc::clone(&ai))
        .entities(Arc::new(MemoryEntityService::new()))
        .content(Arc::new(PassthroughContent))
        .conversations(Arc::new(MemoryConversationStore::new()))
        .permissions(Arc::new(FixedPermissions::new(PermissionLevel::Anchor)))
        .mcp(Arc::new(RecordingMcp::new()))
        .agent(Arc::new(ModelAgent { ai }))
        .plugin(Arc::new(NotesPlugin))
        .build()?;

    runtime.initialize().await?;

    let interface = MessageInterface::new(
        InterfaceContext::new(Arc::clone(runtime.shell()), "terminal"),
        Arc::new(TerminalAdapter {
            counter: AtomicUsize::new(0),
        }),
    );

    println!("cortex assistant — /help for commands, /quit to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = interface
            .handle_message(IncomingMessage::new(line, "terminal", "local-user").direct())
            .await
        {
            eprintln!("cortex-assistant: {e}");
        }
    }

    runtime.shell().shutdown().await;
    Ok(())
}
