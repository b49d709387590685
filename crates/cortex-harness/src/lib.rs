//! # cortex-harness
//!
//! Test harness for Cortex plugins: a fully in-memory shell with scriptable
//! collaborator services, a recording interface adapter, and a progress
//! probe for asserting on the `job-progress` stream.
//!
//! ```rust,ignore
//! let harness = TestShell::new();
//! harness.shell.register_plugin(Arc::new(MyPlugin)).await?;
//! harness.shell.initialize_plugins().await;
//! assert!(harness.mcp.tool_names("my-plugin").contains(&"my-plugin_search".to_string()));
//! ```

pub mod probe;
pub mod services;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use cortex_core::{
    AgentService, AiService, AppInfo, ConversationStore, EntityService, IdentityInfo,
    McpService, PermissionLevel, PermissionService,
};
use cortex_host::Shell;
use cortex_interface::{InterfaceAdapter, InterfaceError};

pub use probe::ProgressProbe;
pub use services::{
    EchoAi, FixedPermissions, MemoryConversationStore, MemoryEntityService,
    PassthroughContent, RecordingMcp, ScriptedAgent,
};

/// An in-memory shell plus handles to all its mock collaborators.
pub struct TestShell {
    pub shell: Arc<Shell>,
    pub ai: Arc<EchoAi>,
    pub entities: Arc<MemoryEntityService>,
    pub conversations: Arc<MemoryConversationStore>,
    pub permissions: Arc<FixedPermissions>,
    pub mcp: Arc<RecordingMcp>,
    pub agent: Arc<ScriptedAgent>,
}

impl TestShell {
    /// Builds a shell with every collaborator mocked, callers at `Anchor`.
    pub fn new() -> Self {
        Self::with_permission_level(PermissionLevel::Anchor)
    }

    /// Builds a shell whose permission service answers `level` for everyone.
    pub fn with_permission_level(level: PermissionLevel) -> Self {
        let ai = Arc::new(EchoAi);
        let entities = Arc::new(MemoryEntityService::new());
        let conversations = Arc::new(MemoryConversationStore::new());
        let permissions = Arc::new(FixedPermissions::new(level));
        let mcp = Arc::new(RecordingMcp::new());
        let agent = Arc::new(ScriptedAgent::new());

        let shell = Shell::builder()
            .ai(Arc::clone(&ai) as Arc<dyn AiService>)
            .entities(Arc::clone(&entities) as Arc<dyn EntityService>)
            .content(Arc::new(PassthroughContent))
            .conversations(Arc::clone(&conversations) as Arc<dyn ConversationStore>)
            .permissions(Arc::clone(&permissions) as Arc<dyn PermissionService>)
            .mcp(Arc::clone(&mcp) as Arc<dyn McpService>)
            .agent(Arc::clone(&agent) as Arc<dyn AgentService>)
            .identity(IdentityInfo {
                name: "cortex".to_string(),
                role: "test assistant".to_string(),
                description: None,
            })
            .app_info(AppInfo {
                name: "cortex-harness".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .build()
            .expect("test shell assembles");

        Self {
            shell,
            ai,
            entities,
            conversations,
            permissions,
            mcp,
            agent,
        }
    }
}

impl Default for TestShell {
    fn default() -> Self {
        Self::new()
    }
}

/// Interface adapter that records every send and edit.
///
/// Sends are answered with synthetic message ids `m0`, `m1`, ...
pub struct RecordingAdapter {
    editing: bool,
    sent: Mutex<Vec<(String, String)>>,
    edits: Mutex<Vec<(String, String, String)>>,
}

impl RecordingAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            editing: true,
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        })
    }

    /// An adapter for platforms without message editing.
    pub fn without_editing() -> Arc<Self> {
        Arc::new(Self {
            editing: false,
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        })
    }

    /// `(channel_id, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// `(channel_id, message_id, text)` triples in edit order.
    pub fn edits(&self) -> Vec<(String, String, String)> {
        self.edits.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl InterfaceAdapter for RecordingAdapter {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<String, InterfaceError> {
        let mut sent = self.sent.lock();
        let id = format!("m{}", sent.len());
        sent.push((channel_id.to_string(), text.to_string()));
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), InterfaceError> {
        self.edits.lock().push((
            channel_id.to_string(),
            message_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }

    fn supports_editing(&self) -> bool {
        self.editing
    }
}
