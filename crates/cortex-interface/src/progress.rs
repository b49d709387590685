//! Progress routing and completion ordering for one user-facing interface.
//!
//! The router subscribes to `job-progress` and applies the shared policy:
//!
//! 1. Ignore events addressed to another interface.
//! 2. Mirror the event into an id-keyed state map and notify the UI callback
//!    with the non-terminal subset.
//! 3. A null `channel_id` marks a background job — no chat output, ever.
//! 4. Processing events coalesce into an editable tracked message, at most
//!    one edit per 500 ms.
//! 5. Completion events edit the tracked message when one exists, otherwise
//!    send fresh — unless user input is being processed, in which case they
//!    are buffered so the agent's reply lands first.
//! 6. 500 ms after a terminal status the event leaves the state map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use cortex_core::{MessageBus, MessageHandler, Subscription, system};
use cortex_jobs::{JobStatus, ProgressEvent};

use crate::error::InterfaceError;
use crate::tracking::JobTracking;

/// Minimum spacing between edits of one tracked progress message.
pub const PROGRESS_EDIT_INTERVAL: Duration = Duration::from_millis(500);

/// Delay before a terminal event is dropped from the state map.
pub const TERMINAL_CLEANUP_DELAY: Duration = Duration::from_millis(500);

/// Platform adapter implemented by each concrete interface (CLI, chat
/// bridge, web). The router drives it; subclass-specific behavior hangs off
/// the default methods.
#[async_trait]
pub trait InterfaceAdapter: Send + Sync {
    /// Sends a message and returns its platform message id.
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<String, InterfaceError>;

    /// Edits a previously sent message in place.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), InterfaceError>;

    /// Platforms without message editing return `false`; progress then stays
    /// silent and completions always arrive as fresh messages.
    fn supports_editing(&self) -> bool {
        true
    }

    /// Typing indicator hook; no-op by default.
    async fn show_thinking(&self, _channel_id: &str) {}

    /// Done indicator hook; no-op by default.
    async fn show_done(&self, _channel_id: &str) {}

    /// Whether an inbound message deserves a reply. The default answers
    /// direct messages and mentions of any of `mention_names`.
    fn should_respond(&self, message: &crate::message::IncomingMessage, mention_names: &[String]) -> bool {
        crate::message::default_should_respond(message, mention_names)
    }
}

/// Callback notified with the current non-terminal events.
pub type ProcessingCallback = Arc<dyn Fn(Vec<ProgressEvent>) + Send + Sync>;

#[derive(Debug, Clone)]
struct TrackedMessage {
    message_id: String,
    channel_id: String,
    last_update: Instant,
}

#[derive(Debug, Clone)]
struct BufferedCompletion {
    channel_id: String,
    text: String,
}

#[derive(Debug, Default)]
struct InputState {
    processing: bool,
    active_channel: Option<String>,
    buffered: Vec<BufferedCompletion>,
}

/// What a progress event should do to the chat, decided under lock and
/// executed outside it.
enum ChatAction {
    Nothing,
    Edit {
        channel_id: String,
        message_id: String,
        text: String,
    },
    SendProgress {
        channel_id: String,
        text: String,
        root_job_id: String,
    },
    SendCompletion {
        channel_id: String,
        text: String,
    },
}

/// Per-interface progress router.
pub struct ProgressRouter {
    interface_type: String,
    adapter: Arc<dyn InterfaceAdapter>,
    events: Mutex<HashMap<String, ProgressEvent>>,
    callback: Mutex<Option<ProcessingCallback>>,
    /// Tracked progress messages, keyed by root job id.
    progress_messages: Mutex<HashMap<String, TrackedMessage>>,
    /// Tracked agent responses, keyed by job or batch id.
    agent_messages: Mutex<HashMap<String, TrackedMessage>>,
    tracking: JobTracking,
    input: Mutex<InputState>,
}

impl ProgressRouter {
    pub fn new(interface_type: impl Into<String>, adapter: Arc<dyn InterfaceAdapter>) -> Arc<Self> {
        Arc::new(Self {
            interface_type: interface_type.into(),
            adapter,
            events: Mutex::new(HashMap::new()),
            callback: Mutex::new(None),
            progress_messages: Mutex::new(HashMap::new()),
            agent_messages: Mutex::new(HashMap::new()),
            tracking: JobTracking::new(),
            input: Mutex::new(InputState::default()),
        })
    }

    /// Subscribes this router to `job-progress` on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &MessageBus) -> Subscription {
        bus.subscribe(system::JOB_PROGRESS, self.subscription_handler())
    }

    /// The bus handler this router runs behind; exposed so callers that only
    /// hold a context (not the bus) can subscribe it themselves.
    pub fn subscription_handler(self: &Arc<Self>) -> MessageHandler {
        let router = Arc::clone(self);
        Arc::new(move |msg| {
            let router = Arc::clone(&router);
            Box::pin(async move {
                match serde_json::from_value::<ProgressEvent>(msg.payload) {
                    Ok(event) => router.handle_progress_event(event).await,
                    Err(e) => {
                        warn!(error = %e, "Malformed progress event");
                    }
                }
                None
            })
        })
    }

    pub fn interface_type(&self) -> &str {
        &self.interface_type
    }

    /// Registers the UI callback fired on every state change.
    pub fn set_processing_callback(&self, callback: ProcessingCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Job-ownership map (direct and inherited through `root_job_id`).
    pub fn tracking(&self) -> &JobTracking {
        &self.tracking
    }

    /// Records a job or batch started on behalf of a user.
    pub fn track_job(&self, id: impl Into<String>, info: Value) {
        self.tracking.track(id, info);
    }

    /// Records the agent reply message that announced `job_or_batch_id`, so
    /// later progress and completion can edit it in place.
    pub fn track_agent_response(
        &self,
        job_or_batch_id: impl Into<String>,
        message_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) {
        self.agent_messages.lock().insert(
            job_or_batch_id.into(),
            TrackedMessage {
                message_id: message_id.into(),
                channel_id: channel_id.into(),
                last_update: Instant::now(),
            },
        );
    }

    /// `true` when this interface owns the job directly or via its root.
    pub fn owns_job(&self, job_id: &str, root_job_id: Option<&str>) -> bool {
        self.tracking.owns_job(job_id, root_job_id)
    }

    /// Snapshot of the event state map.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().values().cloned().collect()
    }

    // ─── Input-processing lifecycle ──────────────────────────────────────────

    /// Marks the start of user-input processing. Completions arriving until
    /// [`end_processing_input`](Self::end_processing_input) are buffered so
    /// the agent's reply is delivered first.
    pub fn start_processing_input(&self, channel_id: Option<String>) {
        let mut input = self.input.lock();
        input.processing = true;
        input.active_channel = channel_id;
    }

    /// Clears the input flag and flushes buffered completions in insertion
    /// order, each to its recorded channel.
    pub async fn end_processing_input(&self) {
        let buffered = {
            let mut input = self.input.lock();
            input.processing = false;
            input.active_channel = None;
            std::mem::take(&mut input.buffered)
        };
        for completion in buffered {
            if let Err(e) = self
                .adapter
                .send_message(&completion.channel_id, &completion.text)
                .await
            {
                warn!(channel = %completion.channel_id, error = %e, "Buffered completion lost");
            }
        }
    }

    pub fn is_processing_input(&self) -> bool {
        self.input.lock().processing
    }

    /// Channel the in-flight user input arrived on, if any.
    pub fn active_input_channel(&self) -> Option<String> {
        self.input.lock().active_channel.clone()
    }

    // ─── Event handling ──────────────────────────────────────────────────────

    /// Applies the routing policy to one event.
    pub async fn handle_progress_event(self: &Arc<Self>, event: ProgressEvent) {
        // 1. Interface filter.
        if let Some(target) = &event.metadata.interface_type
            && target != &self.interface_type
        {
            return;
        }

        // 2. State map + UI callback.
        self.events.lock().insert(event.id.clone(), event.clone());
        self.notify();

        let action = self.decide(&event);
        self.perform(action).await;

        // 6. Drop terminal events from the state map after a grace period.
        if event.status.is_terminal() {
            let router = Arc::clone(self);
            let id = event.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(TERMINAL_CLEANUP_DELAY).await;
                router.events.lock().remove(&id);
                router.notify();
            });
        }
    }

    fn decide(&self, event: &ProgressEvent) -> ChatAction {
        // 3. Null channel = background job: state is recorded above, but no
        // chat output is permitted.
        let channel_id = event.metadata.channel_id.clone();
        let editing = self.adapter.supports_editing();

        if !event.status.is_terminal() {
            if !editing {
                return ChatAction::Nothing;
            }
            let text = format_progress(event);
            let root = &event.metadata.root_job_id;

            // 4. Prefer the tracked progress message, then the agent reply.
            {
                let mut progress = self.progress_messages.lock();
                if let Some(tracked) = progress.get_mut(root) {
                    return rate_limited_edit(tracked, text);
                }
            }
            {
                let mut agents = self.agent_messages.lock();
                if let Some(tracked) = agents.get_mut(&event.id) {
                    return rate_limited_edit(tracked, text);
                }
            }

            if !self.is_processing_input()
                && let Some(channel_id) = channel_id
            {
                return ChatAction::SendProgress {
                    channel_id,
                    text,
                    root_job_id: root.clone(),
                };
            }
            return ChatAction::Nothing;
        }

        // 5. Completion / failure.
        let text = format_completion(event);
        if editing {
            let tracked = {
                let mut agents = self.agent_messages.lock();
                agents.remove(&event.id)
            }
            .or_else(|| {
                let mut progress = self.progress_messages.lock();
                progress.remove(&event.metadata.root_job_id)
            });
            if let Some(tracked) = tracked {
                return ChatAction::Edit {
                    channel_id: tracked.channel_id,
                    message_id: tracked.message_id,
                    text,
                };
            }
        }

        let Some(channel_id) = channel_id else {
            return ChatAction::Nothing;
        };
        {
            let mut input = self.input.lock();
            if input.processing {
                input.buffered.push(BufferedCompletion {
                    channel_id,
                    text,
                });
                return ChatAction::Nothing;
            }
        }
        ChatAction::SendCompletion { channel_id, text }
    }

    async fn perform(&self, action: ChatAction) {
        match action {
            ChatAction::Nothing => {}
            ChatAction::Edit {
                channel_id,
                message_id,
                text,
            } => {
                if let Err(e) = self
                    .adapter
                    .edit_message(&channel_id, &message_id, &text)
                    .await
                {
                    debug!(channel = %channel_id, error = %e, "Progress edit failed");
                }
            }
            ChatAction::SendProgress {
                channel_id,
                text,
                root_job_id,
            } => match self.adapter.send_message(&channel_id, &text).await {
                Ok(message_id) => {
                    self.progress_messages.lock().insert(
                        root_job_id,
                        TrackedMessage {
                            message_id,
                            channel_id,
                            last_update: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    debug!(channel = %channel_id, error = %e, "Progress message failed");
                }
            },
            ChatAction::SendCompletion { channel_id, text } => {
                if let Err(e) = self.adapter.send_message(&channel_id, &text).await {
                    warn!(channel = %channel_id, error = %e, "Completion message failed");
                }
            }
        }
    }

    fn notify(&self) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            let processing: Vec<ProgressEvent> = self
                .events
                .lock()
                .values()
                .filter(|e| !e.status.is_terminal())
                .cloned()
                .collect();
            callback(processing);
        }
    }
}

/// Edits the tracked message unless the last edit was under 500 ms ago.
fn rate_limited_edit(tracked: &mut TrackedMessage, text: String) -> ChatAction {
    let now = Instant::now();
    if now.duration_since(tracked.last_update) < PROGRESS_EDIT_INTERVAL {
        return ChatAction::Nothing;
    }
    tracked.last_update = now;
    ChatAction::Edit {
        channel_id: tracked.channel_id.clone(),
        message_id: tracked.message_id.clone(),
        text,
    }
}

/// `⏳ index: 3/10 (30%) — message`
fn format_progress(event: &ProgressEvent) -> String {
    let mut text = format!("⏳ {}", event.metadata.operation_type);
    if let Some(progress) = &event.progress {
        text.push_str(&format!(
            ": {}/{} ({:.0}%)",
            progress.current, progress.total, progress.percentage
        ));
    }
    if let Some(message) = &event.message {
        text.push_str(&format!(" — {message}"));
    }
    text
}

/// `✅ index completed (target): detail` / `❌ index failed: reason`
fn format_completion(event: &ProgressEvent) -> String {
    let (emoji, verb) = match event.status {
        JobStatus::Failed => ("❌", "failed"),
        _ => ("✅", "completed"),
    };
    let mut text = format!("{emoji} {} {verb}", event.metadata.operation_type);
    if let Some(target) = &event.metadata.operation_target {
        text.push_str(&format!(" ({target})"));
    }
    if let Some(detail) = &event.message {
        text.push_str(&format!(": {detail}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_jobs::{ProgressData, ProgressMetadata};
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    /// Records every send/edit; sends get ids `m0`, `m1`, ...
    struct RecordingAdapter {
        editing: bool,
        sent: PlMutex<Vec<(String, String)>>,
        edits: PlMutex<Vec<(String, String, String)>>,
    }

    impl RecordingAdapter {
        fn new(editing: bool) -> Arc<Self> {
            Arc::new(Self {
                editing,
                sent: PlMutex::new(Vec::new()),
                edits: PlMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InterfaceAdapter for RecordingAdapter {
        async fn send_message(
            &self,
            channel_id: &str,
            text: &str,
        ) -> Result<String, InterfaceError> {
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

    fn event(
        id: &str,
        status: JobStatus,
        interface: Option<&str>,
        channel: Option<&str>,
    ) -> ProgressEvent {
        ProgressEvent {
            id: id.to_string(),
            event_type: "notes:index".to_string(),
            status,
            message: None,
            progress: Some(ProgressData::new(1, 10)),
            metadata: ProgressMetadata {
                operation_type: "index".to_string(),
                root_job_id: id.to_string(),
                plugin_id: "notes".to_string(),
                interface_type: interface.map(str::to_string),
                channel_id: channel.map(str::to_string),
                operation_target: None,
            },
        }
    }

    #[tokio::test]
    async fn events_for_other_interfaces_are_ignored() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);

        router
            .handle_progress_event(event("j1", JobStatus::Processing, Some("web"), Some("c")))
            .await;
        assert!(router.events().is_empty());
        assert!(adapter.sent.lock().is_empty());

        router
            .handle_progress_event(event("j2", JobStatus::Processing, Some("cli"), Some("c")))
            .await;
        assert_eq!(router.events().len(), 1);
    }

    #[tokio::test]
    async fn background_jobs_never_reach_the_chat() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);
        let seen = Arc::new(PlMutex::new(0usize));
        let seen_in = Arc::clone(&seen);
        router.set_processing_callback(Arc::new(move |events| {
            *seen_in.lock() += events.len();
        }));

        router
            .handle_progress_event(event("bg", JobStatus::Processing, Some("cli"), None))
            .await;
        router
            .handle_progress_event(event("bg", JobStatus::Completed, Some("cli"), None))
            .await;

        // State map and UI callback fired, but nothing was sent or edited.
        assert!(*seen.lock() > 0);
        assert!(adapter.sent.lock().is_empty());
        assert!(adapter.edits.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_edits_respect_the_rate_limit() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);

        // First event sends the tracked message.
        router
            .handle_progress_event(event("j1", JobStatus::Processing, Some("cli"), Some("c")))
            .await;
        assert_eq!(adapter.sent.lock().len(), 1);

        // 100 ms later: under the limit, no edit.
        tokio::time::advance(Duration::from_millis(100)).await;
        router
            .handle_progress_event(event("j1", JobStatus::Processing, Some("cli"), Some("c")))
            .await;
        assert!(adapter.edits.lock().is_empty());

        // 500 ms past the send: edit goes through.
        tokio::time::advance(Duration::from_millis(400)).await;
        router
            .handle_progress_event(event("j1", JobStatus::Processing, Some("cli"), Some("c")))
            .await;
        assert_eq!(adapter.edits.lock().len(), 1);
    }

    #[tokio::test]
    async fn completion_edits_tracked_agent_reply_and_clears_it() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);
        router.track_agent_response("j1", "reply-1", "c");

        router
            .handle_progress_event(event("j1", JobStatus::Completed, Some("cli"), Some("c")))
            .await;

        let edits = adapter.edits.lock();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1, "reply-1");
        assert!(edits[0].2.starts_with("✅ index completed"));
        drop(edits);

        // Tracking is cleared: a second completion sends fresh.
        router
            .handle_progress_event(event("j1", JobStatus::Completed, Some("cli"), Some("c")))
            .await;
        assert_eq!(adapter.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn completions_buffer_while_processing_input_and_flush_in_order() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);

        router.start_processing_input(Some("c".to_string()));
        router
            .handle_progress_event(event("j1", JobStatus::Completed, Some("cli"), Some("c")))
            .await;
        router
            .handle_progress_event(event("j2", JobStatus::Failed, Some("cli"), Some("c")))
            .await;
        assert!(adapter.sent.lock().is_empty());

        // The agent reply goes out first, then the buffer flushes in order.
        adapter.send_message("c", "Queued both jobs").await.unwrap();
        router.end_processing_input().await;

        let sent = adapter.sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].1, "Queued both jobs");
        assert!(sent[1].1.starts_with("✅"));
        assert!(sent[2].1.starts_with("❌"));
    }

    #[tokio::test]
    async fn non_editing_interfaces_send_completions_fresh_and_skip_progress() {
        let adapter = RecordingAdapter::new(false);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);
        router.track_agent_response("j1", "reply-1", "c");

        router
            .handle_progress_event(event("j1", JobStatus::Processing, Some("cli"), Some("c")))
            .await;
        assert!(adapter.sent.lock().is_empty());

        router
            .handle_progress_event(event("j1", JobStatus::Completed, Some("cli"), Some("c")))
            .await;
        assert_eq!(adapter.sent.lock().len(), 1);
        assert!(adapter.edits.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_events_leave_the_state_map_after_cleanup() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", Arc::clone(&adapter) as Arc<dyn InterfaceAdapter>);

        router
            .handle_progress_event(event("j1", JobStatus::Completed, Some("cli"), None))
            .await;
        assert_eq!(router.events().len(), 1);

        tokio::time::advance(TERMINAL_CLEANUP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert!(router.events().is_empty());
    }

    #[tokio::test]
    async fn tracked_batches_own_their_children() {
        let adapter = RecordingAdapter::new(true);
        let router = ProgressRouter::new("cli", adapter);
        router.track_job("batch-1", json!({"operation": "import"}));
        assert!(router.owns_job("child", Some("batch-1")));
        assert!(!router.owns_job("child", Some("other")));
    }
}
