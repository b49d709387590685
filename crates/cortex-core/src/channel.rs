//! Typed channels and the well-known system channel surface.
//!
//! A [`Channel<P, R>`] pairs a channel name with a payload type `P` and a
//! response type `R`. Subscribing through a channel gets serde validation for
//! free; publishing through one keeps senders and receivers in agreement
//! without a shared schema registry.
//!
//! The [`system`] module declares every channel the shell itself publishes
//! on, together with their payload types.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{CommandInfo, ProgressNotification, ResourceInfo, ToolInfo};

/// A named channel carrying `P` payloads and `R` responses.
///
/// The types are erased on the wire (payloads travel as JSON); `Channel`
/// exists so that the subscribe/send call sites are checked against the same
/// contract.
pub struct Channel<P, R = ()> {
    name: &'static str,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> Channel<P, R> {
    /// Declares a channel with the given wire name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The wire name of this channel.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<P, R> Clone for Channel<P, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, R> Copy for Channel<P, R> {}

impl<P, R> std::fmt::Debug for Channel<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Channel").field(&self.name).finish()
    }
}

/// System channels published by the shell and scheduler.
pub mod system {
    use super::*;

    /// Emitted when a plugin's tool is registered.
    pub const TOOL_REGISTER: Channel<ToolRegisterPayload> = Channel::new("system:tool:register");

    /// Emitted when a plugin's resource is registered.
    pub const RESOURCE_REGISTER: Channel<ResourceRegisterPayload> =
        Channel::new("system:resource:register");

    /// Emitted when a plugin's command is registered.
    pub const COMMAND_REGISTER: Channel<CommandRegisterPayload> =
        Channel::new("system:command:register");

    /// Emitted exactly once, after every plugin has been through
    /// initialization. Deferred producers fire on this edge.
    pub const PLUGINS_READY: Channel<PluginsReadyPayload> = Channel::new("system:plugins:ready");

    /// Plugin lifecycle transitions, in the order the manager applied them.
    pub const PLUGIN_LIFECYCLE: Channel<PluginLifecyclePayload> =
        Channel::new("system:plugin:lifecycle");

    /// Channel name carrying progress events — declared here, typed in
    /// `cortex-jobs` where the event type lives.
    pub const JOB_PROGRESS: &str = "job-progress";

    /// Per-plugin tool invocation channel (`plugin:<id>:tool:execute`).
    pub fn tool_execute(plugin_id: &str) -> String {
        format!("plugin:{plugin_id}:tool:execute")
    }

    /// Per-plugin resource read channel (`plugin:<id>:resource:get`).
    pub fn resource_get(plugin_id: &str) -> String {
        format!("plugin:{plugin_id}:resource:get")
    }

    /// Per-plugin progress-notification channel (`plugin:<id>:progress`).
    pub fn progress(plugin_id: &str) -> String {
        format!("plugin:{plugin_id}:progress")
    }
}

/// Payload of [`system::TOOL_REGISTER`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRegisterPayload {
    pub plugin_id: String,
    pub tool: ToolInfo,
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`system::RESOURCE_REGISTER`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRegisterPayload {
    pub plugin_id: String,
    pub resource: ResourceInfo,
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`system::COMMAND_REGISTER`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRegisterPayload {
    pub plugin_id: String,
    pub command: CommandInfo,
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`system::PLUGINS_READY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsReadyPayload {
    pub timestamp: DateTime<Utc>,
    pub plugin_count: usize,
}

/// A lifecycle transition applied by the plugin manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered,
    BeforeInitialize,
    Initialized,
    Error,
    Disabled,
    Enabled,
}

/// Payload of [`system::PLUGIN_LIFECYCLE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginLifecyclePayload {
    pub plugin_id: String,
    pub event: LifecycleEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of the per-plugin `plugin:<id>:tool:execute` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutePayload {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<String>,
    #[serde(default)]
    pub has_progress: bool,
    pub interface_type: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Payload of the per-plugin `plugin:<id>:resource:get` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGetPayload {
    pub resource_uri: String,
}

/// Payload of the per-plugin `plugin:<id>:progress` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProgressPayload {
    pub progress_token: String,
    pub notification: ProgressNotification,
}
