//! Message envelope and response types for the Cortex bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An envelope delivered to every subscriber of a channel.
///
/// Payloads are raw JSON values; typed channels (see
/// [`Channel`](crate::channel::Channel)) layer schema validation on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    /// Unique message id.
    pub id: String,
    /// Channel the message was sent on.
    pub channel: String,
    /// Raw JSON payload.
    pub payload: Value,
    /// Identifier of the sender (usually a plugin id or `"shell"`).
    pub source: String,
    /// Optional addressee hint; delivery is unchanged, subscribers may filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Optional free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// When `true`, all subscribers run and no response is collected.
    #[serde(default)]
    pub broadcast: bool,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    /// Creates a request/response message (`broadcast = false`).
    pub fn new(channel: impl Into<String>, payload: Value, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            payload,
            source: source.into(),
            target: None,
            metadata: None,
            broadcast: false,
            timestamp: Utc::now(),
        }
    }

    /// Sets the addressee hint.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Marks the message as broadcast (all subscribers, no response).
    pub fn into_broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }
}

/// Response returned by a subscriber.
///
/// A subscriber that does not handle a message returns `None` from its
/// handler instead; `MessageResponse` is only produced when the subscriber
/// actually processed the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MessageResponse {
    /// The request was handled; `data` carries an optional result payload.
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// The request was handled but failed.
    Error { message: String },
}

impl MessageResponse {
    /// A success response without data.
    pub fn success() -> Self {
        Self::Success { data: None }
    }

    /// A success response carrying `data`.
    pub fn data(data: Value) -> Self {
        Self::Success { data: Some(data) }
    }

    /// An error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns `true` for the success variants.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Extracts the data payload, if any.
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::Success { data } => data,
            Self::Error { .. } => None,
        }
    }
}
