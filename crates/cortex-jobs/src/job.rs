//! Job data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Routing and display metadata attached to every job.
///
/// A job without `channel_id` is a **background job**: its progress never
/// produces chat output on any interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    /// Display label for the operation (unscoped job type, or
    /// `batch_processing` for batches).
    pub operation_type: String,
    /// Plugin that enqueued the job.
    pub plugin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Optional human-readable target (entity title, file name, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_target: Option<String>,
}

impl JobMetadata {
    /// Metadata for a background job (no routing).
    pub fn background(operation_type: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            plugin_id: plugin_id.into(),
            interface_type: None,
            channel_id: None,
            operation_target: None,
        }
    }
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: Value,
    /// Plugin id of the enqueuer.
    pub source: String,
    /// Equals `id` for top-level jobs, or the batch/parent id for children.
    pub root_job_id: String,
    pub status: JobStatus,
    pub metadata: JobMetadata,
    pub created_at: DateTime<Utc>,
}

/// Options accepted by `enqueue`.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// When unset, defaults to the newly generated job id.
    pub root_job_id: Option<String>,
}

impl EnqueueOptions {
    pub fn with_root(root_job_id: impl Into<String>) -> Self {
        Self {
            root_job_id: Some(root_job_id.into()),
        }
    }
}

/// Execution context a handler receives alongside the payload.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub root_job_id: String,
    pub operation_type: String,
    pub metadata: JobMetadata,
}

/// One operation inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    #[serde(rename = "type")]
    pub op_type: String,
    pub data: Value,
}

impl BatchOperation {
    pub fn new(op_type: impl Into<String>, data: Value) -> Self {
        Self {
            op_type: op_type.into(),
            data,
        }
    }
}

/// Aggregate view of a batch, computed from its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

impl BatchStatus {
    /// A batch is complete when every child reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}
