//! Progress events and the handler-facing reporter.
//!
//! Every job status transition — and every handler-driven update — publishes
//! a [`ProgressEvent`] on the `job-progress` bus channel. Interfaces filter
//! the stream by `metadata.interface_type` and route by
//! `metadata.channel_id`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cortex_core::{MessageBus, system};

use crate::job::{Job, JobStatus};

/// Fractional progress carried by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
}

impl ProgressData {
    pub fn new(current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64) * 100.0
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// Routing metadata carried by every progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetadata {
    pub operation_type: String,
    pub root_job_id: String,
    pub plugin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_target: Option<String>,
}

/// A progress event on the `job-progress` channel.
///
/// `id` is the job id (or batch id for batch-level events), so successive
/// events for one job overwrite each other in an id-keyed map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressData>,
    pub metadata: ProgressMetadata,
}

impl ProgressEvent {
    /// Builds a status event from a job snapshot.
    pub fn for_job(job: &Job, status: JobStatus, message: Option<String>) -> Self {
        Self {
            id: job.id.clone(),
            event_type: job.job_type.clone(),
            status,
            message,
            progress: None,
            metadata: ProgressMetadata {
                operation_type: job.metadata.operation_type.clone(),
                root_job_id: job.root_job_id.clone(),
                plugin_id: job.metadata.plugin_id.clone(),
                interface_type: job.metadata.interface_type.clone(),
                channel_id: job.metadata.channel_id.clone(),
                operation_target: job.metadata.operation_target.clone(),
            },
        }
    }
}

/// Handle a job handler uses to publish intermediate progress.
///
/// Bound to a single job; every update is stamped with the job's routing
/// metadata so interfaces can attribute it.
#[derive(Clone)]
pub struct ProgressReporter {
    bus: Arc<MessageBus>,
    template: ProgressEvent,
}

impl ProgressReporter {
    pub(crate) fn new(bus: Arc<MessageBus>, job: &Job) -> Self {
        Self {
            bus,
            template: ProgressEvent::for_job(job, JobStatus::Processing, None),
        }
    }

    /// Publishes a `processing` event with fractional progress.
    pub async fn update(&self, current: u64, total: u64, message: Option<String>) {
        let mut event = self.template.clone();
        event.message = message;
        event.progress = Some(ProgressData::new(current, total));
        publish(&self.bus, &event).await;
    }
}

/// Serializes and broadcasts an event on `job-progress`.
pub(crate) async fn publish(bus: &MessageBus, event: &ProgressEvent) {
    match serde_json::to_value(event) {
        Ok(value) => {
            bus.broadcast(system::JOB_PROGRESS, value, &event.metadata.plugin_id)
                .await;
        }
        Err(e) => {
            debug!(job = %event.id, error = %e, "Failed to serialize progress event");
        }
    }
}
