//! The job queue: handler registry, dispatch loop, batch orchestration.
//!
//! [`JobQueue`] accepts typed work items and dispatches them on a single
//! cooperative worker task, FIFO in enqueue order. Handlers are looked up by
//! **fully scoped** job type (`pluginId:type`); the scoping itself is applied
//! by the context tiers in `cortex-host`, never here.
//!
//! There is no retry at this layer: a handler error marks the job `failed`
//! and emits a failed progress event, nothing more.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cortex_core::MessageBus;

use crate::error::JobError;
use crate::job::{
    BatchOperation, BatchStatus, EnqueueOptions, Job, JobContext, JobMetadata, JobStatus,
};
use crate::progress::{ProgressEvent, ProgressReporter, publish};

/// Executes jobs of one registered type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(
        &self,
        payload: Value,
        context: JobContext,
        progress: &ProgressReporter,
    ) -> Result<Value, JobError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnJobHandler<F>(pub F);

#[async_trait]
impl<F> JobHandler for FnJobHandler<F>
where
    F: Fn(Value, JobContext, ProgressReporter) -> BoxFuture<'static, Result<Value, JobError>>
        + Send
        + Sync,
{
    async fn execute(
        &self,
        payload: Value,
        context: JobContext,
        progress: &ProgressReporter,
    ) -> Result<Value, JobError> {
        (self.0)(payload, context, progress.clone()).await
    }
}

struct BatchRecord {
    children: Vec<String>,
}

/// The process-wide job and batch scheduler.
pub struct JobQueue {
    bus: Arc<MessageBus>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    jobs: RwLock<HashMap<String, Job>>,
    batches: RwLock<HashMap<String, BatchRecord>>,
    tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl JobQueue {
    /// Creates the queue and spawns its dispatch loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(bus: Arc<MessageBus>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            bus,
            handlers: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            batches: RwLock::new(HashMap::new()),
            tx,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(Self::run(Arc::clone(&queue), rx));
        queue
    }

    /// Stops the dispatch loop. Queued jobs that have not started are dropped.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    // ─── Handler registry ────────────────────────────────────────────────────

    /// Registers `handler` for the fully scoped `job_type`.
    ///
    /// A second registration for the same type is an error; the first one
    /// stays in place.
    pub fn register_handler(
        &self,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), JobError> {
        let job_type = job_type.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&job_type) {
            return Err(JobError::HandlerExists(job_type));
        }
        debug!(job_type = %job_type, "Job handler registered");
        handlers.insert(job_type, handler);
        Ok(())
    }

    /// Returns `true` if a handler exists for `job_type`.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    // ─── Enqueue ─────────────────────────────────────────────────────────────

    /// Enqueues a job and returns its id before dispatch begins.
    ///
    /// `options.root_job_id` defaults to the new job's own id; batch children
    /// pass the batch id instead.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: Value,
        metadata: JobMetadata,
        options: EnqueueOptions,
    ) -> Result<String, JobError> {
        let id = Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            job_type: job_type.into(),
            payload,
            source: metadata.plugin_id.clone(),
            root_job_id: options.root_job_id.unwrap_or_else(|| id.clone()),
            status: JobStatus::Queued,
            metadata,
            created_at: Utc::now(),
        };

        publish(
            &self.bus,
            &ProgressEvent::for_job(&job, JobStatus::Queued, None),
        )
        .await;
        self.jobs.write().insert(id.clone(), job);
        self.tx.send(id.clone()).map_err(|_| JobError::QueueClosed)?;
        Ok(id)
    }

    /// Enqueues a batch of operations sharing `root_job_id = batch_id`.
    ///
    /// Children are enqueued in operation order. Callers (the context tiers)
    /// generate the batch id and pre-scope the operation types.
    pub async fn enqueue_batch(
        &self,
        operations: Vec<BatchOperation>,
        metadata: JobMetadata,
        batch_id: String,
    ) -> Result<String, JobError> {
        let mut children = Vec::with_capacity(operations.len());
        for op in operations {
            let child = self
                .enqueue(
                    op.op_type,
                    op.data,
                    metadata.clone(),
                    EnqueueOptions::with_root(batch_id.clone()),
                )
                .await?;
            children.push(child);
        }
        info!(
            batch = %batch_id,
            operations = children.len(),
            "Batch enqueued"
        );
        self.batches
            .write()
            .insert(batch_id.clone(), BatchRecord { children });
        Ok(batch_id)
    }

    // ─── Monitoring ──────────────────────────────────────────────────────────

    /// Snapshot of a job by id.
    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Status of a job by id.
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().get(job_id).map(|j| j.status)
    }

    /// Jobs that have not reached a terminal status.
    pub fn active(&self) -> Vec<Job> {
        self.jobs
            .read()
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Aggregate status of a batch, or `None` for an unknown id.
    pub fn batch_status(&self, batch_id: &str) -> Option<BatchStatus> {
        let batches = self.batches.read();
        let record = batches.get(batch_id)?;
        let jobs = self.jobs.read();
        let mut status = BatchStatus {
            batch_id: batch_id.to_string(),
            total: record.children.len(),
            completed: 0,
            failed: 0,
            pending: 0,
        };
        for child in &record.children {
            match jobs.get(child).map(|j| j.status) {
                Some(JobStatus::Completed) => status.completed += 1,
                Some(JobStatus::Failed) => status.failed += 1,
                _ => status.pending += 1,
            }
        }
        Some(status)
    }

    /// Child job ids of a batch, in enqueue order.
    pub fn batch_children(&self, batch_id: &str) -> Vec<String> {
        self.batches
            .read()
            .get(batch_id)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    async fn run(queue: Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>) {
        loop {
            tokio::select! {
                _ = queue.shutdown.cancelled() => {
                    debug!("Job queue dispatch loop stopped");
                    break;
                }
                next = rx.recv() => {
                    match next {
                        Some(job_id) => queue.process(&job_id).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn process(&self, job_id: &str) {
        let Some(job) = self.transition(job_id, JobStatus::Processing) else {
            warn!(job = %job_id, "Dequeued unknown job");
            return;
        };
        publish(
            &self.bus,
            &ProgressEvent::for_job(&job, JobStatus::Processing, None),
        )
        .await;

        let handler = self.handlers.read().get(&job.job_type).cloned();
        let Some(handler) = handler else {
            let message = format!("No handler registered for job type '{}'", job.job_type);
            error!(job = %job.id, job_type = %job.job_type, "{message}");
            self.finish(&job, JobStatus::Failed, Some(message)).await;
            return;
        };

        let context = JobContext {
            job_id: job.id.clone(),
            root_job_id: job.root_job_id.clone(),
            operation_type: job.metadata.operation_type.clone(),
            metadata: job.metadata.clone(),
        };
        let reporter = ProgressReporter::new(Arc::clone(&self.bus), &job);

        match handler.execute(job.payload.clone(), context, &reporter).await {
            Ok(_) => self.finish(&job, JobStatus::Completed, None).await,
            Err(e) => {
                warn!(job = %job.id, job_type = %job.job_type, error = %e, "Job handler failed");
                self.finish(&job, JobStatus::Failed, Some(e.to_string()))
                    .await;
            }
        }
    }

    fn transition(&self, job_id: &str, status: JobStatus) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(job_id)?;
        job.status = status;
        Some(job.clone())
    }

    async fn finish(&self, job: &Job, status: JobStatus, message: Option<String>) {
        self.transition(&job.id, status);
        publish(&self.bus, &ProgressEvent::for_job(job, status, message)).await;
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("handlers", &self.handlers.read().len())
            .field("jobs", &self.jobs.read().len())
            .field("batches", &self.batches.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::system;
    use serde_json::json;

    fn ok_handler() -> Arc<dyn JobHandler> {
        Arc::new(FnJobHandler(|_payload, _ctx, _progress| {
            Box::pin(async move { Ok(json!({"done": true})) }) as BoxFuture<'static, _>
        }))
    }

    fn failing_handler(message: &'static str) -> Arc<dyn JobHandler> {
        Arc::new(FnJobHandler(move |_payload, _ctx, _progress| {
            Box::pin(async move { Err(JobError::Failed(message.to_string())) })
                as BoxFuture<'static, _>
        }))
    }

    /// Taps `job-progress` into an mpsc receiver of deserialized events.
    fn tap_progress(bus: &MessageBus) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(system::JOB_PROGRESS, Arc::new(move |msg| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Ok(event) = serde_json::from_value::<ProgressEvent>(msg.payload) {
                    let _ = tx.send(event);
                }
                None
            })
        }));
        rx
    }

    async fn wait_terminal(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> ProgressEvent {
        loop {
            let event = rx.recv().await.expect("progress stream ended");
            if event.status.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn root_job_id_defaults_to_own_id() {
        let bus = Arc::new(MessageBus::new());
        let queue = JobQueue::start(Arc::clone(&bus));
        queue.register_handler("notes:index", ok_handler()).unwrap();

        let id = queue
            .enqueue(
                "notes:index",
                json!({}),
                JobMetadata::background("index", "notes"),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let job = queue.job(&id).unwrap();
        assert_eq!(job.root_job_id, id);
    }

    #[tokio::test]
    async fn caller_supplied_root_is_preserved() {
        let bus = Arc::new(MessageBus::new());
        let queue = JobQueue::start(Arc::clone(&bus));
        queue.register_handler("notes:index", ok_handler()).unwrap();

        let id = queue
            .enqueue(
                "notes:index",
                json!({}),
                JobMetadata::background("index", "notes"),
                EnqueueOptions::with_root("batch-7"),
            )
            .await
            .unwrap();
        assert_eq!(queue.job(&id).unwrap().root_job_id, "batch-7");
    }

    #[tokio::test]
    async fn duplicate_handler_registration_is_rejected() {
        let bus = Arc::new(MessageBus::new());
        let queue = JobQueue::start(bus);
        queue.register_handler("notes:index", ok_handler()).unwrap();
        let err = queue
            .register_handler("notes:index", ok_handler())
            .unwrap_err();
        assert!(matches!(err, JobError::HandlerExists(_)));
    }

    #[tokio::test]
    async fn job_progresses_through_statuses_in_order() {
        let bus = Arc::new(MessageBus::new());
        let mut rx = tap_progress(&bus);
        let queue = JobQueue::start(Arc::clone(&bus));
        queue.register_handler("notes:index", ok_handler()).unwrap();

        let id = queue
            .enqueue(
                "notes:index",
                json!({}),
                JobMetadata::background("index", "notes"),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let statuses = [
            rx.recv().await.unwrap().status,
            rx.recv().await.unwrap().status,
            rx.recv().await.unwrap().status,
        ];
        assert_eq!(
            statuses,
            [JobStatus::Queued, JobStatus::Processing, JobStatus::Completed]
        );
        assert_eq!(queue.status(&id), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn missing_handler_fails_the_job() {
        let bus = Arc::new(MessageBus::new());
        let mut rx = tap_progress(&bus);
        let queue = JobQueue::start(Arc::clone(&bus));

        let id = queue
            .enqueue(
                "nobody:home",
                json!({}),
                JobMetadata::background("home", "nobody"),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, JobStatus::Failed);
        assert!(terminal.message.unwrap().contains("No handler registered"));
        assert_eq!(queue.status(&id), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn handler_error_message_is_surfaced() {
        let bus = Arc::new(MessageBus::new());
        let mut rx = tap_progress(&bus);
        let queue = JobQueue::start(Arc::clone(&bus));
        queue
            .register_handler("notes:sync", failing_handler("remote unreachable"))
            .unwrap();

        queue
            .enqueue(
                "notes:sync",
                json!({}),
                JobMetadata::background("sync", "notes"),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        let terminal = wait_terminal(&mut rx).await;
        assert_eq!(terminal.status, JobStatus::Failed);
        assert_eq!(terminal.message.as_deref(), Some("remote unreachable"));
    }

    #[tokio::test]
    async fn batch_children_share_root_and_complete_in_order() {
        let bus = Arc::new(MessageBus::new());
        let mut rx = tap_progress(&bus);
        let queue = JobQueue::start(Arc::clone(&bus));
        queue.register_handler("notes:import", ok_handler()).unwrap();

        let batch_id = queue
            .enqueue_batch(
                vec![
                    BatchOperation::new("notes:import", json!({"n": 1})),
                    BatchOperation::new("notes:import", json!({"n": 2})),
                    BatchOperation::new("notes:import", json!({"n": 3})),
                ],
                JobMetadata::background("batch_processing", "notes"),
                "batch-1".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(batch_id, "batch-1");

        let children = queue.batch_children(&batch_id);
        assert_eq!(children.len(), 3);
        for child in &children {
            assert_eq!(queue.job(child).unwrap().root_job_id, batch_id);
        }

        // Completions arrive in enqueue order.
        let mut completed = Vec::new();
        while completed.len() < 3 {
            let event = rx.recv().await.unwrap();
            if event.status == JobStatus::Completed {
                completed.push(event.id);
            }
        }
        assert_eq!(completed, children);
        assert!(queue.batch_status(&batch_id).unwrap().is_complete());
    }
}
