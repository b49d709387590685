//! # cortex-jobs
//!
//! The job and batch scheduler of the Cortex plugin host.
//!
//! Plugins never talk to this crate directly — the context tiers in
//! `cortex-host` apply job-type scoping and routing metadata, then call into
//! [`JobQueue`]. Interfaces consume the resulting [`ProgressEvent`] stream
//! from the `job-progress` bus channel.

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::JobError;
pub use job::{
    BatchOperation, BatchStatus, EnqueueOptions, Job, JobContext, JobMetadata, JobStatus,
};
pub use progress::{ProgressData, ProgressEvent, ProgressMetadata, ProgressReporter};
pub use queue::{FnJobHandler, JobHandler, JobQueue};
