//! # cortex-interface
//!
//! Interface bases for the Cortex plugin host. A concrete front-end (CLI,
//! chat bridge, web) implements [`InterfaceAdapter`] for its platform and
//! composes:
//!
//! - [`ProgressRouter`] — `job-progress` filtering, 500 ms edit coalescing,
//!   completion buffering while input is in flight, job-ownership tracking;
//! - [`MessageInterface`] — the shared input pipeline (conversations,
//!   mention detection, `/command` routing, agent queries, confirmations).

pub mod confirmation;
pub mod error;
pub mod message;
pub mod progress;
pub mod tracking;

pub use confirmation::{ConfirmationReply, PendingConfirmation, parse_confirmation_response};
pub use error::InterfaceError;
pub use message::{IncomingMessage, MessageInterface, default_should_respond};
pub use progress::{
    InterfaceAdapter, PROGRESS_EDIT_INTERVAL, ProcessingCallback, ProgressRouter,
    TERMINAL_CLEANUP_DELAY,
};
pub use tracking::{JobTracking, JobTrackingEntry, TRACKING_TTL};
