//! Probe for the `job-progress` stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use cortex_core::{MessageBus, system};
use cortex_jobs::ProgressEvent;

/// Collects progress events off the bus for assertions.
pub struct ProgressProbe {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressProbe {
    /// Subscribes to `job-progress` on `bus`.
    pub fn attach(bus: &MessageBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(
            system::JOB_PROGRESS,
            Arc::new(move |msg| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Ok(event) = serde_json::from_value::<ProgressEvent>(msg.payload) {
                        let _ = tx.send(event);
                    }
                    None
                })
            }),
        );
        Self {
            rx,
        }
    }

    /// Next event, or panic after two seconds.
    pub async fn next(&mut self) -> ProgressEvent {
        tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for progress event")
            .expect("progress stream closed")
    }

    /// Waits for the terminal event of `job_id`.
    pub async fn terminal_for(&mut self, job_id: &str) -> ProgressEvent {
        loop {
            let event = self.next().await;
            if event.id == job_id && event.status.is_terminal() {
                return event;
            }
        }
    }
}
