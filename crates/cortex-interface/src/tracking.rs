//! TTL-bounded job-ownership tracking.
//!
//! An interface records every job or batch it started; progress-event
//! ownership resolves against this map. Cleanup is passive — expired entries
//! are dropped on insert — because the map is small (bounded by concurrent
//! user-visible jobs per interface).

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

/// Default entry lifetime.
pub const TRACKING_TTL: Duration = Duration::from_secs(60 * 60);

/// One tracked job or batch.
#[derive(Debug, Clone)]
pub struct JobTrackingEntry {
    /// Free-form description of what was started (operation, target, ...).
    pub info: Value,
    pub created_at: Instant,
}

/// Map of job/batch ids this interface owns.
pub struct JobTracking {
    ttl: Duration,
    entries: Mutex<HashMap<String, JobTrackingEntry>>,
}

impl JobTracking {
    pub fn new() -> Self {
        Self::with_ttl(TRACKING_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records `id`, evicting any entries past the TTL first.
    pub fn track(&self, id: impl Into<String>, info: Value) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| now.duration_since(entry.created_at) < self.ttl);
        entries.insert(
            id.into(),
            JobTrackingEntry {
                info,
                created_at: now,
            },
        );
    }

    /// Direct-or-inherited ownership: `true` when either the job id or its
    /// root id is tracked. Children of a tracked batch are owned
    /// transparently.
    pub fn owns_job(&self, job_id: &str, root_job_id: Option<&str>) -> bool {
        let entries = self.entries.lock();
        entries.contains_key(job_id)
            || root_job_id.is_some_and(|root| entries.contains_key(root))
    }

    pub fn get(&self, id: &str) -> Option<JobTrackingEntry> {
        self.entries.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for JobTracking {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ownership_is_inherited_through_root() {
        let tracking = JobTracking::new();
        tracking.track("batch-1", json!({"operation": "import"}));

        assert!(tracking.owns_job("batch-1", None));
        assert!(tracking.owns_job("child-x", Some("batch-1")));
        assert!(!tracking.owns_job("child-x", Some("batch-2")));
        assert!(!tracking.owns_job("stranger", None));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted_on_insert() {
        let tracking = JobTracking::with_ttl(Duration::from_secs(10));
        tracking.track("old", json!({}));

        tokio::time::advance(Duration::from_secs(11)).await;
        tracking.track("new", json!({}));

        assert!(!tracking.owns_job("old", None));
        assert!(tracking.owns_job("new", None));
        assert_eq!(tracking.len(), 1);
    }
}
