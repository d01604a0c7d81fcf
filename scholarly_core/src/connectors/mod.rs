use crate::federated::DatabaseStatus;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;

#[cfg(feature = "arxiv")]
pub mod arxiv;
#[cfg(feature = "searxng")]
pub mod searxng;
#[cfg(feature = "semantic-scholar")]
pub mod semantic_scholar;

/// User agent sent by every connector's HTTP client.
pub const USER_AGENT: &str = concat!("scholarly/", env!("CARGO_PKG_VERSION"));

/// Latest health-check outcome for one connector.
///
/// Each check replaces the previous snapshot; no history is kept.
#[derive(Debug)]
pub struct HealthTracker {
    status: Mutex<DatabaseStatus>,
}

impl HealthTracker {
    pub fn new(name: &str) -> Self {
        Self {
            status: Mutex::new(DatabaseStatus::unchecked(name)),
        }
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.update(|status| {
            status.is_available = true;
            status.response_time_ms = Some(elapsed.as_millis() as u64);
            status.last_error = None;
        });
    }

    pub fn record_failure(&self, elapsed: Duration, error: impl Into<String>) {
        let error = error.into();
        self.update(|status| {
            status.is_available = false;
            status.response_time_ms = Some(elapsed.as_millis() as u64);
            status.last_error = Some(error);
        });
    }

    pub fn snapshot(&self) -> DatabaseStatus {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut DatabaseStatus)) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut status);
        status.last_checked = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_then_success_overwrites_snapshot() {
        let tracker = HealthTracker::new("arxiv");
        let fresh = tracker.snapshot();
        assert!(fresh.last_checked.is_none());
        assert!(!fresh.is_available);

        tracker.record_failure(Duration::from_millis(40), "connection refused");
        let failed = tracker.snapshot();
        assert!(!failed.is_available);
        assert_eq!(failed.last_error.as_deref(), Some("connection refused"));
        assert_eq!(failed.response_time_ms, Some(40));

        tracker.record_success(Duration::from_millis(12));
        let ok = tracker.snapshot();
        assert!(ok.is_available);
        assert!(ok.last_error.is_none());
        assert_eq!(ok.response_time_ms, Some(12));
        assert!(ok.last_checked.is_some());
    }
}
