use std::sync::Mutex;

use uuid::Uuid;

use crate::store::JobStore;

/// Highest percentage published before the mux step is verified.
pub const DOWNLOAD_CEILING: f64 = 99.9;

/// Byte counter shared by the sub-fetches of one job.
pub struct ProgressTracker {
    id: Uuid,
    store: JobStore,
    expected_total: u64,
    received: Mutex<u64>,
}

impl ProgressTracker {
    pub fn new(id: Uuid, store: JobStore, expected_total: u64) -> Self {
        ProgressTracker {
            id,
            store,
            expected_total,
            received: Mutex::new(0),
        }
    }

    /// Adds `bytes` to the running total and publishes the new percentage.
    ///
    /// Nothing is published while the expected total is unknown.
    pub fn add(&self, bytes: usize) {
        let mut received = self
            .received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *received += bytes as u64;

        if self.expected_total == 0 {
            return;
        }

        let percentage =
            (*received as f64 / self.expected_total as f64 * 100.0).min(DOWNLOAD_CEILING);
        self.store.report_progress(self.id, percentage);
    }
}
