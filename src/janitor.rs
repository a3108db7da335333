use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::JobStore;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Evicts jobs older than `retention` and deletes their output files.
pub async fn sweep(store: &JobStore, retention: Duration) -> usize {
    let expired = store.evict_older_than(retention);

    for job in &expired {
        if let Some(path) = &job.output_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(id = %job.id, "janitor: could not remove output: {err}"),
            }
        }
        info!(id = %job.id, "janitor: cleaned up job");
    }

    expired.len()
}

pub fn spawn_janitor(store: JobStore, retention: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; skip it so the first sweep waits a full interval.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = sweep(&store, retention).await;
            debug!(evicted, "janitor: sweep finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;

    fn job_with_output(store: &JobStore, output: &std::path::Path) -> Job {
        let mut job = Job::new("dQw4w9WgXcQ".to_owned());
        job.output_path = Some(output.to_path_buf());
        std::fs::write(output, b"mp4 bytes").unwrap();
        store.insert(job.clone());
        job
    }

    #[tokio::test]
    async fn evicts_only_expired_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new();
        let retention = Duration::from_millis(100);

        let old_output = dir.path().join("old.mp4");
        let old = job_with_output(&store, &old_output);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let fresh_output = dir.path().join("fresh.mp4");
        let fresh = job_with_output(&store, &fresh_output);

        assert_eq!(sweep(&store, retention).await, 1);

        assert!(store.get(old.id).is_none());
        assert!(!old_output.exists());
        assert!(store.get(fresh.id).is_some());
        assert!(fresh_output.exists());
    }

    #[tokio::test]
    async fn missing_output_file_is_not_an_error() {
        let store = JobStore::new();
        let mut job = Job::new("dQw4w9WgXcQ".to_owned());
        job.output_path = Some(std::path::PathBuf::from("ytserve-missing-output.mp4"));
        let id = job.id;
        store.insert(job);

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sweep(&store, Duration::from_millis(5)).await, 1);
        assert!(store.get(id).is_none());
    }
}
