use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use crate::models::{Job, State};

#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, job: Job) {
        self.lock().insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    fn update<F>(&self, id: Uuid, apply: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id)?;
        apply(job);
        Some(job.clone())
    }

    pub fn mark_processing(&self, id: Uuid) -> Option<Job> {
        self.update(id, |job| {
            job.state = State::Processing;
            job.percentage = 0.0;
            job.error_message = None;
        })
    }

    /// Raises the percentage of a processing job. Lower values are ignored.
    pub fn report_progress(&self, id: Uuid, percentage: f64) {
        self.update(id, |job| {
            if job.state == State::Processing && percentage > job.percentage {
                job.percentage = percentage;
            }
        });
    }

    /// Records where the output will land. Only the first assignment sticks.
    pub fn assign_output(&self, id: Uuid, filename: String, output_path: PathBuf) {
        self.update(id, |job| {
            if job.output_path.is_none() {
                job.filename = Some(filename);
                job.output_path = Some(output_path);
            }
        });
    }

    pub fn mark_ready(&self, id: Uuid) -> Option<Job> {
        self.update(id, |job| {
            job.state = State::Ready;
            job.percentage = 100.0;
            job.error_message = None;
        })
    }

    pub fn mark_failed(&self, id: Uuid, message: String) -> Option<Job> {
        self.update(id, |job| {
            job.state = State::Failed;
            job.error_message = Some(message);
        })
    }

    /// Removes and returns every job created longer ago than `retention`.
    pub fn evict_older_than(&self, retention: Duration) -> Vec<Job> {
        let mut jobs = self.lock();

        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.created_at.elapsed() > retention)
            .map(|job| job.id)
            .collect();

        expired.iter().filter_map(|id| jobs.remove(id)).collect()
    }
}
