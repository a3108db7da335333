use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::models::{validate_source_ref, Job, DEFAULT_QUALITY};
use crate::processor::Processor;
use crate::source::MediaSource;
use crate::store::JobStore;

/// How long an admitted task waits for a free slot before the job fails as busy.
pub const ADMISSION_WAIT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct JobRegistry {
    processor: Arc<Processor>,
    slots: Arc<Semaphore>,
}

impl JobRegistry {
    pub fn new(processor: Processor, max_concurrent_jobs: usize) -> Self {
        JobRegistry {
            processor: Arc::new(processor),
            slots: Arc::new(Semaphore::new(
                max_concurrent_jobs.min(Semaphore::MAX_PERMITS),
            )),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.processor.store
    }

    pub fn source(&self) -> &Arc<dyn MediaSource> {
        &self.processor.source
    }

    /// Registers a pending job and schedules its pipeline without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&self, source_ref: &str, quality: Option<&str>) -> Result<Job, JobError> {
        validate_source_ref(source_ref)?;

        let quality = quality
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUALITY)
            .to_owned();

        let job = Job::new(source_ref.to_owned());
        self.store().insert(job.clone());

        info!(id = %job.id, source_ref, %quality, "job created");

        tokio::spawn(run_admitted(
            self.processor.clone(),
            self.slots.clone(),
            job.id,
            job.source_ref.clone(),
            quality,
        ));

        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        let id = Uuid::parse_str(id).map_err(|_| JobError::NotFound)?;
        self.store().get(id).ok_or(JobError::NotFound)
    }
}

async fn run_admitted(
    processor: Arc<Processor>,
    slots: Arc<Semaphore>,
    id: Uuid,
    source_ref: String,
    quality: String,
) {
    let permit = match tokio::time::timeout(ADMISSION_WAIT, slots.acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) | Err(_) => {
            warn!(%id, "no execution slot within {:?}, rejecting", ADMISSION_WAIT);
            processor.store.mark_failed(id, JobError::Busy.user_message());
            return;
        }
    };

    processor.process_job(id, &source_ref, &quality).await;

    drop(permit);
}
