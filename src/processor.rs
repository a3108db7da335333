use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command::Muxer;
use crate::error::JobError;
use crate::models::{build_path, sanitize_filename, FileType};
use crate::progress::{ProgressTracker, DOWNLOAD_CEILING};
use crate::selector::{parse_quality, select};
use crate::source::{Format, MediaSource};
use crate::store::JobStore;

const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Runs the download pipeline for admitted jobs.
pub struct Processor {
    pub store: JobStore,
    pub source: Arc<dyn MediaSource>,
    pub muxer: Arc<dyn Muxer>,
    pub download_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Processor {
    /// Moves the job to processing and runs it to a terminal state.
    pub async fn process_job(&self, id: Uuid, source_ref: &str, quality: &str) {
        if self.store.mark_processing(id).is_none() {
            info!(%id, "processor: no such job registered, ignoring");
            return;
        }

        info!(%id, source_ref, quality, "processor: starting");

        let video_temp = build_path(&self.temp_dir, id, FileType::Video);
        let audio_temp = build_path(&self.temp_dir, id, FileType::Audio);

        let result = self
            .transcode(id, source_ref, quality, &video_temp, &audio_temp)
            .await;

        remove_quietly(&video_temp).await;
        remove_quietly(&audio_temp).await;

        match result {
            Ok(()) => {
                self.store.mark_ready(id);
                info!(%id, "processor: complete");
            }
            Err(err) => {
                error!(%id, "processor: ended with error: {err}");
                if let Some(output) = self.store.get(id).and_then(|job| job.output_path) {
                    remove_quietly(&output).await;
                }
                self.store.mark_failed(id, err.user_message());
            }
        }
    }

    async fn transcode(
        &self,
        id: Uuid,
        source_ref: &str,
        quality: &str,
        video_temp: &Path,
        audio_temp: &Path,
    ) -> Result<(), JobError> {
        let info = self.source.fetch_metadata(source_ref).await?;

        let (video, audio) = select(&info.formats, quality).ok_or(JobError::FormatUnavailable)?;
        let height = video
            .quality_label
            .as_deref()
            .map_or_else(|| parse_quality(quality), parse_quality);

        debug!(%id, video = %video.id, audio = %audio.id, height, "formats selected");

        let output = build_path(&self.download_dir, id, FileType::Output);
        let filename = format!("{}_{}p.mp4", sanitize_filename(&info.title), height);
        self.store.assign_output(id, filename, output.clone());

        let tracker = Arc::new(ProgressTracker::new(
            id,
            self.store.clone(),
            video.content_length + audio.content_length,
        ));

        let video_task = tokio::spawn(fetch_to_file(
            self.source.clone(),
            source_ref.to_owned(),
            video.clone(),
            video_temp.to_path_buf(),
            tracker.clone(),
        ));
        let audio_task = tokio::spawn(fetch_to_file(
            self.source.clone(),
            source_ref.to_owned(),
            audio.clone(),
            audio_temp.to_path_buf(),
            tracker,
        ));

        let (video_result, audio_result) = tokio::join!(video_task, audio_task);
        joined(video_result)?;
        joined(audio_result)?;

        self.store.report_progress(id, DOWNLOAD_CEILING);
        info!(%id, "processor: streams fetched, muxing");

        self.muxer.mux(video_temp, audio_temp, &output).await?;

        match fs::metadata(&output).await {
            Ok(metadata) if metadata.len() > 0 => Ok(()),
            _ => Err(JobError::EmptyOutput),
        }
    }
}

fn joined(
    result: Result<Result<u64, JobError>, tokio::task::JoinError>,
) -> Result<u64, JobError> {
    result.map_err(|e| JobError::Internal(e.to_string()))?
}

/// Streams one format into `path`, feeding every chunk to the tracker.
async fn fetch_to_file(
    source: Arc<dyn MediaSource>,
    source_ref: String,
    format: Format,
    path: PathBuf,
    tracker: Arc<ProgressTracker>,
) -> Result<u64, JobError> {
    let mut stream = source.open_stream(&source_ref, &format).await?;
    let mut file = fs::File::create(&path).await?;

    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let read = stream
            .read(&mut buffer)
            .await
            .map_err(|e| JobError::Upstream(e.to_string()))?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read]).await?;
        written += read as u64;
        tracker.add(read);
    }

    file.flush().await?;

    Ok(written)
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "could not remove file: {err}");
        }
    }
}
