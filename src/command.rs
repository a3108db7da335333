use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::error::JobError;

fn io_err(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
}

/// Runs an external tool to completion. A non-zero exit becomes an error carrying its stderr.
pub async fn run_command(
    executable: &str,
    arguments: Vec<String>,
    descriptor: &str,
) -> std::io::Result<Output> {
    let output = Command::new(executable)
        .args(arguments)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        match String::from_utf8(output.stderr) {
            Ok(text) => return Err(io_err(&format!("{descriptor} failed\n\n{text}"))),
            Err(_) => {
                return Err(io_err(&format!(
                    "{descriptor} failed and the output was not UTF-8"
                )))
            }
        }
    }

    Ok(output)
}

/// Combines a video-only and an audio-only file into one container.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), JobError>;
}

pub struct FfmpegMuxer {
    executable: String,
}

impl FfmpegMuxer {
    pub fn new(executable: String) -> Self {
        FfmpegMuxer { executable }
    }
}

fn build_arguments(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    let mut arguments: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .iter()
        .map(|arg| arg.to_string())
        .collect();

    arguments.push(video.to_string_lossy().into_owned());
    arguments.push("-i".to_owned());
    arguments.push(audio.to_string_lossy().into_owned());
    arguments.extend(["-c".to_owned(), "copy".to_owned()]);
    arguments.push(output.to_string_lossy().into_owned());

    arguments
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), JobError> {
        run_command(&self.executable, build_arguments(video, audio, output), "ffmpeg")
            .await
            .map(|_| ())
            .map_err(|err| {
                warn!(output = %output.display(), "mux failed: {err}");
                JobError::Mux(err.to_string())
            })
    }
}
