use thiserror::Error;

const MSG_STORAGE: &str = "Storage permission denied. Please contact system administrator.";
const MSG_DISK_SPACE: &str = "Disk space exhausted. Cannot complete download.";
const MSG_MEDIA: &str = "Media processing error (FFmpeg failed). Please try again.";
const MSG_RESTRICTED: &str =
    "The source restricted access to this video (cipher or signature error).";
const MSG_FORBIDDEN: &str = "Access forbidden. The source might be throttling the server IP.";
const MSG_UNEXPECTED: &str = "An unexpected technical error occurred during processing.";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job not found")]
    NotFound,

    #[error("no execution slot became free in time")]
    Busy,

    /// Metadata or stream retrieval failed; the detail is raw upstream text.
    #[error("upstream fetch failed: {0}")]
    Upstream(String),

    #[error("no matching video/audio format")]
    FormatUnavailable,

    /// The detail is raw muxer diagnostic output.
    #[error("mux failed: {0}")]
    Mux(String),

    #[error("generated file is empty")]
    EmptyOutput,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// The message recorded on a failed job. Never contains the wrapped detail.
    pub fn user_message(&self) -> String {
        let message = match self {
            JobError::InvalidInput(_) => "Invalid Video ID",
            JobError::NotFound => "Job not found",
            JobError::Busy => "Server busy",
            JobError::FormatUnavailable => "format not found",
            JobError::Mux(_) => MSG_MEDIA,
            JobError::EmptyOutput => "generated file is empty",
            JobError::Upstream(detail) | JobError::Internal(detail) => classify(detail),
            JobError::Io(err) => classify(&err.to_string()),
        };

        message.to_owned()
    }
}

fn classify(detail: &str) -> &'static str {
    let lower = detail.to_lowercase();

    if lower.contains("permission denied") {
        MSG_STORAGE
    } else if lower.contains("no space left") {
        MSG_DISK_SPACE
    } else if lower.contains("ffmpeg") {
        MSG_MEDIA
    } else if lower.contains("cipher") || lower.contains("signature") {
        MSG_RESTRICTED
    } else if lower.contains("403") {
        MSG_FORBIDDEN
    } else {
        MSG_UNEXPECTED
    }
}
