use std::path::{Path, PathBuf};
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

pub const DEFAULT_QUALITY: &str = "1080p";

lazy_static! {
    static ref SOURCE_REF_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap();
}

/// A download request's full lifecycle record.
///
/// Serializes to the snapshot clients see; the output path and creation time stay internal.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "video_id")]
    pub source_ref: String,
    #[serde(rename = "status")]
    pub state: State,
    pub percentage: f64,
    pub filename: Option<String>,
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub created_at: Instant,
}

impl Job {
    pub fn new(source_ref: String) -> Self {
        Job {
            id: Uuid::new_v4(),
            source_ref,
            state: State::Pending,
            percentage: 0.0,
            filename: None,
            output_path: None,
            error_message: None,
            created_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Ready | State::Failed)
    }
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub video_id: String,
    #[serde(default)]
    pub quality: Option<String>,
}

pub fn validate_source_ref(source_ref: &str) -> Result<(), JobError> {
    if SOURCE_REF_RE.is_match(source_ref) {
        Ok(())
    } else {
        Err(JobError::InvalidInput(source_ref.to_owned()))
    }
}

pub enum FileType {
    Video,
    Audio,
    Output,
}

pub fn build_path(dir: &Path, id: Uuid, file_type: FileType) -> PathBuf {
    match file_type {
        FileType::Video => dir.join(format!("v_{id}.mp4")),
        FileType::Audio => dir.join(format!("a_{id}.m4a")),
        FileType::Output => dir.join(format!("{id}.mp4")),
    }
}

/// Replaces spaces and drops characters that are not safe in a filename or a header value.
pub fn sanitize_filename(name: &str) -> String {
    name.replace(' ', "_")
        .chars()
        .filter(|c| !c.is_control() && !r#"\/:*?"<>|"#.contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ref_must_be_eleven_token_chars() {
        assert!(validate_source_ref("dQw4w9WgXcQ").is_ok());
        assert!(validate_source_ref("a-b_c-d_e-f").is_ok());
        assert!(validate_source_ref("short").is_err());
        assert!(validate_source_ref("dQw4w9WgXcQQ").is_err());
        assert!(validate_source_ref("dQw4w9W/XcQ").is_err());
        assert!(validate_source_ref("").is_err());
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(
            sanitize_filename(r#"My Video: "Live" <at> a/b\c?*|"#),
            "My_Video_Live_at_abc"
        );
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_filename("Line one\r\nLine\ttwo\u{7f}"), "Line_oneLinetwo");
    }

    #[test]
    fn snapshot_hides_internal_fields() {
        let mut job = Job::new("dQw4w9WgXcQ".to_owned());
        job.output_path = Some(PathBuf::from("/srv/downloads/secret.mp4"));

        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["video_id"], "dQw4w9WgXcQ");
        assert!(json.get("output_path").is_none());
        assert!(json.get("created_at").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn temp_and_output_paths_are_distinct() {
        let id = Uuid::new_v4();
        let dir = Path::new("temp");
        let video = build_path(dir, id, FileType::Video);
        let audio = build_path(dir, id, FileType::Audio);

        assert_ne!(video, audio);
        assert_eq!(
            build_path(Path::new("downloads"), id, FileType::Output),
            Path::new("downloads").join(format!("{id}.mp4"))
        );
    }
}
