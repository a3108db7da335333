use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::web::Bytes;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::io::StreamReader;

use crate::command::Muxer;
use crate::error::JobError;
use crate::source::{ByteStream, Format, MediaInfo, MediaKind, MediaSource};

pub enum SourceFailure {
    Metadata(String),
    VideoStream(String),
    AudioStream(String),
}

pub struct FakeSource {
    title: String,
    formats: Vec<Format>,
    failure: Option<SourceFailure>,
    /// When set, metadata fetches wait for a permit, which lets tests hold a job mid-flight.
    gate: Option<Arc<Semaphore>>,
    /// When set, every stream delivers its first half, then waits for a permit.
    stall: Option<Arc<Semaphore>>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

fn format(id: &str, kind: MediaKind, container: &str, label: Option<&str>, size: u64) -> Format {
    Format {
        id: id.to_owned(),
        kind,
        container: container.to_owned(),
        quality_label: label.map(str::to_owned),
        content_length: size,
        url: None,
        headers: Vec::new(),
        chunk_size: None,
    }
}

impl FakeSource {
    pub fn new() -> Self {
        FakeSource {
            title: "Test Clip".to_owned(),
            formats: vec![
                format("137", MediaKind::Video, "mp4", Some("1080p"), 3000),
                format("136", MediaKind::Video, "mp4", Some("720p"), 2000),
                format("251", MediaKind::Audio, "webm", None, 800),
                format("140", MediaKind::Audio, "m4a", None, 1000),
            ],
            failure: None,
            gate: None,
            stall: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self, failure: SourceFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.formats.retain(|f| f.kind != MediaKind::Audio);
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn stalling_mid_stream(mut self, stall: Arc<Semaphore>) -> Self {
        self.stall = Some(stall);
        self
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }
}

fn failing_stream(message: &str) -> ByteStream {
    let chunks: Vec<io::Result<&'static [u8]>> = vec![
        Ok(&b"partial bytes"[..]),
        Err(io::Error::new(io::ErrorKind::Other, message.to_owned())),
    ];
    Box::new(StreamReader::new(futures::stream::iter(chunks)))
}

fn stalling_stream(mut bytes: Vec<u8>, stall: Arc<Semaphore>) -> ByteStream {
    let rest = bytes.split_off(bytes.len() / 2);

    let chunks = futures::stream::iter([(false, bytes), (true, rest)]).then(
        move |(wait, chunk)| {
            let stall = stall.clone();
            async move {
                if wait {
                    if let Ok(permit) = stall.acquire().await {
                        permit.forget();
                    }
                }
                Ok::<_, io::Error>(Bytes::from(chunk))
            }
        },
    );

    Box::new(StreamReader::new(Box::pin(chunks)))
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn fetch_metadata(&self, _source_ref: &str) -> Result<MediaInfo, JobError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(SourceFailure::Metadata(detail)) = &self.failure {
            return Err(JobError::Upstream(detail.clone()));
        }

        Ok(MediaInfo {
            title: self.title.clone(),
            formats: self.formats.clone(),
        })
    }

    async fn open_stream(
        &self,
        _source_ref: &str,
        format: &Format,
    ) -> Result<ByteStream, JobError> {
        match (&self.failure, format.kind) {
            (Some(SourceFailure::VideoStream(detail)), MediaKind::Video)
            | (Some(SourceFailure::AudioStream(detail)), MediaKind::Audio) => {
                return Ok(failing_stream(detail));
            }
            _ => {}
        }

        let bytes = vec![0x5a; format.content_length as usize];
        match &self.stall {
            Some(stall) => Ok(stalling_stream(bytes, stall.clone())),
            None => Ok(Box::new(io::Cursor::new(bytes))),
        }
    }
}

pub enum MuxBehavior {
    Concatenate,
    WriteEmpty,
    Fail(String),
}

pub struct FakeMuxer {
    behavior: MuxBehavior,
}

impl FakeMuxer {
    pub fn new(behavior: MuxBehavior) -> Self {
        FakeMuxer { behavior }
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), JobError> {
        match &self.behavior {
            MuxBehavior::Concatenate => {
                let mut bytes = tokio::fs::read(video).await?;
                bytes.extend(tokio::fs::read(audio).await?);
                tokio::fs::write(output, bytes).await?;
                Ok(())
            }
            MuxBehavior::WriteEmpty => {
                tokio::fs::write(output, b"").await?;
                Ok(())
            }
            MuxBehavior::Fail(diagnostic) => Err(JobError::Mux(diagnostic.clone())),
        }
    }
}
