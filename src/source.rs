use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::command::run_command;
use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

/// One encoding variant offered by the source.
#[derive(Debug, Clone)]
pub struct Format {
    pub id: String,
    pub kind: MediaKind,
    /// File extension of the packaging, e.g. `mp4`, `m4a`, `webm`.
    pub container: String,
    /// e.g. `1080p60`
    pub quality_label: Option<String>,
    /// Expected byte length, 0 when unknown.
    pub content_length: u64,
    pub url: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Fetch in ranged requests of this size. Only set when `content_length` is exact.
    pub chunk_size: Option<u64>,
}

impl Format {
    pub fn is_mp4_family(&self) -> bool {
        matches!(self.container.as_str(), "mp4" | "m4a")
    }
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub title: String,
    pub formats: Vec<Format>,
}

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch_metadata(&self, source_ref: &str) -> Result<MediaInfo, JobError>;

    async fn open_stream(&self, source_ref: &str, format: &Format) -> Result<ByteStream, JobError>;
}

/// Resolves metadata with `yt-dlp -J` and fetches the chosen format's URL over HTTP.
pub struct YtDlpSource {
    executable: String,
    client: reqwest::Client,
}

impl YtDlpSource {
    pub fn new(executable: String) -> Self {
        YtDlpSource {
            executable,
            client: reqwest::Client::new(),
        }
    }
}

fn watch_url(source_ref: &str) -> String {
    format!("https://www.youtube.com/watch?v={source_ref}")
}

#[derive(Deserialize)]
struct RawInfo {
    title: String,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_id: String,
    url: Option<String>,
    #[serde(default)]
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: std::collections::HashMap<String, String>,
    downloader_options: Option<RawDownloaderOptions>,
}

#[derive(Deserialize)]
struct RawDownloaderOptions {
    http_chunk_size: Option<u64>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().map_or(false, |c| c != "none" && !c.is_empty())
}

impl From<RawFormat> for Format {
    fn from(raw: RawFormat) -> Self {
        // Manifest protocols (m3u8, dash segments) cannot be fetched as one byte stream.
        let direct = matches!(raw.protocol.as_deref(), None | Some("https") | Some("http"));

        let kind = match (direct, has_codec(&raw.vcodec), has_codec(&raw.acodec)) {
            (true, true, false) => MediaKind::Video,
            (true, false, true) => MediaKind::Audio,
            _ => MediaKind::Other,
        };

        let quality_label = raw.height.map(|height| match raw.fps {
            Some(fps) if fps > 30.0 => format!("{height}p{}", fps.round() as u32),
            _ => format!("{height}p"),
        });

        let chunk_size = raw
            .filesize
            .and(raw.downloader_options)
            .and_then(|options| options.http_chunk_size)
            .filter(|&size| size > 0);

        Format {
            id: raw.format_id,
            kind,
            container: raw.ext,
            quality_label,
            content_length: raw.filesize.or(raw.filesize_approx).unwrap_or(0),
            url: raw.url,
            headers: raw.http_headers.into_iter().collect(),
            chunk_size,
        }
    }
}

pub fn parse_info(json: &str) -> Result<MediaInfo, JobError> {
    let raw: RawInfo = serde_json::from_str(json)
        .map_err(|e| JobError::Upstream(format!("invalid metadata: {e}")))?;

    Ok(MediaInfo {
        title: raw.title,
        formats: raw.formats.into_iter().map(Format::from).collect(),
    })
}

/// `Range` header values covering `total` bytes in `chunk`-sized pieces.
///
/// The last range is open-ended so the final request reads to the end of the resource.
fn chunk_ranges(total: u64, chunk: u64) -> Vec<String> {
    let mut ranges = Vec::new();
    let mut start = 0;

    while start + chunk < total {
        ranges.push(format!("bytes={}-{}", start, start + chunk - 1));
        start += chunk;
    }
    ranges.push(format!("bytes={start}-"));

    ranges
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn fetch_metadata(&self, source_ref: &str) -> Result<MediaInfo, JobError> {
        let arguments = vec![
            "-J".to_owned(),
            "--no-warnings".to_owned(),
            "--no-playlist".to_owned(),
            watch_url(source_ref),
        ];

        let output = run_command(&self.executable, arguments, "yt-dlp")
            .await
            .map_err(|e| JobError::Upstream(e.to_string()))?;

        let text = String::from_utf8(output.stdout)
            .map_err(|_| JobError::Upstream("yt-dlp output was not UTF-8".to_owned()))?;

        let info = parse_info(&text)?;
        debug!(source_ref, formats = info.formats.len(), "metadata fetched");

        Ok(info)
    }

    /// Issues one GET, or a sequence of ranged GETs when the format asks for chunking.
    /// Request failures surface as read errors on the returned stream.
    async fn open_stream(&self, source_ref: &str, format: &Format) -> Result<ByteStream, JobError> {
        let url = format.url.clone().ok_or_else(|| {
            JobError::Upstream(format!("format {} of {source_ref} has no URL", format.id))
        })?;

        let ranges: Vec<Option<String>> = match format.chunk_size {
            Some(chunk) if format.content_length > 0 => {
                chunk_ranges(format.content_length, chunk).into_iter().map(Some).collect()
            }
            _ => vec![None],
        };
        debug!(source_ref, format = %format.id, requests = ranges.len(), "opening stream");

        let client = self.client.clone();
        let headers = format.headers.clone();

        let body = stream::iter(ranges)
            .then(move |range| {
                let mut request = client.get(url.as_str());
                for (name, value) in &headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(range) = range {
                    request = request.header(reqwest::header::RANGE, range);
                }

                async move {
                    request
                        .send()
                        .await
                        .and_then(|response| response.error_for_status())
                        .map(|response| response.bytes_stream())
                }
            })
            .try_flatten()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }
}
