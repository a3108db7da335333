use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use actix_web::http::Uri;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;
const DEFAULT_CLEANUP_MINUTES: u64 = 15;

pub struct Config {
    pub port: u16,
    pub max_concurrent_jobs: usize,
    pub cleanup_after: Duration,
    pub download_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
    /// Origins allowed to call the API from a browser; `*` allows any.
    pub allowed_origins: Vec<String>,
    pub web_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            port: env_or("PORT", 8080),
            max_concurrent_jobs: concurrency_limit(env_or(
                "MAX_CONCURRENT_JOBS",
                DEFAULT_MAX_CONCURRENT_JOBS,
            )),
            cleanup_after: retention(env_or("CLEAN_UP_AFTER_MINUTES", DEFAULT_CLEANUP_MINUTES)),
            download_dir: PathBuf::from(env_string("DOWNLOAD_DIR", "downloads")),
            temp_dir: PathBuf::from(env_string("TEMP_DIR", "temp")),
            ffmpeg_path: env_string("FFMPEG_PATH", "ffmpeg"),
            ytdlp_path: env_string("YTDLP_PATH", "yt-dlp"),
            allowed_origins: parse_origins(&env_string("ALLOWED_ORIGINS", "")),
            web_dir: PathBuf::from(env_string("WEB_DIR", "web")),
        }
    }
}

fn concurrency_limit(requested: usize) -> usize {
    if requested < 1 {
        warn!(
            "MAX_CONCURRENT_JOBS must be at least 1, resetting to {}",
            DEFAULT_MAX_CONCURRENT_JOBS
        );
        DEFAULT_MAX_CONCURRENT_JOBS
    } else if requested > Semaphore::MAX_PERMITS {
        warn!(
            "MAX_CONCURRENT_JOBS is above {}, clamping",
            Semaphore::MAX_PERMITS
        );
        Semaphore::MAX_PERMITS
    } else {
        requested
    }
}

fn retention(minutes: u64) -> Duration {
    match minutes.checked_mul(60) {
        Some(seconds) => Duration::from_secs(seconds),
        None => {
            warn!(
                "CLEAN_UP_AFTER_MINUTES={minutes} is out of range, using {}",
                DEFAULT_CLEANUP_MINUTES
            );
            Duration::from_secs(DEFAULT_CLEANUP_MINUTES * 60)
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter(|origin| {
            let valid = *origin == "*" || origin.parse::<Uri>().is_ok();
            if !valid {
                warn!("ignoring malformed origin {origin:?} in ALLOWED_ORIGINS");
            }
            valid
        })
        .map(str::to_owned)
        .collect()
}

fn env_string(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_owned())
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .map_err(|_| ())
        .and_then(|string| string.parse::<T>().map_err(|_| ()))
        .unwrap_or(fallback)
}

/// Creates the download directory and starts the temp directory empty.
///
/// Nothing can be in flight at startup, so leftovers from a previous run are safe to drop.
pub fn prepare_filesystem(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.download_dir)?;

    if config.temp_dir.exists() {
        info!("clearing stale temp directory {}", config.temp_dir.display());
        std::fs::remove_dir_all(&config.temp_dir)?;
    }
    std::fs::create_dir_all(&config.temp_dir)?;

    Ok(())
}
