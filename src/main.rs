use std::sync::Arc;

use tracing::info;

use crate::command::FfmpegMuxer;
use crate::config::{prepare_filesystem, Config};
use crate::janitor::{spawn_janitor, SWEEP_INTERVAL};
use crate::processor::Processor;
use crate::registry::JobRegistry;
use crate::source::YtDlpSource;
use crate::store::JobStore;
use crate::web::start_web_server;

mod command;
mod config;
mod error;
mod janitor;
mod logging;
mod models;
mod processor;
mod progress;
mod registry;
mod selector;
mod source;
mod status;
mod store;
#[cfg(test)]
mod testing;
mod web;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let dotenv = dotenvy::dotenv();
    logging::init_logging();

    if let Ok(path) = dotenv {
        info!("loaded environment from {}", path.display());
    }

    let config = Config::from_env();
    prepare_filesystem(&config)?;

    let store = JobStore::new();

    let processor = Processor {
        store: store.clone(),
        source: Arc::new(YtDlpSource::new(config.ytdlp_path.clone())),
        muxer: Arc::new(FfmpegMuxer::new(config.ffmpeg_path.clone())),
        download_dir: config.download_dir.clone(),
        temp_dir: config.temp_dir.clone(),
    };
    let registry = JobRegistry::new(processor, config.max_concurrent_jobs);

    spawn_janitor(store, config.cleanup_after, SWEEP_INTERVAL);

    info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        retention = ?config.cleanup_after,
        "ytserve started"
    );

    start_web_server(registry, &config).await
}
