//! Local Worker Binary
//!
//! Runs the batch against local directories standing in for the transport
//! and content buckets, with progress kept as JSON documents.
//!
//! Environment Variables:
//! - BATCH_TASKS: JSON array of tasks
//! - FOOTAGE_DIR: parent of the per-task working directories
//! - COMPLETION_TRIGGER: object name of the completion marker
//! - TRANSPORT_DIR / CONTENT_DIR / PROGRESS_DIR: local roots
//! - UPLOAD_WORKERS / UPLOAD_BUFFER: optional upload pool sizing

use encore::adapters::ffmpeg::FfmpegCli;
use encore::adapters::local::{FsObjectStore, JsonProgressStore};
use encore::{LocalConfig, Pipeline, WorkerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (worker, local) = match (WorkerConfig::from_env(), LocalConfig::from_env()) {
        (Ok(worker), Ok(local)) => (worker, local),
        (worker, local) => {
            for e in [worker.err(), local.err()].into_iter().flatten() {
                error!(error = %e, "invalid configuration");
            }
            std::process::exit(1);
        }
    };

    let pipeline = Pipeline::new(
        FsObjectStore::new(&local.transport_dir),
        FsObjectStore::new(&local.content_dir),
        JsonProgressStore::new(&local.progress_dir),
        FfmpegCli::default(),
        worker.pipeline_settings(),
    );

    info!(tasks = worker.tasks.len(), "local worker started");
    let outcomes = pipeline.run_batch(&worker.tasks).await;

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        if let Err(e) = &outcome.result {
            error!(task_id = %outcome.task_id, uploaded = outcome.uploaded, error = %e, "task failed");
        }
    }
    info!(total = outcomes.len(), failed, "batch finished");
}
