//! Pushes a packaged output tree to the object store.
//!
//! A blocking directory walk feeds a bounded queue drained by a fixed pool of
//! async workers. Individual failures are collected, never retried, and
//! reported together once every worker has finished.

use crate::domain::content_type;
use crate::domain::task::AssetRef;
use crate::ports::storage::ObjectStore;
use bytes::Bytes;
use futures::future::join_all;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const MAX_WORKERS: usize = 16;
const DEFAULT_BUFFER: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    pub max_workers: usize,
    pub buffer_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            max_workers: cpus.min(MAX_WORKERS),
            buffer_size: DEFAULT_BUFFER,
        }
    }
}

/// One file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub path: PathBuf,
    pub key: String,
}

#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("walk failed at {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to upload {path} to {key}: {source}")]
    Put {
        path: PathBuf,
        key: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl UploadFailure {
    pub fn path(&self) -> &Path {
        match self {
            UploadFailure::Walk { path, .. }
            | UploadFailure::Read { path, .. }
            | UploadFailure::Put { path, .. } => path,
        }
    }
}

/// Every failure from one `upload_all` call.
#[derive(Debug)]
pub struct UploadError {
    pub failures: Vec<UploadFailure>,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} upload(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl Error for UploadError {}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Splits the report into the success count and, if anything failed, the
    /// aggregate error.
    pub fn into_parts(self) -> (usize, Option<UploadError>) {
        let error = (!self.failures.is_empty()).then_some(UploadError {
            failures: self.failures,
        });
        (self.uploaded, error)
    }
}

pub struct UploadManager<S> {
    store: S,
    asset: AssetRef,
    config: UploadConfig,
}

impl<S> UploadManager<S>
where
    S: ObjectStore + Clone + 'static,
{
    pub fn new(store: S, asset: AssetRef, config: UploadConfig) -> Self {
        Self {
            store,
            asset,
            config,
        }
    }

    /// Uploads every regular file under `root` to `{user}/{asset}/{relative path}`.
    pub async fn upload_all(&self, root: &Path) -> UploadReport {
        let workers = self.config.max_workers.max(1);
        let (tx, rx) = mpsc::channel::<UploadTask>(self.config.buffer_size.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let walk_root = root.to_path_buf();
        let asset = self.asset.clone();
        let walker = tokio::task::spawn_blocking(move || walk(&walk_root, &asset, tx));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let rx = rx.clone();
                let store = self.store.clone();
                tokio::spawn(async move { drain(id, store, rx).await })
            })
            .collect();
        // Only workers hold the receiver, so the walk stops if they all die.
        drop(rx);
        let results = join_all(handles).await;

        let mut report = UploadReport::default();
        for result in results {
            match result {
                Ok((uploaded, failures)) => {
                    report.uploaded += uploaded;
                    report.failures.extend(failures);
                }
                Err(e) => error!(error = %e, "upload worker panicked"),
            }
        }
        match walker.await {
            Ok(failures) => report.failures.extend(failures),
            Err(e) => error!(error = %e, "directory walk panicked"),
        }

        info!(
            root = %root.display(),
            uploaded = report.uploaded,
            failed = report.failures.len(),
            workers,
            "upload finished"
        );
        report
    }

    /// Uploads one file outside of a tree walk. Returns the destination key.
    pub async fn upload_file(&self, local: &Path, relative: &str) -> Result<String, UploadFailure> {
        let task = UploadTask {
            path: local.to_path_buf(),
            key: self.asset.object_key(relative),
        };
        push(&self.store, &task).await?;
        Ok(task.key)
    }
}

/// Producer side. Runs on a blocking thread and closes the queue by dropping
/// `tx` when it returns.
fn walk(root: &Path, asset: &AssetRef, tx: mpsc::Sender<UploadTask>) -> Vec<UploadFailure> {
    let mut failures = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let path = source.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %source, "walk error");
                failures.push(UploadFailure::Walk { path, source });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let task = UploadTask {
            key: asset.object_key(&relative),
            path,
        };
        if tx.blocking_send(task).is_err() {
            // Every worker is gone; nothing left to feed.
            break;
        }
    }

    failures
}

async fn drain<S: ObjectStore>(
    id: usize,
    store: S,
    rx: Arc<Mutex<mpsc::Receiver<UploadTask>>>,
) -> (usize, Vec<UploadFailure>) {
    let mut uploaded = 0;
    let mut failures = Vec::new();

    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else { break };

        match push(&store, &task).await {
            Ok(()) => {
                debug!(worker = id, key = %task.key, "uploaded");
                uploaded += 1;
            }
            Err(failure) => {
                warn!(worker = id, error = %failure, "upload failed");
                failures.push(failure);
            }
        }
    }

    (uploaded, failures)
}

async fn push<S: ObjectStore + ?Sized>(store: &S, task: &UploadTask) -> Result<(), UploadFailure> {
    let body = tokio::fs::read(&task.path)
        .await
        .map_err(|source| UploadFailure::Read {
            path: task.path.clone(),
            source,
        })?;

    store
        .upload(&task.key, Bytes::from(body), content_type::for_path(&task.path))
        .await
        .map_err(|source| UploadFailure::Put {
            path: task.path.clone(),
            key: task.key.clone(),
            source,
        })
}
