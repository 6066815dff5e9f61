//! Per-task orchestration: download, stage, transcode, package, upload, mark complete.
//!
//! Stages run strictly in order. The first failure ends the task; the batch
//! moves on to the next task. Every sealed stage is appended to the task's
//! [`ProgressTrace`] and handed to the [`ProgressRecorder`].

use crate::application::recorder::ProgressRecorder;
use crate::application::transcoder::{IframeStrategy, TranscodeError, TranscodingCoordinator};
use crate::application::uploader::{UploadConfig, UploadError, UploadManager};
use crate::domain::ladder::Ladder;
use crate::domain::progress::{ProgressTrace, Stage, StageTimer};
use crate::domain::task::{AssetRef, CompletionMarker, Task};
use crate::ports::encoder::EncoderPort;
use crate::ports::repository::ProgressRepository;
use crate::ports::storage::ObjectStore;
use bytes::Bytes;
use chrono::Utc;
use std::error::Error;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Name of the staged source file inside the task's working directory.
const INPUT_FILE_NAME: &str = "input";
const MARKER_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("local i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset ids {user_id:?}/{asset_id:?} are not plain directory names")]
    UnsafeAssetIds { user_id: String, asset_id: String },
    #[error("failed to download {key}: {source}")]
    Download {
        key: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("failed to store {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("source could not be probed: {0}")]
    Probe(#[source] TranscodeError),
    #[error("{stage} failed: {source}")]
    Encoder {
        stage: Stage,
        #[source]
        source: TranscodeError,
    },
    #[error("uploaded {uploaded} file(s) before failing: {source}")]
    PartialUpload {
        uploaded: usize,
        #[source]
        source: UploadError,
    },
    #[error("failed to encode completion marker: {0}")]
    Marker(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Parent of the per-task working directories.
    pub footage_dir: PathBuf,
    /// Object name of the completion marker, relative to the asset prefix.
    pub completion_trigger: String,
    pub ladder: Ladder,
    pub upload: UploadConfig,
    pub iframe_strategy: IframeStrategy,
}

impl PipelineSettings {
    pub fn new(footage_dir: impl Into<PathBuf>, completion_trigger: impl Into<String>) -> Self {
        Self {
            footage_dir: footage_dir.into(),
            completion_trigger: completion_trigger.into(),
            ladder: Ladder::standard(),
            upload: UploadConfig::default(),
            iframe_strategy: IframeStrategy::default(),
        }
    }
}

/// What happened to one task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task_id: String,
    pub trace: ProgressTrace,
    pub uploaded: usize,
    pub result: Result<(), PipelineError>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-task scratch directory, removed when the guard drops on every exit path.
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// `None` when an id could resolve outside `footage_dir`.
    fn new(footage_dir: &Path, asset: &AssetRef) -> Option<Self> {
        asset.has_safe_ids().then(|| Self {
            path: footage_dir.join(&asset.user_id).join(&asset.asset_id),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "removed working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove working directory"),
        }
    }
}

pub struct Pipeline<S, P, E> {
    transport: S,
    content: S,
    recorder: ProgressRecorder<P>,
    encoder: E,
    settings: PipelineSettings,
}

impl<S, P, E> Pipeline<S, P, E>
where
    S: ObjectStore + Clone + 'static,
    P: ProgressRepository,
    E: EncoderPort,
{
    /// `transport` holds the uploaded sources, `content` receives the packaged asset.
    pub fn new(transport: S, content: S, progress: P, encoder: E, settings: PipelineSettings) -> Self {
        Self {
            transport,
            content,
            recorder: ProgressRecorder::new(progress),
            encoder,
            settings,
        }
    }

    /// Processes tasks one at a time, in order. A failed task never stops the batch.
    pub async fn run_batch(&self, tasks: &[Task]) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            info!(task_id = %task.task_id, position = i + 1, total = tasks.len(), "starting task");
            outcomes.push(self.run(task).await);
        }
        outcomes
    }

    pub async fn run(&self, task: &Task) -> TaskOutcome {
        let asset = task.asset();
        let workdir = WorkDir::new(&self.settings.footage_dir, &asset);
        let mut trace = ProgressTrace::new();
        let mut uploaded = 0;

        info!(
            task_id = %task.task_id,
            user_id = %asset.user_id,
            asset_id = %asset.asset_id,
            input_key = %task.input_key,
            output_key = %task.output_key,
            "processing task"
        );

        let result = self
            .execute(task, &asset, workdir.as_ref(), &mut trace, &mut uploaded)
            .await;
        drop(workdir);

        match &result {
            Ok(()) => info!(task_id = %task.task_id, uploaded, "task complete\n{}", trace),
            Err(e) => error!(task_id = %task.task_id, error = %e, "task failed\n{}", trace),
        }

        TaskOutcome {
            task_id: task.task_id.clone(),
            trace,
            uploaded,
            result,
        }
    }

    async fn execute(
        &self,
        task: &Task,
        asset: &AssetRef,
        workdir: Option<&WorkDir>,
        trace: &mut ProgressTrace,
        uploaded: &mut usize,
    ) -> Result<(), PipelineError> {
        let body = self
            .stage(asset, trace, Stage::Download, async {
                self.transport
                    .download(&task.input_key)
                    .await
                    .map_err(|source| PipelineError::Download {
                        key: task.input_key.clone(),
                        source,
                    })
            })
            .await?;

        let input = self
            .stage(asset, trace, Stage::WriteToStorage, async {
                let dir = workdir
                    .ok_or_else(|| PipelineError::UnsafeAssetIds {
                        user_id: asset.user_id.clone(),
                        asset_id: asset.asset_id.clone(),
                    })?
                    .path();
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|source| PipelineError::Io {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                let input = dir.join(INPUT_FILE_NAME);
                tokio::fs::write(&input, &body)
                    .await
                    .map_err(|source| PipelineError::Io {
                        path: input.clone(),
                        source,
                    })?;
                info!(path = %input.display(), bytes = body.len(), "staged source");
                Ok(input)
            })
            .await?;
        drop(body);

        let coordinator = self
            .stage(asset, trace, Stage::TranscodeInitialize, async {
                TranscodingCoordinator::new(
                    &input,
                    self.settings.ladder.clone(),
                    &self.encoder,
                    self.settings.iframe_strategy,
                )
                .await
                .map_err(PipelineError::Probe)
            })
            .await?;

        let encoded = |stage| move |source| PipelineError::Encoder { stage, source };
        self.stage(asset, trace, Stage::GenerateThumbnail, async {
            coordinator
                .generate_thumbnail()
                .await
                .map_err(encoded(Stage::GenerateThumbnail))
        })
        .await?;
        self.stage(asset, trace, Stage::GenerateRenditions, async {
            coordinator
                .generate_renditions()
                .await
                .map_err(encoded(Stage::GenerateRenditions))
        })
        .await?;
        self.stage(asset, trace, Stage::GenerateHls, async {
            coordinator
                .generate_hls()
                .await
                .map_err(encoded(Stage::GenerateHls))
        })
        .await?;
        self.stage(asset, trace, Stage::GenerateIframe, async {
            coordinator
                .generate_iframe_playlists()
                .await
                .map_err(encoded(Stage::GenerateIframe))
        })
        .await?;

        let file_count = self
            .stage(asset, trace, Stage::Upload, async {
                let manager =
                    UploadManager::new(self.content.clone(), asset.clone(), self.settings.upload);
                let (count, failure) = manager
                    .upload_all(&coordinator.paths().base_dir)
                    .await
                    .into_parts();
                *uploaded = count;
                self.recorder.record_file_count(asset, count).await;
                match failure {
                    None => Ok(count),
                    Some(source) => Err(PipelineError::PartialUpload {
                        uploaded: count,
                        source,
                    }),
                }
            })
            .await?;

        self.stage(asset, trace, Stage::CompletionMarker, async {
            let key = asset.object_key(&self.settings.completion_trigger);
            let marker = CompletionMarker::new(asset, file_count, Utc::now()).to_json()?;
            self.content
                .upload(&key, Bytes::from(marker), MARKER_CONTENT_TYPE)
                .await
                .map_err(|source| PipelineError::Store {
                    key: key.clone(),
                    source,
                })?;
            info!(key = %key, file_count, "wrote completion marker");
            Ok(())
        })
        .await
    }

    /// Times one stage, seals its record, and reports the transition. On
    /// failure the current-stage pointer stays on the failed stage.
    async fn stage<T, F>(
        &self,
        asset: &AssetRef,
        trace: &mut ProgressTrace,
        stage: Stage,
        work: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let timer = StageTimer::start(stage);
        let result = work.await;
        let record = timer.finish(result.as_ref().err().map(ToString::to_string));

        let next = if record.succeeded() {
            info!(stage = %stage, duration_secs = record.duration.as_secs_f64(), "stage completed");
            stage.next()
        } else {
            warn!(stage = %stage, duration_secs = record.duration.as_secs_f64(), "stage failed");
            stage
        };

        self.recorder.record_transition(asset, &record, next).await;
        trace.push(record);
        result
    }
}
