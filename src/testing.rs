//! In-memory stand-ins for the ports, shared by the unit tests.

use crate::domain::media::{ProbeFormat, ProbeReport, ProbeStream};
use crate::domain::paths::INIT_SEGMENT_NAME;
use crate::domain::progress::{Stage, StageRecord, StageStatus};
use crate::domain::task::AssetRef;
use crate::ports::encoder::{EncoderError, EncoderPort, Invocation};
use crate::ports::repository::ProgressRepository;
use crate::ports::storage::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Segments written per scripted HLS invocation.
pub const SCRIPTED_SEGMENTS: usize = 5;

pub fn sample_probe(duration: f64, width: u32, height: u32, has_audio: bool) -> ProbeReport {
    let mut streams = vec![ProbeStream {
        codec_type: "video".to_string(),
        codec_name: "h264".to_string(),
        width,
        height,
        r_frame_rate: Some("30/1".to_string()),
        ..Default::default()
    }];
    if has_audio {
        streams.push(ProbeStream {
            codec_type: "audio".to_string(),
            codec_name: "aac".to_string(),
            ..Default::default()
        });
    }
    ProbeReport {
        format: ProbeFormat {
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: Some(format!("{duration:.6}")),
            bit_rate: Some("5000000".to_string()),
            ..Default::default()
        },
        streams,
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<HashMap<String, (Bytes, String)>>>,
    failing: Option<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads to keys containing `pattern` fail.
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.failing = Some(pattern.to_string());
        self
    }

    pub fn insert(&self, key: &str, body: Bytes) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, "application/octet-stream".to_string()));
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn download(&self, key: &str) -> Result<Bytes, Box<dyn Error + Send + Sync>> {
        self.get(key).ok_or_else(|| format!("no such key: {key}").into())
    }

    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.failing.as_deref().is_some_and(|p| key.contains(p)) {
            return Err(format!("injected failure for {key}").into());
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProgress {
    stages: Arc<Mutex<Vec<(Stage, StageStatus)>>>,
    current: Arc<Mutex<Option<Stage>>>,
    files: Arc<Mutex<Option<usize>>>,
}

impl InMemoryProgress {
    pub fn current_stage(&self) -> Option<Stage> {
        *self.current.lock().unwrap()
    }

    pub fn file_count(&self) -> Option<usize> {
        *self.files.lock().unwrap()
    }

    pub fn last_status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| *status)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgress {
    async fn update_stage(
        &self,
        _asset: &AssetRef,
        record: &StageRecord,
        next: Stage,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.stages.lock().unwrap().push((record.stage, record.status()));
        *self.current.lock().unwrap() = Some(next);
        Ok(())
    }

    async fn update_file_count(
        &self,
        _asset: &AssetRef,
        count: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        *self.files.lock().unwrap() = Some(count);
        Ok(())
    }
}

/// Progress store whose every write fails.
pub struct FailingProgress;

#[async_trait]
impl ProgressRepository for FailingProgress {
    async fn update_stage(
        &self,
        _asset: &AssetRef,
        _record: &StageRecord,
        _next: Stage,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("progress table unavailable".into())
    }

    async fn update_file_count(
        &self,
        _asset: &AssetRef,
        _count: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("progress table unavailable".into())
    }
}

/// Encoder that writes the files ffmpeg would produce instead of encoding.
///
/// Probing a zero-byte file fails the way ffprobe does.
#[derive(Clone)]
pub struct ScriptedEncoder {
    report: ProbeReport,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl Default for ScriptedEncoder {
    fn default() -> Self {
        Self::with_report(sample_probe(10.0, 1920, 1080, true))
    }
}

impl ScriptedEncoder {
    pub fn with_report(report: ProbeReport) -> Self {
        Self {
            report,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

async fn touch(path: &Path) -> Result<(), EncoderError> {
    tokio::fs::write(path, b"scripted")
        .await
        .map_err(|source| EncoderError::Spawn {
            program: "scripted".to_string(),
            operation: path.display().to_string(),
            source,
        })
}

#[async_trait]
impl EncoderPort for ScriptedEncoder {
    async fn probe(&self, input: &Path) -> Result<ProbeReport, EncoderError> {
        let len = tokio::fs::metadata(input).await.map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(EncoderError::Exit {
                operation: "probe".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("{}: Invalid data found when processing input", input.display()),
            });
        }
        Ok(self.report.clone())
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), EncoderError> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let output = invocation.output().ok_or_else(|| EncoderError::Exit {
            operation: invocation.operation().to_string(),
            status: "exit status: 1".to_string(),
            stderr: "no output file".to_string(),
        })?;

        if let Some(pattern) = invocation.value_of("-hls_segment_filename") {
            let pattern = pattern.to_string_lossy().into_owned();
            for i in 0..SCRIPTED_SEGMENTS {
                touch(Path::new(&pattern.replace("%03d", &format!("{i:03}")))).await?;
            }
            if let Some(dir) = output.parent() {
                touch(&dir.join(INIT_SEGMENT_NAME)).await?;
            }
        }
        touch(output).await
    }
}
