//! Per-stage timing and outcome bookkeeping for one task.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Canonical stage names, shared by the orchestrator and every progress store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Download,
    WriteToStorage,
    TranscodeInitialize,
    GenerateThumbnail,
    GenerateRenditions,
    GenerateHls,
    GenerateIframe,
    Upload,
    CompletionMarker,
    Done,
}

impl Stage {
    pub const PIPELINE: [Stage; 9] = [
        Stage::Download,
        Stage::WriteToStorage,
        Stage::TranscodeInitialize,
        Stage::GenerateThumbnail,
        Stage::GenerateRenditions,
        Stage::GenerateHls,
        Stage::GenerateIframe,
        Stage::Upload,
        Stage::CompletionMarker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::WriteToStorage => "write-to-storage",
            Stage::TranscodeInitialize => "transcode-initialize",
            Stage::GenerateThumbnail => "generate-thumbnail",
            Stage::GenerateRenditions => "generate-renditions",
            Stage::GenerateHls => "generate-hls",
            Stage::GenerateIframe => "generate-iframe",
            Stage::Upload => "upload",
            Stage::CompletionMarker => "completion-marker",
            Stage::Done => "done",
        }
    }

    /// The stage that follows this one in a successful run.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Download => Stage::WriteToStorage,
            Stage::WriteToStorage => Stage::TranscodeInitialize,
            Stage::TranscodeInitialize => Stage::GenerateThumbnail,
            Stage::GenerateThumbnail => Stage::GenerateRenditions,
            Stage::GenerateRenditions => Stage::GenerateHls,
            Stage::GenerateHls => Stage::GenerateIframe,
            Stage::GenerateIframe => Stage::Upload,
            Stage::Upload => Stage::CompletionMarker,
            Stage::CompletionMarker | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "COMPLETED",
            StageStatus::Failed => "FAILED",
        }
    }
}

/// Open stage. Consumed by [`StageTimer::finish`], so a record is sealed once.
#[derive(Debug)]
pub struct StageTimer {
    stage: Stage,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl StageTimer {
    pub fn start(stage: Stage) -> Self {
        Self {
            stage,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn finish(self, error: Option<String>) -> StageRecord {
        let duration = self.clock.elapsed();
        StageRecord {
            stage: self.stage,
            started_at: self.started_at,
            ended_at: self.started_at
                + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero()),
            duration,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl StageRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> StageStatus {
        if self.succeeded() {
            StageStatus::Completed
        } else {
            StageStatus::Failed
        }
    }

    /// Millisecond UTC timestamp, e.g. `2024-05-01T12:30:00.123Z`.
    pub fn start_time(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn end_time(&self) -> String {
        self.ended_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Append-only list of sealed stage records for one task.
#[derive(Debug, Clone, Default)]
pub struct ProgressTrace {
    records: Vec<StageRecord>,
}

impl ProgressTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&StageRecord> {
        self.records.last()
    }

    pub fn get(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.iter().find(|r| r.stage == stage)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.records.iter().find(|r| !r.succeeded()).map(|r| r.stage)
    }

    pub fn total_duration(&self) -> Duration {
        self.records.iter().map(|r| r.duration).sum()
    }
}

impl fmt::Display for ProgressTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processing summary")?;
        writeln!(f, "  total duration: {:.2}s", self.total_duration().as_secs_f64())?;
        writeln!(f, "  failed stage: {}", self.failed_stage().map_or("none", |s| s.as_str()))?;
        for record in &self.records {
            let status = match &record.error {
                None => "ok".to_string(),
                Some(err) => format!("failed: {}", err),
            };
            writeln!(
                f,
                "  {:<22} | {:>8} | {}",
                record.stage.as_str(),
                format!("{:.2}s", record.duration.as_secs_f64()),
                status
            )?;
        }
        Ok(())
    }
}
