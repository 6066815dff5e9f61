use crate::domain::media::ProbeReport;
use crate::ports::encoder::{EncoderError, EncoderPort, Invocation};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Keep only the end of encoder diagnostics, which is where ffmpeg reports the failure.
const STDERR_TAIL_LINES: usize = 20;

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// `ffmpeg` / `ffprobe` command-line tools.
#[derive(Clone, Debug)]
pub struct FfmpegCli {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegCli {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegCli {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl EncoderPort for FfmpegCli {
    async fn probe(&self, input: &Path) -> Result<ProbeReport, EncoderError> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EncoderError::Spawn {
                program: self.ffprobe.display().to_string(),
                operation: "probe".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(EncoderError::Exit {
                operation: "probe".to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        ProbeReport::from_json(&output.stdout).map_err(|source| EncoderError::Probe {
            path: input.display().to_string(),
            source,
        })
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), EncoderError> {
        debug!(operation = invocation.operation(), args = ?invocation.arg_list(), "running ffmpeg");

        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-nostdin")
            .args(invocation.arg_list())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EncoderError::Spawn {
                program: self.ffmpeg.display().to_string(),
                operation: invocation.operation().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(EncoderError::Exit {
                operation: invocation.operation().to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let noisy: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(noisy.as_bytes());

        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = FfmpegCli::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");

        let err = cli.probe(Path::new("input")).await.unwrap_err();
        assert!(matches!(err, EncoderError::Spawn { .. }));

        let err = cli.run(&Invocation::new("thumbnail").arg("-y")).await.unwrap_err();
        match err {
            EncoderError::Spawn { operation, .. } => assert_eq!(operation, "thumbnail"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
