//! Facts about the source asset, derived from the prober's JSON report.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

const SUPPORTED_CONTAINERS: &[&str] = &["mp4", "mov", "avi", "mkv"];
const SUPPORTED_VIDEO_CODECS: &[&str] = &["h264", "hevc", "vp8", "vp9"];
const SUPPORTED_AUDIO_CODECS: &[&str] = &["aac", "mp3", "opus"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no video streams found")]
    NoVideoStream,
    #[error("video stream reports invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("invalid media duration {0:?}")]
    InvalidDuration(Option<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub format_name: String,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub display_aspect_ratio: Option<String>,
    pub r_frame_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub nb_frames: Option<String>,
    pub color_space: Option<String>,
}

/// `ffprobe -print_format json -show_format -show_streams` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeReport {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub has_audio: bool,
    pub is_vertical: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalMetadata {
    pub container_format: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub duration_secs: u64,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f64>,
    pub resolution: String,
    pub aspect_ratio: Option<String>,
    pub color_space: Option<String>,
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub container_format: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container_supported: bool,
    pub video_codec_supported: bool,
    pub audio_codec_supported: bool,
}

impl ValidationReport {
    pub fn is_supported(&self) -> bool {
        self.container_supported && self.video_codec_supported && self.audio_codec_supported
    }
}

impl ProbeReport {
    pub fn from_json(raw: &[u8]) -> Result<Self, ProbeError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }

    pub fn duration(&self) -> Option<f64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    pub fn video_info(&self) -> Result<VideoInfo, ProbeError> {
        let video = self.video_stream().ok_or(ProbeError::NoVideoStream)?;
        if video.width == 0 || video.height == 0 {
            return Err(ProbeError::InvalidDimensions {
                width: video.width,
                height: video.height,
            });
        }
        let duration = self
            .duration()
            .ok_or_else(|| ProbeError::InvalidDuration(self.format.duration.clone()))?;

        Ok(VideoInfo {
            width: video.width,
            height: video.height,
            duration,
            has_audio: self.audio_stream().is_some(),
            is_vertical: video.height > video.width,
        })
    }

    fn primary_container(&self) -> String {
        self.format
            .format_name
            .split(',')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    pub fn technical_metadata(&self) -> TechnicalMetadata {
        let video = self.video_stream();
        let audio = self.audio_stream();

        TechnicalMetadata {
            container_format: self.primary_container(),
            video_codec: video.map(|s| s.codec_name.clone()),
            audio_codec: audio.map(|s| s.codec_name.clone()),
            duration_secs: self.duration().map(|d| d as u64).unwrap_or(0),
            bitrate: self.format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            frame_rate: video
                .and_then(|s| s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            resolution: video
                .map(|s| format!("{}x{}", s.width, s.height))
                .unwrap_or_else(|| "0x0".to_string()),
            aspect_ratio: video.and_then(|s| s.display_aspect_ratio.clone()),
            color_space: video.and_then(|s| s.color_space.clone()),
            creation_time: self.format.tags.get("creation_time").cloned(),
        }
    }

    /// Checks the container against the input's file extension, falling back
    /// to the prober's detected format names.
    pub fn validate(&self, extension: Option<&str>) -> ValidationReport {
        let container = extension
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| self.format.format_name.clone());
        let video_codec = self.video_stream().map(|s| s.codec_name.to_ascii_lowercase());
        let audio_codec = self.audio_stream().map(|s| s.codec_name.to_ascii_lowercase());

        ValidationReport {
            container_supported: SUPPORTED_CONTAINERS.iter().any(|f| container.contains(f)),
            video_codec_supported: video_codec
                .as_deref()
                .is_some_and(|c| SUPPORTED_VIDEO_CODECS.contains(&c)),
            audio_codec_supported: audio_codec
                .as_deref()
                .is_some_and(|c| SUPPORTED_AUDIO_CODECS.contains(&c)),
            container_format: container,
            video_codec,
            audio_codec,
        }
    }
}

/// `"30000/1001"` -> 29.97
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    (den > 0.0).then(|| num / den)
}

impl fmt::Display for TechnicalMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let na = "N/A";
        write!(
            f,
            "container={} video={} audio={} duration={}s bitrate={} fps={} resolution={} aspect={} color_space={}",
            self.container_format,
            self.video_codec.as_deref().unwrap_or(na),
            self.audio_codec.as_deref().unwrap_or(na),
            self.duration_secs,
            self.bitrate
                .map(|b| format!("{:.2}Mbps", b as f64 / 1_000_000.0))
                .unwrap_or_else(|| na.to_string()),
            self.frame_rate
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| na.to_string()),
            self.resolution,
            self.aspect_ratio.as_deref().unwrap_or(na),
            self.color_space.as_deref().unwrap_or(na),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDSCAPE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "display_aspect_ratio": "16:9", "r_frame_rate": "30000/1001", "color_space": "bt709"},
            {"codec_type": "audio", "codec_name": "aac", "bit_rate": "128000"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.010000",
                   "bit_rate": "5000000", "tags": {"creation_time": "2024-01-01T00:00:00.000000Z"}}
    }"#;

    const VERTICAL_SILENT: &str = r#"{
        "streams": [{"codec_type": "video", "codec_name": "hevc", "width": 1080, "height": 1920}],
        "format": {"format_name": "mov,mp4", "duration": "4.5"}
    }"#;

    #[test]
    fn test_video_info_landscape_with_audio() {
        let report = ProbeReport::from_json(LANDSCAPE.as_bytes()).unwrap();
        let info = report.video_info().unwrap();

        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.duration - 10.01).abs() < 1e-9);
        assert!(info.has_audio);
        assert!(!info.is_vertical);
    }

    #[test]
    fn test_video_info_vertical_without_audio() {
        let report = ProbeReport::from_json(VERTICAL_SILENT.as_bytes()).unwrap();
        let info = report.video_info().unwrap();

        assert!(info.is_vertical);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_audio_only_source_is_rejected() {
        let raw = r#"{"streams":[{"codec_type":"audio","codec_name":"aac"}],"format":{"duration":"3.0"}}"#;
        let report = ProbeReport::from_json(raw.as_bytes()).unwrap();
        assert!(matches!(report.video_info(), Err(ProbeError::NoVideoStream)));
    }

    #[test]
    fn test_missing_duration_is_rejected() {
        let raw = r#"{"streams":[{"codec_type":"video","width":640,"height":360}],"format":{}}"#;
        let report = ProbeReport::from_json(raw.as_bytes()).unwrap();
        assert!(matches!(
            report.video_info(),
            Err(ProbeError::InvalidDuration(None))
        ));
    }

    #[test]
    fn test_garbage_output_is_parse_error() {
        assert!(matches!(
            ProbeReport::from_json(b"not json"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_technical_metadata() {
        let report = ProbeReport::from_json(LANDSCAPE.as_bytes()).unwrap();
        let meta = report.technical_metadata();

        assert_eq!(meta.container_format, "mov");
        assert_eq!(meta.video_codec.as_deref(), Some("h264"));
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert_eq!(meta.duration_secs, 10);
        assert_eq!(meta.bitrate, Some(5_000_000));
        assert!((meta.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(meta.resolution, "1920x1080");
        assert_eq!(meta.aspect_ratio.as_deref(), Some("16:9"));
        assert!(meta.creation_time.is_some());
    }

    #[test]
    fn test_validation_against_supported_sets() {
        let report = ProbeReport::from_json(LANDSCAPE.as_bytes()).unwrap();
        assert!(report.validate(Some("mp4")).is_supported());
        assert!(report.validate(None).is_supported());

        let silent = ProbeReport::from_json(VERTICAL_SILENT.as_bytes()).unwrap();
        let verdict = silent.validate(Some("mp4"));
        assert!(verdict.container_supported);
        assert!(verdict.video_codec_supported);
        assert!(!verdict.audio_codec_supported);
        assert!(!verdict.is_supported());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("junk"), None);
    }
}
