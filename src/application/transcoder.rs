//! Drives the encoder through the fixed rendition sequence for one source file.
//!
//! The four operations must run in order: each reads files the previous one
//! wrote. Each one overwrites its own output, so re-running a step is safe.

use crate::domain::hls::{IframeMasterPlaylist, MasterPlaylist};
use crate::domain::ladder::{Ladder, Rung};
use crate::domain::media::VideoInfo;
use crate::domain::paths::{
    OutputPaths, IFRAME_PLAYLIST_NAME, INIT_SEGMENT_NAME, SEGMENTS_DIR, STREAM_PLAYLIST_NAME,
};
use crate::ports::encoder::{EncoderError, EncoderPort, Invocation};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const SEGMENT_SECONDS: &str = "2";
const IFRAME_SEGMENT_SECONDS: &str = "1";
const AUDIO_FILTER: &str = "loudnorm=I=-16:LRA=11:TP=-1.5";
const THUMBNAIL_FILTER: &str =
    "scale=w='min(1920,iw)':h='min(1080,ih)':force_original_aspect_ratio=decrease";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TranscodeError {
    let path = path.to_path_buf();
    move |source| TranscodeError::Io { path, source }
}

/// How the keyframe-only trick-play streams are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IframeStrategy {
    /// Stream-copy the closed-GOP rendition; its keyframes already land on
    /// segment boundaries.
    #[default]
    CopyClosedGop,
    /// Re-encode with every frame a keyframe and scene-cut detection off.
    ReencodeKeyframes,
}

pub struct TranscodingCoordinator<'a, E: EncoderPort> {
    input: PathBuf,
    ladder: Ladder,
    encoder: &'a E,
    strategy: IframeStrategy,
    info: VideoInfo,
    paths: OutputPaths,
}

impl<'a, E: EncoderPort> TranscodingCoordinator<'a, E> {
    /// Probes `input` and lays out the output tree next to it. A probe failure
    /// leaves the filesystem untouched.
    pub async fn new(
        input: &Path,
        ladder: Ladder,
        encoder: &'a E,
        strategy: IframeStrategy,
    ) -> Result<Self, TranscodeError> {
        let report = encoder.probe(input).await?;
        let info = report
            .video_info()
            .map_err(|source| EncoderError::Probe {
                path: input.display().to_string(),
                source,
            })?;

        info!(metadata = %report.technical_metadata(), "probed source");

        let extension = input.extension().and_then(|e| e.to_str());
        let verdict = report.validate(extension);
        if !verdict.is_supported() {
            warn!(
                container = %verdict.container_format,
                video_codec = ?verdict.video_codec,
                audio_codec = ?verdict.audio_codec,
                "source uses an unsupported container or codec, continuing"
            );
        }

        let paths = OutputPaths::for_input(input);
        for dir in paths.layout_dirs() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }

        Ok(Self {
            input: input.to_path_buf(),
            ladder,
            encoder,
            strategy,
            info,
            paths,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub async fn generate_thumbnail(&self) -> Result<(), TranscodeError> {
        let inv = Invocation::new("thumbnail")
            .args(["-y", "-ss"])
            .arg(format!("{:.2}", self.info.duration / 2.0))
            .arg("-i")
            .arg(&self.input)
            .args(["-frames:v", "1", "-f", "image2", "-vf", THUMBNAIL_FILTER, "-update", "1"])
            .arg(self.paths.thumbnail());
        self.encoder.run(&inv).await?;
        Ok(())
    }

    pub async fn generate_renditions(&self) -> Result<(), TranscodeError> {
        if self.info.has_audio {
            self.encoder.run(&self.audio_extraction()).await?;
        }
        for rung in &self.ladder {
            self.encoder.run(&self.rendition(rung)).await?;
            info!(rendition = %rung.name, "encoded rendition");
        }
        Ok(())
    }

    fn audio_extraction(&self) -> Invocation {
        Invocation::new("audio track")
            .arg("-i")
            .arg(&self.input)
            .args(["-vn", "-c:a", "aac", "-b:a", "128k", "-ar", "44100", "-ac", "2"])
            .args(["-af", AUDIO_FILTER, "-y"])
            .arg(self.paths.audio_track())
    }

    /// Scales the dominant dimension to the rung and lets the encoder pick an
    /// even value for the other one.
    fn scale_filter(&self, rung: &Rung) -> String {
        if self.info.is_vertical {
            format!("scale=-2:{}", rung.height)
        } else {
            format!("scale={}:-2", rung.width)
        }
    }

    fn rendition(&self, rung: &Rung) -> Invocation {
        Invocation::new(format!("rendition {}", rung.name))
            .arg("-i")
            .arg(&self.input)
            .args(["-an", "-c:v", "libx264"])
            .args(["-b:v", rung.bitrate.as_str(), "-maxrate", rung.bitrate.as_str()])
            .arg("-bufsize")
            .arg(rung.bufsize())
            .arg("-vf")
            .arg(self.scale_filter(rung))
            .args(["-preset", "veryfast", "-profile:v", "high", "-level", "4.1"])
            .args(["-keyint_min", "30", "-g", "60", "-sc_threshold", "0"])
            .args(["-movflags", "+faststart", "-pix_fmt", "yuv420p", "-y"])
            .arg(self.paths.rendition(rung))
    }

    pub async fn generate_hls(&self) -> Result<(), TranscodeError> {
        for rung in &self.ladder {
            let dir = self.paths.video_stream_dir(rung);
            prepare_stream_dir(&dir).await?;
            self.encoder.run(&self.video_segmenter(rung, &dir)).await?;
        }

        if self.info.has_audio {
            let dir = self.paths.audio_stream_dir();
            prepare_stream_dir(&dir).await?;
            let inv = Invocation::new("segment audio")
                .arg("-i")
                .arg(self.paths.audio_track())
                .args(["-c:a", "copy"])
                .args(hls_args(SEGMENT_SECONDS))
                .arg("-hls_segment_filename")
                .arg(dir.join(SEGMENTS_DIR).join("data%03d.m4s"))
                .arg("-y")
                .arg(dir.join(STREAM_PLAYLIST_NAME));
            self.encoder.run(&inv).await?;
        }

        let master = self.paths.master_playlist();
        MasterPlaylist::new(&self.ladder, self.info.has_audio)
            .write_to(&master)
            .await
            .map_err(io_err(&master))?;
        info!(path = %master.display(), "wrote master playlist");
        Ok(())
    }

    fn video_segmenter(&self, rung: &Rung, dir: &Path) -> Invocation {
        let mut inv = Invocation::new(format!("segment {}", rung.name))
            .arg("-i")
            .arg(self.paths.rendition(rung));
        if self.info.has_audio {
            inv = inv
                .arg("-i")
                .arg(self.paths.audio_track())
                .args(["-map", "0:v:0", "-map", "1:a:0"]);
        }
        inv.args(["-c:v", "copy"])
            .args(if self.info.has_audio { ["-c:a", "copy"] } else { ["-an", "-sn"] })
            .args(hls_args(SEGMENT_SECONDS))
            .arg("-hls_segment_filename")
            .arg(dir.join(SEGMENTS_DIR).join("data%03d.m4s"))
            .arg("-y")
            .arg(dir.join(STREAM_PLAYLIST_NAME))
    }

    pub async fn generate_iframe_playlists(&self) -> Result<(), TranscodeError> {
        for rung in &self.ladder {
            let dir = self.paths.iframe_stream_dir(rung);
            prepare_stream_dir(&dir).await?;
            self.encoder.run(&self.iframe_segmenter(rung, &dir)).await?;
        }

        let master = self.paths.iframe_master_playlist();
        IframeMasterPlaylist::new(&self.ladder)
            .write_to(&master)
            .await
            .map_err(io_err(&master))?;
        info!(path = %master.display(), "wrote iframe master playlist");
        Ok(())
    }

    fn iframe_segmenter(&self, rung: &Rung, dir: &Path) -> Invocation {
        let inv = Invocation::new(format!("iframe {}", rung.name))
            .arg("-i")
            .arg(self.paths.rendition(rung))
            .arg("-an");
        let inv = match self.strategy {
            IframeStrategy::CopyClosedGop => inv.args(["-c:v", "copy"]),
            IframeStrategy::ReencodeKeyframes => {
                let bitrate = format!("{}k", rung.kbps() / 4);
                inv.args(["-c:v", "libx264", "-preset", "veryfast"])
                    .args(["-b:v", bitrate.as_str(), "-maxrate", bitrate.as_str()])
                    .args(["-g", "1", "-keyint_min", "1", "-sc_threshold", "0"])
                    .args(["-pix_fmt", "yuv420p"])
            }
        };
        inv.args(hls_args(IFRAME_SEGMENT_SECONDS))
            .arg("-hls_segment_filename")
            .arg(dir.join(SEGMENTS_DIR).join("iframe%03d.m4s"))
            .arg("-y")
            .arg(dir.join(IFRAME_PLAYLIST_NAME))
    }
}

fn hls_args(segment_seconds: &str) -> Vec<&str> {
    vec![
        "-f",
        "hls",
        "-hls_time",
        segment_seconds,
        "-hls_playlist_type",
        "vod",
        "-hls_flags",
        "independent_segments",
        "-hls_segment_type",
        "fmp4",
        "-hls_fmp4_init_filename",
        INIT_SEGMENT_NAME,
        "-hls_list_size",
        "0",
        "-start_number",
        "0",
    ]
}

/// The encoder writes segments into `segments/` but does not create it.
async fn prepare_stream_dir(dir: &Path) -> Result<(), TranscodeError> {
    let segments = dir.join(SEGMENTS_DIR);
    tokio::fs::create_dir_all(&segments)
        .await
        .map_err(io_err(&segments))
}
