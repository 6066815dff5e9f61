use crate::domain::ladder::Rung;
use std::path::{Path, PathBuf};

pub const THUMBNAIL_NAME: &str = "thumbnail.png";
pub const AUDIO_TRACK_NAME: &str = "audio.m4a";
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const IFRAME_MASTER_PLAYLIST_NAME: &str = "master_iframe.m3u8";
pub const STREAM_PLAYLIST_NAME: &str = "stream.m3u8";
pub const IFRAME_PLAYLIST_NAME: &str = "iframe.m3u8";
pub const INIT_SEGMENT_NAME: &str = "init.mp4";
pub const SEGMENTS_DIR: &str = "segments";

/// Local output layout of one task, rooted next to the staged input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub base_dir: PathBuf,
    pub mp4_dir: PathBuf,
    pub hls_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl OutputPaths {
    /// `<dir>/<stem>_transcoded/{mp4,hls,assets,logs}`.
    pub fn for_input(input: &Path) -> Self {
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let base_dir = dir.join(format!("{stem}_transcoded"));

        Self {
            mp4_dir: base_dir.join("mp4"),
            hls_dir: base_dir.join("hls"),
            assets_dir: base_dir.join("assets"),
            logs_dir: base_dir.join("logs"),
            base_dir,
        }
    }

    pub fn layout_dirs(&self) -> [&Path; 4] {
        [&self.mp4_dir, &self.hls_dir, &self.assets_dir, &self.logs_dir]
    }

    pub fn thumbnail(&self) -> PathBuf {
        self.assets_dir.join(THUMBNAIL_NAME)
    }

    pub fn audio_track(&self) -> PathBuf {
        self.mp4_dir.join(AUDIO_TRACK_NAME)
    }

    pub fn rendition(&self, rung: &Rung) -> PathBuf {
        self.mp4_dir.join(format!("{}.mp4", rung.name))
    }

    pub fn video_stream_dir(&self, rung: &Rung) -> PathBuf {
        self.hls_dir.join("video").join(&rung.name)
    }

    pub fn audio_stream_dir(&self) -> PathBuf {
        self.hls_dir.join("audio")
    }

    pub fn iframe_dir(&self) -> PathBuf {
        self.hls_dir.join("iframe")
    }

    pub fn iframe_stream_dir(&self, rung: &Rung) -> PathBuf {
        self.iframe_dir().join(&rung.name)
    }

    pub fn master_playlist(&self) -> PathBuf {
        self.hls_dir.join(MASTER_PLAYLIST_NAME)
    }

    pub fn iframe_master_playlist(&self) -> PathBuf {
        self.hls_dir.join(IFRAME_MASTER_PLAYLIST_NAME)
    }
}
