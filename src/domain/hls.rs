//! Adaptive-bitrate master playlists.
//!
//! Both playlists are rebuilt in full from the ladder on every packaging run.

use crate::domain::ladder::{Ladder, Rung};
use crate::domain::paths::{IFRAME_PLAYLIST_NAME, STREAM_PLAYLIST_NAME};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const VERSION: u8 = 6;
const FRAME_RATE: &str = "30";
const VIDEO_CODEC: &str = "avc1.640028";
const AUDIO_CODEC: &str = "mp4a.40.2";
const AUDIO_GROUP: &str = "audio";

fn header() -> Vec<String> {
    vec![
        "#EXTM3U".to_string(),
        format!("#EXT-X-VERSION:{}", VERSION),
        String::new(),
    ]
}

fn finish(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

async fn write_text(text: &str, path: &Path) -> Result<(), std::io::Error> {
    let mut file = File::create(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await
}

pub struct MasterPlaylist<'a> {
    pub ladder: &'a Ladder,
    pub has_audio: bool,
}

impl<'a> MasterPlaylist<'a> {
    pub fn new(ladder: &'a Ladder, has_audio: bool) -> Self {
        Self { ladder, has_audio }
    }

    fn stream_inf(&self, rung: &Rung) -> String {
        let mut line = format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},FRAME-RATE={},",
            rung.bandwidth(),
            rung.width,
            rung.height,
            FRAME_RATE
        );
        if self.has_audio {
            line.push_str(&format!(
                "CODECS=\"{},{}\",AUDIO=\"{}\"",
                VIDEO_CODEC, AUDIO_CODEC, AUDIO_GROUP
            ));
        } else {
            line.push_str(&format!("CODECS=\"{}\"", VIDEO_CODEC));
        }
        line
    }

    pub fn render(&self) -> String {
        let mut lines = header();

        if self.has_audio {
            lines.push(format!(
                "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"{}\",NAME=\"Original\",\
                 DEFAULT=YES,AUTOSELECT=YES,LANGUAGE=\"und\",\
                 CHANNELS=\"2\",URI=\"audio/{}\"",
                AUDIO_GROUP, STREAM_PLAYLIST_NAME
            ));
            lines.push(String::new());
        }

        for rung in self.ladder {
            lines.push(self.stream_inf(rung));
            lines.push(format!("video/{}/{}", rung.name, STREAM_PLAYLIST_NAME));
        }

        finish(lines)
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        write_text(&self.render(), path).await
    }
}

pub struct IframeMasterPlaylist<'a> {
    pub ladder: &'a Ladder,
}

impl<'a> IframeMasterPlaylist<'a> {
    pub fn new(ladder: &'a Ladder) -> Self {
        Self { ladder }
    }

    pub fn render(&self) -> String {
        let mut lines = header();

        for rung in self.ladder {
            lines.push(format!(
                "#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},CODECS=\"{}\",URI=\"iframe/{}/{}\"",
                rung.iframe_bandwidth(),
                rung.width,
                rung.height,
                VIDEO_CODEC,
                rung.name,
                IFRAME_PLAYLIST_NAME
            ));
        }

        finish(lines)
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        write_text(&self.render(), path).await
    }
}
