//! Resolution ladder shared by every packaging stage of a task.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("resolution ladder is empty")]
    Empty,
    #[error("duplicate rung name {0}")]
    DuplicateName(String),
    #[error("rung {name} has malformed bitrate {bitrate:?}, expected e.g. \"3000k\"")]
    MalformedBitrate { name: String, bitrate: String },
    #[error("rung {0} has a zero dimension")]
    ZeroDimension(String),
}

fn bitrate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([1-9][0-9]*)k$").expect("static bitrate pattern"))
}

/// Parses `"3000k"` into `3000`. Anything else yields `None`.
pub fn parse_kbps(bitrate: &str) -> Option<u64> {
    bitrate_pattern()
        .captures(bitrate)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rung {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: String,
}

impl Rung {
    pub fn new(name: &str, width: u32, height: u32, bitrate: &str) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            bitrate: bitrate.to_string(),
        }
    }

    pub fn kbps(&self) -> u64 {
        // Ladder construction rejects rungs that do not parse.
        parse_kbps(&self.bitrate).unwrap_or(0)
    }

    /// Bits per second advertised in the master playlist.
    pub fn bandwidth(&self) -> u64 {
        self.kbps() * 1000
    }

    /// Keyframe-only streams are advertised at a quarter of the rendition bandwidth.
    pub fn iframe_bandwidth(&self) -> u64 {
        self.bandwidth() / 4
    }

    /// Encoder VBV buffer, twice the target bitrate.
    pub fn bufsize(&self) -> String {
        format!("{}k", self.kbps() * 2)
    }
}

/// Ordered rungs, highest quality first. Order is the manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    rungs: Vec<Rung>,
}

impl Ladder {
    pub fn new(rungs: Vec<Rung>) -> Result<Self, LadderError> {
        if rungs.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut seen = HashSet::new();
        for rung in &rungs {
            if !seen.insert(rung.name.as_str()) {
                return Err(LadderError::DuplicateName(rung.name.clone()));
            }
            if parse_kbps(&rung.bitrate).is_none() {
                return Err(LadderError::MalformedBitrate {
                    name: rung.name.clone(),
                    bitrate: rung.bitrate.clone(),
                });
            }
            if rung.width == 0 || rung.height == 0 {
                return Err(LadderError::ZeroDimension(rung.name.clone()));
            }
        }

        Ok(Self { rungs })
    }

    /// 1080p, 720p, 480p, 360p.
    pub fn standard() -> Self {
        Self {
            rungs: vec![
                Rung::new("1080p", 1920, 1080, "3000k"),
                Rung::new("720p", 1280, 720, "2000k"),
                Rung::new("480p", 854, 480, "800k"),
                Rung::new("360p", 640, 360, "400k"),
            ],
        }
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rung> {
        self.rungs.iter()
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}

impl<'a> IntoIterator for &'a Ladder {
    type Item = &'a Rung;
    type IntoIter = std::slice::Iter<'a, Rung>;

    fn into_iter(self) -> Self::IntoIter {
        self.rungs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kbps() {
        assert_eq!(parse_kbps("3000k"), Some(3000));
        assert_eq!(parse_kbps("400k"), Some(400));
        assert_eq!(parse_kbps("0k"), None);
        assert_eq!(parse_kbps("3000"), None);
        assert_eq!(parse_kbps("-5k"), None);
        assert_eq!(parse_kbps("3M"), None);
        assert_eq!(parse_kbps(""), None);
    }

    #[test]
    fn test_bandwidth_derivation() {
        let rung = Rung::new("480p", 854, 480, "800k");
        assert_eq!(rung.bandwidth(), 800_000);
        assert_eq!(rung.iframe_bandwidth(), 200_000);
        assert_eq!(rung.bufsize(), "1600k");
    }

    #[test]
    fn test_iframe_bandwidth_uses_integer_division() {
        let rung = Rung::new("odd", 10, 10, "1k");
        assert_eq!(rung.bandwidth(), 1000);
        assert_eq!(rung.iframe_bandwidth(), 250);

        let rung = Rung::new("odd", 10, 10, "3k");
        assert_eq!(rung.iframe_bandwidth(), 750);
    }

    #[test]
    fn test_standard_ladder_is_valid_and_ordered() {
        let standard = Ladder::standard();
        let rebuilt = Ladder::new(standard.rungs().to_vec()).unwrap();
        let names: Vec<_> = rebuilt.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["1080p", "720p", "480p", "360p"]);
    }

    #[test]
    fn test_ladder_rejects_duplicates() {
        let err = Ladder::new(vec![
            Rung::new("720p", 1280, 720, "2000k"),
            Rung::new("720p", 1280, 720, "1500k"),
        ])
        .unwrap_err();
        assert_eq!(err, LadderError::DuplicateName("720p".to_string()));
    }

    #[test]
    fn test_ladder_rejects_bad_bitrate() {
        let err = Ladder::new(vec![Rung::new("720p", 1280, 720, "2mbps")]).unwrap_err();
        assert!(matches!(err, LadderError::MalformedBitrate { .. }));
    }

    #[test]
    fn test_ladder_rejects_empty() {
        assert_eq!(Ladder::new(vec![]).unwrap_err(), LadderError::Empty);
    }
}
