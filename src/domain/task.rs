use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// One unit of batch work, read once from the batch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub user_id: String,
    pub asset_id: String,
    pub input_key: String,
    pub output_key: String,
}

impl Task {
    pub fn asset(&self) -> AssetRef {
        AssetRef {
            user_id: self.user_id.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

fn is_single_component(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Key of the durable progress record and prefix of every uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    pub user_id: String,
    pub asset_id: String,
}

impl AssetRef {
    pub fn new(user_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
        }
    }

    /// Both ids are used as directory names, so each must be exactly one
    /// plain path component.
    pub fn has_safe_ids(&self) -> bool {
        is_single_component(&self.user_id) && is_single_component(&self.asset_id)
    }

    /// `{userId}/{assetId}/{relative}` with forward slashes regardless of platform.
    pub fn object_key(&self, relative: &str) -> String {
        let relative = relative.replace('\\', "/");
        format!(
            "{}/{}/{}",
            self.user_id,
            self.asset_id,
            relative.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    Complete,
}

/// Final object of a successful task. Consumers outside the worker poll for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMarker {
    pub user_id: String,
    pub asset_id: String,
    pub timestamp: String,
    pub file_count: usize,
    pub status: MarkerStatus,
}

impl CompletionMarker {
    pub fn new(asset: &AssetRef, file_count: usize, at: DateTime<Utc>) -> Self {
        Self {
            user_id: asset.user_id.clone(),
            asset_id: asset.asset_id.clone(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            file_count,
            status: MarkerStatus::Complete,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ids_must_be_single_components() {
        assert!(AssetRef::new("user-1", "asset.1").has_safe_ids());
        assert!(!AssetRef::new("..", "precious").has_safe_ids());
        assert!(!AssetRef::new("u1", "../..").has_safe_ids());
        assert!(!AssetRef::new("u1", "a/b").has_safe_ids());
        assert!(!AssetRef::new("/etc", "a1").has_safe_ids());
        assert!(!AssetRef::new("", "a1").has_safe_ids());
        assert!(!AssetRef::new("u1", ".").has_safe_ids());
    }

    #[test]
    fn test_task_parses_camel_case_batch_entry() {
        let raw = r#"[{"taskId":"t1","userId":"u1","assetId":"a1","inputKey":"in/a1.mp4","outputKey":"out/a1"}]"#;
        let tasks: Vec<Task> = serde_json::from_str(raw).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "t1");
        assert_eq!(tasks[0].input_key, "in/a1.mp4");
        assert_eq!(tasks[0].asset(), AssetRef::new("u1", "a1"));
    }

    #[test]
    fn test_object_key_normalizes_separators() {
        let asset = AssetRef::new("u1", "a1");
        assert_eq!(
            asset.object_key("hls\\video\\720p\\stream.m3u8"),
            "u1/a1/hls/video/720p/stream.m3u8"
        );
        assert_eq!(asset.object_key("/completion.json"), "u1/a1/completion.json");
    }

    #[test]
    fn test_completion_marker_json_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let marker = CompletionMarker::new(&AssetRef::new("u1", "a1"), 42, at);
        let value: serde_json::Value = serde_json::from_slice(&marker.to_json().unwrap()).unwrap();

        assert_eq!(value["userId"], "u1");
        assert_eq!(value["assetId"], "a1");
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00Z");
        assert_eq!(value["fileCount"], 42);
        assert_eq!(value["status"], "complete");
    }
}
