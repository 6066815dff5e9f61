//! Progress records as JSON documents on local disk.

use crate::domain::progress::{Stage, StageRecord};
use crate::domain::task::AssetRef;
use crate::ports::repository::ProgressRepository;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One `<dir>/<userId>/<assetId>.json` document per asset, shaped like the
/// DynamoDB item: `{userId, assetId, progress: {...}}`.
#[derive(Clone, Debug)]
pub struct JsonProgressStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn document_path(&self, asset: &AssetRef) -> PathBuf {
        self.dir
            .join(&asset.user_id)
            .join(format!("{}.json", asset.asset_id))
    }

    pub async fn read(&self, asset: &AssetRef) -> Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        let path = self.document_path(asset);
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert<F>(&self, asset: &AssetRef, apply: F) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        F: FnOnce(&mut Map<String, Value>) + Send,
    {
        let _guard = self.lock.lock().await;

        let mut doc = self
            .read(asset)
            .await?
            .unwrap_or_else(|| json!({ "userId": asset.user_id, "assetId": asset.asset_id }));
        let root = doc
            .as_object_mut()
            .ok_or("progress document is not a JSON object")?;
        let progress = root
            .entry("progress")
            .or_insert_with(|| Value::Object(Map::new()));
        if !progress.is_object() {
            *progress = Value::Object(Map::new());
        }
        if let Some(progress) = progress.as_object_mut() {
            apply(progress);
            progress.insert(
                "updatedAt".to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }

        write_atomically(&self.document_path(asset), &serde_json::to_vec_pretty(&doc)?).await
    }
}

async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn stage_document(record: &StageRecord) -> Value {
    json!({
        "status": record.status().as_str(),
        "startTime": record.start_time(),
        "endTime": record.end_time(),
        "durationSecs": record.duration.as_secs_f64(),
        "error": record.error,
    })
}

#[async_trait]
impl ProgressRepository for JsonProgressStore {
    async fn update_stage(
        &self,
        asset: &AssetRef,
        record: &StageRecord,
        next: Stage,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let stage_doc = stage_document(record);
        let stage = record.stage;
        self.upsert(asset, move |progress| {
            progress.insert(stage.as_str().to_string(), stage_doc);
            progress.insert(
                "currentStage".to_string(),
                Value::String(next.as_str().to_string()),
            );
        })
        .await
    }

    async fn update_file_count(
        &self,
        asset: &AssetRef,
        count: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.upsert(asset, move |progress| {
            progress.insert("totalFiles".to_string(), json!(count));
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::StageTimer;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stage_updates_merge_into_one_document() {
        let dir = tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path());
        let asset = AssetRef::new("u1", "a1");

        let download = StageTimer::start(Stage::Download).finish(None);
        store.update_stage(&asset, &download, Stage::WriteToStorage).await.unwrap();

        let write = StageTimer::start(Stage::WriteToStorage).finish(Some("disk full".into()));
        store.update_stage(&asset, &write, Stage::TranscodeInitialize).await.unwrap();
        store.update_file_count(&asset, 7).await.unwrap();

        let doc = store.read(&asset).await.unwrap().unwrap();
        assert_eq!(doc["userId"], "u1");
        assert_eq!(doc["assetId"], "a1");
        assert_eq!(doc["progress"]["download"]["status"], "COMPLETED");
        assert_eq!(doc["progress"]["download"]["error"], Value::Null);
        assert_eq!(doc["progress"]["write-to-storage"]["status"], "FAILED");
        assert_eq!(doc["progress"]["write-to-storage"]["error"], "disk full");
        assert_eq!(doc["progress"]["currentStage"], "transcode-initialize");
        assert_eq!(doc["progress"]["totalFiles"], 7);
        assert!(doc["progress"]["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_repeated_update_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path());
        let asset = AssetRef::new("u1", "a2");
        let record = StageTimer::start(Stage::Upload).finish(None);

        store.update_stage(&asset, &record, Stage::CompletionMarker).await.unwrap();
        let first = store.read(&asset).await.unwrap().unwrap();
        store.update_stage(&asset, &record, Stage::CompletionMarker).await.unwrap();
        let second = store.read(&asset).await.unwrap().unwrap();

        assert_eq!(first["progress"]["upload"], second["progress"]["upload"]);
        assert_eq!(second["progress"]["currentStage"], "completion-marker");
    }

    #[tokio::test]
    async fn test_missing_document_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path());
        assert!(store.read(&AssetRef::new("u", "a")).await.unwrap().is_none());
    }
}
