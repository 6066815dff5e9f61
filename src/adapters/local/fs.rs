use crate::ports::storage::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::error::Error;
use std::path::{Component, Path, PathBuf};

/// Object store backed by a directory: key `a/b/c` lives at `<root>/a/b/c`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        if !key_is_valid(key) {
            return Err(format!("invalid object key {:?}", key).into());
        }
        Ok(self.root.join(key))
    }
}

/// Keys must stay below the root: no parent or absolute components.
fn key_is_valid(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download(&self, key: &str) -> Result<Bytes, Box<dyn Error + Send + Sync>> {
        let path = self.resolve(key)?;
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_valid_key() {
        assert!(key_is_valid("u1/a1/hls/master.m3u8"));
        assert!(key_is_valid("./uploads/clip.mp4"));
    }

    #[test]
    fn test_invalid_key_with_parent() {
        assert!(!key_is_valid("../escape"));
        assert!(!key_is_valid("u1/../../escape"));
    }

    #[test]
    fn test_invalid_key_with_root() {
        assert!(!key_is_valid("/etc/passwd"));
        assert!(!key_is_valid(""));
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .upload("u1/a1/hls/master.m3u8", Bytes::from_static(b"#EXTM3U\n"), "application/vnd.apple.mpegurl")
            .await
            .unwrap();

        assert!(dir.path().join("u1/a1/hls/master.m3u8").exists());
        let body = store.download("u1/a1/hls/master.m3u8").await.unwrap();
        assert_eq!(&body[..], b"#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_download_missing_key_fails() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.download("missing.mp4").await.is_err());
    }

    #[tokio::test]
    async fn test_escaping_key_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("root"));
        let err = store
            .upload("../outside.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid object key"));
        assert!(!dir.path().join("outside.txt").exists());
    }
}
