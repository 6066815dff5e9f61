use async_trait::async_trait;
use bytes::Bytes;
use std::error::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a whole object into memory
    async fn download(&self, key: &str) -> Result<Bytes, Box<dyn Error + Send + Sync>>;

    /// Store a whole object under `key`
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
