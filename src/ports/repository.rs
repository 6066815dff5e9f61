use crate::domain::progress::{Stage, StageRecord};
use crate::domain::task::AssetRef;
use async_trait::async_trait;
use std::error::Error;

/// Durable per-asset progress record, keyed by (user id, asset id).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Upsert the sub-record of `record.stage` and move the current-stage pointer to `next`
    async fn update_stage(
        &self,
        asset: &AssetRef,
        record: &StageRecord,
        next: Stage,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Upsert the number of artifacts uploaded for the asset
    async fn update_file_count(
        &self,
        asset: &AssetRef,
        count: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
