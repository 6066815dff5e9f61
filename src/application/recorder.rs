use crate::domain::progress::{Stage, StageRecord};
use crate::domain::task::AssetRef;
use crate::ports::repository::ProgressRepository;
use tracing::warn;

/// Writes stage transitions to the progress store.
///
/// Store failures are logged and dropped; the pipeline outcome never depends
/// on whether progress was recorded.
pub struct ProgressRecorder<P> {
    repo: P,
}

impl<P: ProgressRepository> ProgressRecorder<P> {
    pub fn new(repo: P) -> Self {
        Self { repo }
    }

    pub async fn record_transition(&self, asset: &AssetRef, record: &StageRecord, next: Stage) {
        if let Err(e) = self.repo.update_stage(asset, record, next).await {
            warn!(
                user_id = %asset.user_id,
                asset_id = %asset.asset_id,
                stage = %record.stage,
                next = %next,
                error = %e,
                "failed to record stage transition"
            );
        }
    }

    pub async fn record_file_count(&self, asset: &AssetRef, count: usize) {
        if let Err(e) = self.repo.update_file_count(asset, count).await {
            warn!(
                user_id = %asset.user_id,
                asset_id = %asset.asset_id,
                count,
                error = %e,
                "failed to record file count"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::StageTimer;
    use crate::ports::repository::MockProgressRepository;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_transition_is_forwarded() {
        let mut repo = MockProgressRepository::new();
        repo.expect_update_stage()
            .withf(|asset, record, next| {
                asset.asset_id == "a1" && record.stage == Stage::Download && *next == Stage::WriteToStorage
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let recorder = ProgressRecorder::new(repo);
        let record = StageTimer::start(Stage::Download).finish(None);
        recorder
            .record_transition(&AssetRef::new("u1", "a1"), &record, Stage::WriteToStorage)
            .await;
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let mut repo = MockProgressRepository::new();
        repo.expect_update_stage()
            .returning(|_, _, _| Err("table unavailable".into()));
        repo.expect_update_file_count()
            .with(mockall::predicate::always(), eq(12))
            .returning(|_, _| Err("table unavailable".into()));

        let recorder = ProgressRecorder::new(repo);
        let asset = AssetRef::new("u1", "a1");
        let record = StageTimer::start(Stage::Upload).finish(None);

        recorder.record_transition(&asset, &record, Stage::CompletionMarker).await;
        recorder.record_file_count(&asset, 12).await;
    }
}
