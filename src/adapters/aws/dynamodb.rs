use crate::domain::progress::{Stage, StageRecord};
use crate::domain::task::AssetRef;
use crate::ports::repository::ProgressRepository;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::error::Error;

/// DynamoProgressStore implements ProgressRepository for AWS DynamoDB.
///
/// The asset item (keyed by `userId`/`assetId`) and its `progress` map are
/// created upstream when the asset is registered; this adapter only sets
/// fields inside that map.
#[derive(Clone)]
pub struct DynamoProgressStore {
    client: Client,
    table_name: String,
}

impl DynamoProgressStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn now() -> AttributeValue {
        AttributeValue::S(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

fn stage_attribute(record: &StageRecord) -> AttributeValue {
    let mut fields = HashMap::new();
    fields.insert(
        "status".to_string(),
        AttributeValue::S(record.status().as_str().to_string()),
    );
    fields.insert("startTime".to_string(), AttributeValue::S(record.start_time()));
    fields.insert("endTime".to_string(), AttributeValue::S(record.end_time()));
    fields.insert(
        "durationSecs".to_string(),
        AttributeValue::N(format!("{:.3}", record.duration.as_secs_f64())),
    );
    fields.insert(
        "error".to_string(),
        match &record.error {
            Some(err) => AttributeValue::S(err.clone()),
            None => AttributeValue::Null(true),
        },
    );
    AttributeValue::M(fields)
}

#[async_trait]
impl ProgressRepository for DynamoProgressStore {
    async fn update_stage(
        &self,
        asset: &AssetRef,
        record: &StageRecord,
        next: Stage,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("userId", AttributeValue::S(asset.user_id.clone()))
            .key("assetId", AttributeValue::S(asset.asset_id.clone()))
            .update_expression(
                "SET #progress.#stage = :record, #progress.#current = :next, #progress.#updatedAt = :time",
            )
            .expression_attribute_names("#progress", "progress")
            .expression_attribute_names("#stage", record.stage.as_str())
            .expression_attribute_names("#current", "currentStage")
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":record", stage_attribute(record))
            .expression_attribute_values(":next", AttributeValue::S(next.as_str().to_string()))
            .expression_attribute_values(":time", Self::now())
            .send()
            .await?;
        Ok(())
    }

    async fn update_file_count(
        &self,
        asset: &AssetRef,
        count: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("userId", AttributeValue::S(asset.user_id.clone()))
            .key("assetId", AttributeValue::S(asset.asset_id.clone()))
            .update_expression("SET #progress.#totalFiles = :count, #progress.#updatedAt = :time")
            .expression_attribute_names("#progress", "progress")
            .expression_attribute_names("#totalFiles", "totalFiles")
            .expression_attribute_names("#updatedAt", "updatedAt")
            .expression_attribute_values(":count", AttributeValue::N(count.to_string()))
            .expression_attribute_values(":time", Self::now())
            .send()
            .await?;
        Ok(())
    }
}
