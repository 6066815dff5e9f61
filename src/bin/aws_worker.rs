//! AWS Worker Binary
//!
//! Intended to run as a batch job: processes every task in BATCH_TASKS,
//! reading sources from the transport bucket, writing packaged assets to the
//! content bucket and progress to DynamoDB.
//!
//! Environment Variables:
//! - AWS_REGION: AWS region (e.g., us-east-1)
//! - TRANSPORT_BUCKET: S3 bucket holding uploaded sources
//! - CONTENT_BUCKET: S3 bucket receiving packaged assets
//! - METADATA_TABLE: DynamoDB table for asset progress
//! - BATCH_TASKS, FOOTAGE_DIR, COMPLETION_TRIGGER: see WorkerConfig

use encore::adapters::aws::{DynamoProgressStore, S3Adapter};
use encore::adapters::ffmpeg::FfmpegCli;
use encore::{AwsConfig, Pipeline, WorkerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (worker, aws) = match (WorkerConfig::from_env(), AwsConfig::from_env()) {
        (Ok(worker), Ok(aws)) => (worker, aws),
        (worker, aws) => {
            for e in [worker.err(), aws.err()].into_iter().flatten() {
                error!(error = %e, "invalid configuration");
            }
            std::process::exit(1);
        }
    };

    // Load AWS config
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(aws.region.clone()))
        .load()
        .await;

    let s3_client = aws_sdk_s3::Client::new(&sdk_config);
    let dynamo_client = aws_sdk_dynamodb::Client::new(&sdk_config);

    let pipeline = Pipeline::new(
        S3Adapter::new(s3_client.clone(), aws.transport_bucket),
        S3Adapter::new(s3_client, aws.content_bucket),
        DynamoProgressStore::new(dynamo_client, aws.metadata_table),
        FfmpegCli::default(),
        worker.pipeline_settings(),
    );

    info!(tasks = worker.tasks.len(), region = %aws.region, "AWS worker started");
    let outcomes = pipeline.run_batch(&worker.tasks).await;

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        if let Err(e) = &outcome.result {
            error!(task_id = %outcome.task_id, uploaded = outcome.uploaded, error = %e, "task failed");
        }
    }
    info!(total = outcomes.len(), failed, "batch finished");
}
