pub mod dynamodb;
pub mod s3;

pub use dynamodb::DynamoProgressStore;
pub use s3::S3Adapter;
