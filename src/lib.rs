//! Encore - Batch video packaging worker
//!
//! Downloads a source video, encodes a fixed resolution ladder, packages it
//! as HLS (plus a keyframe-only trick-play variant), uploads the tree and
//! writes a completion marker, recording per-stage progress along the way.
//!
//! Hexagonal Architecture:
//! - domain/: Pure model (ladder, media facts, paths, playlists, progress)
//! - ports/: Trait definitions (object store, progress store, encoder)
//! - adapters/: Concrete implementations (ffmpeg CLI, local disk, AWS)
//! - application/: Generic services (coordinator, uploader, recorder, pipeline)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Object and progress stores backed by local directories
//! - `aws`: S3 object store and DynamoDB progress store
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use application::pipeline::{Pipeline, PipelineSettings, TaskOutcome};
pub use config::{ConfigError, WorkerConfig};

#[cfg(feature = "aws")]
pub use config::AwsConfig;

#[cfg(feature = "local")]
pub use config::LocalConfig;
