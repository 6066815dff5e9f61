//! Domain layer - Pure data model of a packaging task.

pub mod content_type;
pub mod hls;
pub mod ladder;
pub mod media;
pub mod paths;
pub mod progress;
pub mod task;
