//! Application layer - Generic services that use ports.

pub mod pipeline;
pub mod recorder;
pub mod transcoder;
pub mod uploader;
