//! Local adapters for single-host runs.

pub mod fs;
pub mod progress;

pub use fs::FsObjectStore;
pub use progress::JsonProgressStore;
