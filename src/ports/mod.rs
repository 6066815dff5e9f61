//! Ports - Trait definitions for the worker's external collaborators.

pub mod encoder;
pub mod repository;
pub mod storage;
