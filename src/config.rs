//! Configuration for the worker binaries.
//!
//! Values come from the process environment after an optional `.env` file is
//! loaded. Every missing required variable is reported in one error.

use crate::application::pipeline::PipelineSettings;
use crate::application::uploader::UploadConfig;
use crate::domain::task::Task;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),
    #[error("BATCH_TASKS is not a valid task list: {0}")]
    InvalidTasks(#[source] serde_json::Error),
    #[error("task {task_id} has user/asset ids that are not plain directory names")]
    UnsafeTaskIds { task_id: String },
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: String, value: String },
}

/// Collects required variables, remembering every one that is missing or empty.
struct Vars<F> {
    lookup: F,
    missing: Vec<String>,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
        }
    }

    fn required(&mut self, name: &str) -> String {
        match (self.lookup)(name).filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => {
                self.missing.push(name.to_string());
                String::new()
            }
        }
    }

    fn optional_count(&self, name: &str) -> Result<Option<usize>, ConfigError> {
        match (self.lookup)(name).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(ConfigError::InvalidNumber {
                    name: name.to_string(),
                    value,
                }),
            },
        }
    }

    fn finish(self) -> Result<(), ConfigError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingVars(self.missing))
        }
    }
}

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Settings shared by every deployment.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Tasks to process, in order
    pub tasks: Vec<Task>,
    /// Parent directory of the per-task working directories
    pub footage_dir: PathBuf,
    /// Object name of the completion marker
    pub completion_trigger: String,
    pub upload: UploadConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars::new(lookup);
        let tasks = vars.required("BATCH_TASKS");
        let footage_dir = vars.required("FOOTAGE_DIR");
        let completion_trigger = vars.required("COMPLETION_TRIGGER");
        let workers = vars.optional_count("UPLOAD_WORKERS")?;
        let buffer = vars.optional_count("UPLOAD_BUFFER")?;
        vars.finish()?;

        let tasks: Vec<Task> = serde_json::from_str(&tasks).map_err(ConfigError::InvalidTasks)?;
        if let Some(task) = tasks.iter().find(|t| !t.asset().has_safe_ids()) {
            return Err(ConfigError::UnsafeTaskIds {
                task_id: task.task_id.clone(),
            });
        }

        let mut upload = UploadConfig::default();
        if let Some(n) = workers {
            upload.max_workers = n;
        }
        if let Some(n) = buffer {
            upload.buffer_size = n;
        }

        Ok(Self {
            tasks,
            footage_dir: PathBuf::from(footage_dir),
            completion_trigger,
            upload,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let mut settings = PipelineSettings::new(&self.footage_dir, &self.completion_trigger);
        settings.upload = self.upload;
        settings
    }
}

/// Configuration for the AWS deployment.
#[cfg(feature = "aws")]
#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub region: String,
    /// S3 bucket holding uploaded sources
    pub transport_bucket: String,
    /// S3 bucket receiving packaged assets
    pub content_bucket: String,
    /// DynamoDB table holding asset progress
    pub metadata_table: String,
}

#[cfg(feature = "aws")]
impl AwsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars::new(lookup);
        let config = Self {
            region: vars.required("AWS_REGION"),
            transport_bucket: vars.required("TRANSPORT_BUCKET"),
            content_bucket: vars.required("CONTENT_BUCKET"),
            metadata_table: vars.required("METADATA_TABLE"),
        };
        vars.finish()?;
        Ok(config)
    }
}

/// Configuration for running against local directories.
#[cfg(feature = "local")]
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// Root standing in for the transport bucket
    pub transport_dir: PathBuf,
    /// Root standing in for the content bucket
    pub content_dir: PathBuf,
    /// Directory of per-asset progress documents
    pub progress_dir: PathBuf,
}

#[cfg(feature = "local")]
impl LocalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars::new(lookup);
        let config = Self {
            transport_dir: vars.required("TRANSPORT_DIR").into(),
            content_dir: vars.required("CONTENT_DIR").into(),
            progress_dir: vars.required("PROGRESS_DIR").into(),
        };
        vars.finish()?;
        Ok(config)
    }
}
