use crate::domain::media::{ProbeError, ProbeReport};
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("failed to launch {program} for {operation}: {source}")]
    Spawn {
        program: String,
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} exited with {status}: {stderr}")]
    Exit {
        operation: String,
        status: String,
        stderr: String,
    },
    #[error("probe of {path} failed: {source}")]
    Probe {
        path: String,
        #[source]
        source: ProbeError,
    },
}

/// One encoder command line, tagged with the operation it performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    operation: String,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    /// Value following `flag`, e.g. `value_of("-hls_time")`.
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }

    /// The output target, which is always the final argument.
    pub fn output(&self) -> Option<&Path> {
        self.args.last().map(Path::new)
    }
}

/// External media encoder and prober. Calls run one at a time per task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderPort: Send + Sync {
    /// Inspect the container and its streams
    async fn probe(&self, input: &Path) -> Result<ProbeReport, EncoderError>;

    /// Run one encoder command to completion
    async fn run(&self, invocation: &Invocation) -> Result<(), EncoderError>;
}
