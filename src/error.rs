use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Why a script could not be transformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedScript {
    #[error("no simulation construction (`ncs.Simulation()` assignment) found")]
    MissingSimulation,

    #[error("simulation is bound to '{0}', which is not a plain or dotted name")]
    InvalidBinding(String),

    #[error("no execution call located")]
    MissingExecuteCall,
}

/// Errors raised by the introspection pipeline.
#[derive(Error, Debug)]
pub enum IntrospectError {
    #[error("malformed script: {0}")]
    MalformedScript(#[from] MalformedScript),

    #[error("I/O failure on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process failure: {0}")]
    ProcessFailure(String),

    #[error("no output document at '{}'", path.display())]
    MissingOutput { path: PathBuf },

    #[error("output document is invalid: {0}")]
    InvalidDocument(String),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntrospectError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MalformedScript(_) => 2,
            Self::Config(_) => 3,
            Self::ProcessFailure(_) => 4,
            Self::MissingOutput { .. } | Self::InvalidDocument(_) | Self::Json(_) => 5,
            Self::Io { .. } | Self::InvalidTransition { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, IntrospectError>;

/// Log a recoverable error and carry on without its value.
pub trait ResultExt<T> {
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Operation warning");
                None
            }
        }
    }
}
