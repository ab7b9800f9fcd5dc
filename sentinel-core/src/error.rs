use std::io;
use std::path::PathBuf;

use sentinel_commons::PathGuardError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

/// Errors surfaced by sandbox, file, and patch operations.
///
/// Scanner trouble is never an error at this level; it is reported inside
/// the scan result instead.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("access to '{path}' denied: {reason}")]
    PathEscape { path: String, reason: String },

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("'{0}' does not exist")]
    NotFound(String),

    #[error("'{0}' is a directory, not a file")]
    NotAFile(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SentinelError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Stable identifier used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PathEscape { .. } => "PathEscape",
            Self::UnknownSession(_) => "UnknownSession",
            Self::NotFound(_) => "NotFound",
            Self::NotAFile(_) => "NotAFile",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::UnknownTool(_) => "UnknownTool",
            Self::Io { .. } => "Io",
        }
    }

    /// Whether the caller can succeed by retrying with corrected input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::PathEscape { .. } | Self::UnknownSession(_) | Self::Io { .. }
        )
    }
}

impl From<PathGuardError> for SentinelError {
    fn from(error: PathGuardError) -> Self {
        match error {
            PathGuardError::Empty => Self::PathEscape {
                path: String::new(),
                reason: error.to_string(),
            },
            PathGuardError::Absolute { ref path } | PathGuardError::Escape { ref path } => {
                Self::PathEscape {
                    path: path.clone(),
                    reason: error.to_string(),
                }
            }
            PathGuardError::Io { path, source } => Self::Io {
                action: "resolve",
                path,
                source,
            },
        }
    }
}
