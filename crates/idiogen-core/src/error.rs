//! Error types for idiogen-core.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::stage::StageKind;

/// Result type for idiogen-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a build.
#[derive(Debug, Error)]
pub enum Error {
    /// A required upload part was not supplied.
    #[error("missing required part '{0}'")]
    MissingPart(&'static str),

    /// The same upload part was supplied more than once.
    #[error("part '{0}' was supplied more than once")]
    DuplicatePart(&'static str),

    /// Malformed request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Workspace or filesystem failure.
    #[error("IO error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// An external toolchain stage rejected its input.
    ///
    /// `diagnostics` holds the tool's merged stdout/stderr, unmodified.
    #[error("{stage} stage failed ({failure}):\n{diagnostics}")]
    Stage {
        stage: StageKind,
        failure: StageFailure,
        diagnostics: String,
    },
}

impl Error {
    /// Wrap an IO error with the path it happened at.
    pub fn io(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Whether the caller has to fix the request (as opposed to a server or toolchain fault).
    pub fn is_request_fault(&self) -> bool {
        matches!(
            self,
            Self::MissingPart(_) | Self::DuplicatePart(_) | Self::Validation(_)
        )
    }

    /// The stage that failed, if this is a stage error.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Why a stage was considered failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// The tool exited with a non-zero status (`None` when killed by a signal).
    ExitStatus(Option<i32>),
    /// The tool exited cleanly but a declared output is missing or empty.
    MissingOutput(PathBuf),
    /// The tool could not be started.
    Launch(String),
    /// The tool ran past the stage timeout and was killed.
    Timeout(Duration),
}

impl StageFailure {
    /// Short machine-friendly reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ExitStatus(_) => "exit-status",
            Self::MissingOutput(_) => "missing-output",
            Self::Launch(_) => "launch",
            Self::Timeout(_) => "timeout",
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitStatus(Some(code)) => write!(f, "exit status {}", code),
            Self::ExitStatus(None) => write!(f, "terminated by signal"),
            Self::MissingOutput(path) => write!(f, "missing output {}", path.display()),
            Self::Launch(message) => write!(f, "could not launch tool: {}", message),
            Self::Timeout(limit) => write!(f, "timeout after {}s", limit.as_secs()),
        }
    }
}
