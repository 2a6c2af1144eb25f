//! Error types returned by runner operations.
//!
//! Only environment-level faults surface here. A child process that exits
//! non-zero, times out, or prints something unparseable is reported inside
//! an [`AgentResult`](crate::AgentResult) with `ok == false` instead.

use std::fmt;
use thiserror::Error;

/// Why a child process could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchFailureKind {
    /// The executable does not exist or is not on `$PATH`.
    ExecutableNotFound,
    /// The executable exists but may not be executed.
    PermissionDenied,
    /// The working directory is missing or is not a directory.
    WorkingDirectory,
    /// Any other I/O fault while spawning or reaping the process.
    Io,
}

impl LaunchFailureKind {
    /// Classifies an I/O error raised by `spawn`.
    #[must_use]
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::ExecutableNotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io,
        }
    }
}

impl fmt::Display for LaunchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExecutableNotFound => "executable not found",
            Self::PermissionDenied => "permission denied",
            Self::WorkingDirectory => "invalid working directory",
            Self::Io => "i/o failure",
        };
        f.write_str(label)
    }
}

/// Errors that fail a runner call outright.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The child process could not be started at all.
    #[error("Failed to launch `{program}` at stage '{stage}' ({kind}): {source}")]
    LaunchFailure {
        /// Program that was being launched.
        program: String,
        /// Classification of the failure.
        kind: LaunchFailureKind,
        /// Step of the launch sequence that failed.
        stage: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested agent identifier is not one of the supported agents.
    #[error("Unknown agent: {0}. Must be claude, codex, or gemini.")]
    InvalidAgent(String),

    /// A run configuration failed validation while being built.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RunnerError {
    /// Builds a [`RunnerError::LaunchFailure`] classified from the I/O error.
    pub fn launch(program: impl Into<String>, stage: impl Into<String>, source: std::io::Error) -> Self {
        Self::LaunchFailure {
            program: program.into(),
            kind: LaunchFailureKind::from_io(&source),
            stage: stage.into(),
            source,
        }
    }

    /// Returns `true` for [`RunnerError::LaunchFailure`].
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_errors_are_classified() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let other = std::io::Error::from(std::io::ErrorKind::BrokenPipe);

        assert_eq!(LaunchFailureKind::from_io(&missing), LaunchFailureKind::ExecutableNotFound);
        assert_eq!(LaunchFailureKind::from_io(&denied), LaunchFailureKind::PermissionDenied);
        assert_eq!(LaunchFailureKind::from_io(&other), LaunchFailureKind::Io);
    }

    #[test]
    fn test_launch_failure_message_names_program() {
        let err = RunnerError::launch(
            "claude",
            "spawn",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_launch_failure());
        let msg = err.to_string();
        assert!(msg.contains("`claude`"), "unexpected message: {msg}");
        assert!(msg.contains("executable not found"), "unexpected message: {msg}");
    }
}
