//! Error types for command execution

use std::time::Duration;
use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// The program that could not be started
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Command not found on PATH
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found
        command: String,
    },

    /// The command did not finish within its time bound
    #[error("{command} timed out after {}s", after.as_secs())]
    Timeout {
        /// Display form of the command
        command: String,
        /// The bound that was exceeded
        after: Duration,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
