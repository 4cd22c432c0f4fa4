//! Main executor type that wraps a launcher with time bounds

use crate::backends::LocalLauncher;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::{LineStream, Launcher};
use crate::process::Output;
use std::time::Duration;
use tracing::debug;

/// Default bound applied to every command that does not set its own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// An executor that runs commands through a launcher, never unbounded
pub struct Executor<L: Launcher = LocalLauncher> {
    /// Name used for logging/identification
    name: String,
    launcher: L,
    default_timeout: Duration,
}

impl Executor<LocalLauncher> {
    /// Create an executor that runs commands on this machine
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, LocalLauncher)
    }
}

impl<L: Launcher> Executor<L> {
    /// Create a new executor with the given launcher
    pub fn new(name: impl Into<String>, launcher: L) -> Self {
        Self {
            name: name.into(),
            launcher,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Get the executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound applied to commands without their own timeout
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run a command to completion, failing with [`Error::Timeout`] if it
    /// exceeds its bound. The child is killed when the bound fires.
    pub async fn output(&self, command: Command) -> Result<Output> {
        let limit = command.get_timeout().unwrap_or(self.default_timeout);
        let timed_out = Error::Timeout {
            command: command.to_string(),
            after: limit,
        };
        debug!("[{}] executing: {}", self.name, command);

        let run = self.launcher.output(command);
        let deadline = async move {
            async_io::Timer::after(limit).await;
            Err(timed_out)
        };
        futures_lite::future::or(run, deadline).await
    }

    /// Start a streaming command. Only the spawn is bounded; the stream
    /// itself may run forever.
    pub async fn stream(&self, command: Command) -> Result<LineStream> {
        let limit = command.get_timeout().unwrap_or(self.default_timeout);
        let timed_out = Error::Timeout {
            command: command.to_string(),
            after: limit,
        };
        debug!("[{}] streaming: {}", self.name, command);

        let spawn = self.launcher.stream(command);
        let deadline = async move {
            async_io::Timer::after(limit).await;
            Err(timed_out)
        };
        futures_lite::future::or(spawn, deadline).await
    }

    /// Get a reference to the launcher
    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}
