//! Launcher trait for executing commands in different contexts

use crate::command::Command;
use crate::error::Result;
use crate::event::LogLine;
use crate::process::Output;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, possibly endless, sequence of output lines from a running process
pub type LineStream = BoxStream<'static, LogLine>;

/// A launcher that knows how to run a command somewhere
///
/// Launchers do not enforce time bounds; the [`Executor`](crate::Executor)
/// wrapping them does.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Run a command to completion and capture its output
    async fn output(&self, command: Command) -> Result<Output>;

    /// Start a command and stream its stdout and stderr lines
    ///
    /// The process lives as long as the returned stream and is killed
    /// when the stream is dropped.
    async fn stream(&self, command: Command) -> Result<LineStream>;
}
