//! Local process execution backend

use async_process::{Child, Stdio};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use futures_lite::io::{AsyncBufReadExt, BufReader};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{LogLine, LogSource};
use crate::launcher::{LineStream, Launcher};
use crate::process::Output;

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

/// Line stream that owns the child process producing it
struct ChildLines {
    _child: Box<Child>,
    lines: LineStream,
}

impl Stream for ChildLines {
    type Item = LogLine;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().lines.poll_next_unpin(cx)
    }
}

fn spawn_error(command: &Command, err: std::io::Error) -> Error {
    let program = command.get_program().to_string_lossy().into_owned();
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound { command: program }
    } else {
        Error::spawn_failed(program, err.to_string())
    }
}

#[async_trait]
impl Launcher for LocalLauncher {
    async fn output(&self, command: Command) -> Result<Output> {
        let mut async_cmd = command.prepare();
        async_cmd.stdin(Stdio::null());
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());

        let output = async_cmd
            .output()
            .await
            .map_err(|e| spawn_error(&command, e))?;

        Ok(Output {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(&self, command: Command) -> Result<LineStream> {
        let mut async_cmd = command.prepare();
        async_cmd.stdin(Stdio::null());
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());

        let mut child = async_cmd.spawn().map_err(|e| spawn_error(&command, e))?;
        debug!("Streaming output of pid {}: {}", child.id(), command);

        let stdout = match child.stdout.take() {
            Some(out) => BufReader::new(out)
                .lines()
                .filter_map(|line| async move { line.ok() })
                .map(|line| LogLine::new(LogSource::Stdout, line))
                .boxed(),
            None => stream::empty().boxed(),
        };
        let stderr = match child.stderr.take() {
            Some(err) => BufReader::new(err)
                .lines()
                .filter_map(|line| async move { line.ok() })
                .map(|line| LogLine::new(LogSource::Stderr, line))
                .boxed(),
            None => stream::empty().boxed(),
        };

        Ok(ChildLines {
            _child: Box::new(child),
            lines: stream::select(stdout, stderr).boxed(),
        }
        .boxed())
    }
}
