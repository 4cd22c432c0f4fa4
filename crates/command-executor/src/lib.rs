//! Runtime-agnostic command execution library
//!
//! This crate runs external programs (the container engine CLI, mostly) on
//! behalf of the deployment engine. Every execution is bounded by a timeout
//! and either captured to completion or streamed line by line.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod event;
pub mod executor;
pub mod launcher;
pub mod process;

pub use backends::LocalLauncher;
pub use command::Command;
pub use error::{Error, Result};
pub use event::{LogLine, LogSource};
pub use executor::Executor;
pub use launcher::{LineStream, Launcher};
pub use process::{ExitStatus, Output};
