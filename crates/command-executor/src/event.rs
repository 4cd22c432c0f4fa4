//! Log lines emitted by streamed processes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single line of output from a streamed process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogLine {
    /// When the line was read
    pub timestamp: DateTime<Utc>,
    /// Which pipe produced it
    pub source: LogSource,
    /// Line content without the trailing newline
    pub line: String,
}

impl LogLine {
    /// Create a log line stamped with the current time
    pub fn new(source: LogSource, line: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            line: line.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Source of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}
