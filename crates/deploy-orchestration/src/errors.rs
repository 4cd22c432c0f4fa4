//! Error kinds for each orchestration component

use crate::deployment::DeploymentState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment lifecycle errors
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The network namespace already exists
    #[error("Network '{network}' for environment '{env}' already exists")]
    NamespaceConflict {
        /// Environment name
        env: String,
        /// Network namespace name
        network: String,
    },

    /// Running units block destroy unless forced
    #[error("Environment '{env}' has active deployments ({}); use force to destroy it", units.join(", "))]
    HasActiveDeployments {
        /// Environment name
        env: String,
        /// Units still running
        units: Vec<String>,
    },

    /// The environment is not declared in hostsolo.yaml
    #[error("Environment '{0}' is not declared")]
    UnknownEnvironment(String),

    /// Purging persistent data failed part way
    #[error("Failed to remove data of environment '{env}' at {}: {source}", path.display())]
    DataRemoval {
        /// Environment name
        env: String,
        /// Directory being removed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Container runtime and deployment errors
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// No running unit for the pair
    #[error("{app} is not running in {env}")]
    NotRunning {
        /// Application name
        app: String,
        /// Environment name
        env: String,
    },

    /// The runtime has no unit with this name
    #[error("Unit '{0}' not found")]
    UnitNotFound(String),

    /// The container runtime cannot be reached
    #[error("Container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    /// The unit is mid-transition in the runtime
    #[error("Unit '{unit}' is {state}; retry once it settles")]
    ReplaceInProgress {
        /// Unit name
        unit: String,
        /// State the runtime reported
        state: DeploymentState,
    },

    /// A transition the state machine does not allow
    #[error("Unit '{unit}' cannot go from {from} to {to}")]
    InvalidTransition {
        /// Unit name
        unit: String,
        /// Current state
        from: DeploymentState,
        /// Requested state
        to: DeploymentState,
    },

    /// A runtime call exceeded its bound
    #[error("Runtime call '{operation}' timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound
        after: Duration,
    },

    /// The runtime rejected a call
    #[error("Runtime call '{operation}' on '{target}' failed: {message}")]
    CommandFailed {
        /// Operation attempted
        operation: String,
        /// Unit or network name
        target: String,
        /// Runtime diagnostics
        message: String,
    },
}

/// Backup and object-storage errors
#[derive(Debug, Error)]
pub enum BackupError {
    /// The archive could not be confirmed remotely; the local copy is kept
    #[error("Upload of '{key}' failed: {reason} (local copy kept at {})", local.display())]
    UploadFailed {
        /// Object key
        key: String,
        /// Why the upload is unconfirmed
        reason: String,
        /// Local archive that was preserved
        local: PathBuf,
    },

    /// No snapshot with this timestamp
    #[error("No backup of {app} ({env}) at {timestamp}")]
    SnapshotNotFound {
        /// Application name
        app: String,
        /// Environment name
        env: String,
        /// Requested timestamp
        timestamp: String,
    },

    /// The unit is mid-transition and cannot be restored into
    #[error("Cannot restore into '{unit}' while it is {state}")]
    RestoreTargetBusy {
        /// Unit name
        unit: String,
        /// State the runtime reported
        state: DeploymentState,
    },

    /// None of the declared backup paths exist
    #[error("Nothing to back up for {app} ({env}): no declared backup path exists")]
    NoBackupPaths {
        /// Application name
        app: String,
        /// Environment name
        env: String,
    },

    /// Two declared backup paths map to the same archive entry
    #[error("Backup paths '{first}' and '{second}' of {app} both archive as '{name}'")]
    ConflictingBackupPaths {
        /// Application name
        app: String,
        /// Shared archive entry name
        name: String,
        /// Path declared first
        first: String,
        /// Path declared later
        second: String,
    },

    /// `backup.retention` is not set
    #[error("No retention policy configured (set backup.retention)")]
    RetentionNotConfigured,

    /// An object does not exist in the store
    #[error("Object '{0}' not found")]
    ObjectNotFound(String),

    /// The object store rejected a call
    #[error("Storage call '{operation}' failed: {reason}")]
    Storage {
        /// Operation attempted
        operation: String,
        /// Provider diagnostics
        reason: String,
    },

    /// A storage call exceeded its bound
    #[error("Storage call '{operation}' timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound
        after: Duration,
    },

    /// Archive or manifest is unreadable
    #[error("Corrupt backup archive: {0}")]
    CorruptArchive(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// DNS provider errors
#[derive(Debug, Error)]
pub enum DnsError {
    /// No record to delete
    #[error("No {record_type} record for '{name}'")]
    NotFound {
        /// Fully qualified name
        name: String,
        /// Record type
        record_type: String,
    },

    /// The provider asked us to slow down
    #[error("DNS provider rate limit hit{}", retry_after.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited {
        /// Seconds until the limit resets, when the provider says
        retry_after: Option<u64>,
    },

    /// The provider rejected a call
    #[error("DNS provider error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Provider {
        /// HTTP status, when there was a response
        status: Option<u16>,
        /// Provider diagnostics
        message: String,
    },

    /// A provider call exceeded its bound
    #[error("DNS call '{operation}' timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound
        after: Duration,
    },

    /// Every public-IP service failed
    #[error("Could not determine public IP address: {0}")]
    PublicIpUnresolved(String),
}
