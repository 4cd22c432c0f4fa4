//! The container runtime seam.
//!
//! [`ContainerRuntime`] is the only path through which the engine mutates
//! external runtime state. Everything it returns is read fresh from the
//! runtime; implementations must not cache records between calls.

use crate::errors::DeploymentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use command_executor::LineStream;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Label carrying the fingerprint of the spec a unit was started from
pub const SPEC_HASH_LABEL: &str = "hostsolo.spec-hash";
/// Label naming the app a unit belongs to
pub const APP_LABEL: &str = "hostsolo.app";
/// Label naming the environment a unit belongs to
pub const ENVIRONMENT_LABEL: &str = "hostsolo.environment";
/// Label marking units and networks this engine owns
pub const MANAGED_LABEL: &str = "hostsolo.managed";

type Result<T> = std::result::Result<T, DeploymentError>;

/// Everything the runtime needs to create a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct UnitSpec {
    /// Unit name, unique per runtime
    pub name: String,
    /// Full image reference including tag
    pub image: String,
    /// Networks to attach; the first is the primary one
    pub networks: Vec<String>,
    /// Variables passed to the unit
    pub env: BTreeMap<String, String>,
    /// Volume mounts as `source:target[:mode]`
    pub volumes: Vec<String>,
    /// Published ports as `host:container`
    pub ports: Vec<String>,
    /// Metadata, including routing labels
    pub labels: BTreeMap<String, String>,
    /// Arguments appended after the image
    pub args: Vec<String>,
    /// Restart policy, e.g. `unless-stopped`
    pub restart_policy: Option<String>,
}

impl UnitSpec {
    /// SHA-256 over the canonical JSON form, ignoring any existing hash label
    pub fn fingerprint(&self) -> String {
        let mut canonical = self.clone();
        canonical.labels.remove(SPEC_HASH_LABEL);
        // BTreeMap keys and Vec order make the JSON form canonical.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Tag part of the image reference
    pub fn tag(&self) -> &str {
        split_image_ref(&self.image).1
    }
}

/// Split `repo[:tag]` into repository and tag, defaulting to `latest`
pub fn split_image_ref(image: &str) -> (&str, &str) {
    // A colon before the last slash belongs to a registry port.
    let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_slash..].rfind(':') {
        Some(idx) => {
            let split = last_slash + idx;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

/// Status the runtime reports for a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UnitStatus {
    /// Created but never started
    Created,
    /// Running
    Running,
    /// Being restarted by the runtime
    Restarting,
    /// Paused
    Paused,
    /// Being removed
    Removing,
    /// Exited
    Exited,
    /// Dead
    Dead,
    /// Anything else
    Unknown(String),
}

impl UnitStatus {
    /// Parse the runtime's status word
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "created" => UnitStatus::Created,
            "running" => UnitStatus::Running,
            "restarting" => UnitStatus::Restarting,
            "paused" => UnitStatus::Paused,
            "removing" => UnitStatus::Removing,
            "exited" => UnitStatus::Exited,
            "dead" => UnitStatus::Dead,
            other => UnitStatus::Unknown(other.to_string()),
        }
    }

    /// Whether the unit is up or coming back up
    pub fn is_active(&self) -> bool {
        matches!(self, UnitStatus::Running | UnitStatus::Restarting)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Created => write!(f, "created"),
            UnitStatus::Running => write!(f, "running"),
            UnitStatus::Restarting => write!(f, "restarting"),
            UnitStatus::Paused => write!(f, "paused"),
            UnitStatus::Removing => write!(f, "removing"),
            UnitStatus::Exited => write!(f, "exited"),
            UnitStatus::Dead => write!(f, "dead"),
            UnitStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Observable state of a unit, owned by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    /// Unit name
    pub unit: String,
    /// Runtime-assigned identifier
    pub id: String,
    /// Image reference the unit runs
    pub image: String,
    /// Tag actually running
    pub tag: String,
    /// Last start time, if it ever started
    pub started_at: Option<DateTime<Utc>>,
    /// Runtime status
    pub status: UnitStatus,
    /// Unit labels
    pub labels: BTreeMap<String, String>,
}

impl DeploymentRecord {
    /// Fingerprint of the spec the unit was started from
    pub fn spec_hash(&self) -> Option<&str> {
        self.labels.get(SPEC_HASH_LABEL).map(String::as_str)
    }

    /// App this unit belongs to
    pub fn app(&self) -> Option<&str> {
        self.labels.get(APP_LABEL).map(String::as_str)
    }

    /// Environment this unit belongs to
    pub fn environment(&self) -> Option<&str> {
        self.labels.get(ENVIRONMENT_LABEL).map(String::as_str)
    }

    /// Whether the unit runs exactly `spec`
    pub fn matches(&self, spec: &UnitSpec) -> bool {
        self.spec_hash() == Some(spec.fingerprint().as_str())
    }
}

/// A network namespace known to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkHandle {
    /// Network name
    pub name: String,
    /// Whether this call created it
    pub created: bool,
}

/// How to read unit logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep the stream open for new lines
    pub follow: bool,
    /// Only the last N lines of history
    pub tail: Option<usize>,
}

/// A container engine that runs named units
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a unit.
    ///
    /// Idempotent by name: a running unit with an identical spec is
    /// returned as-is, anything else under that name is replaced.
    async fn start(&self, spec: &UnitSpec) -> Result<DeploymentRecord>;

    /// Fetch an image from its registry
    ///
    /// Returns true when a newer image than the local one was downloaded.
    async fn pull(&self, image: &str) -> Result<bool>;

    /// Stop a unit, keeping it registered
    async fn stop(&self, unit: &str) -> Result<()>;

    /// Restart a unit in place
    async fn restart(&self, unit: &str) -> Result<DeploymentRecord>;

    /// Remove a unit; removing a missing unit is not an error
    async fn remove(&self, unit: &str) -> Result<()>;

    /// Current record, or [`DeploymentError::UnitNotFound`]
    async fn status(&self, unit: &str) -> Result<DeploymentRecord>;

    /// Lazy log stream; call again for a fresh stream
    async fn logs(&self, unit: &str, options: LogOptions) -> Result<LineStream>;

    /// Units carrying every given label
    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<DeploymentRecord>>;

    /// Whether a network exists
    async fn network_exists(&self, name: &str) -> Result<bool>;

    /// Create a network with labels
    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<NetworkHandle>;

    /// Remove a network
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Current record, or `None` when the unit does not exist
    async fn find(&self, unit: &str) -> Result<Option<DeploymentRecord>> {
        match self.status(unit).await {
            Ok(record) => Ok(Some(record)),
            Err(DeploymentError::UnitNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
