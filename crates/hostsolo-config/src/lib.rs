//! # Host Solo Configuration
//!
//! Declarative configuration for the Host Solo deployment engine.
//!
//! This crate parses `hostsolo.yaml`, reads the per-app layered variable
//! files under `config/{app}/`, and folds everything into one
//! [`EffectiveSpec`](resolver::EffectiveSpec) per (app, environment) pair.
//! Nothing here writes to disk or talks to the network.

#![warn(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

pub mod credentials;
pub mod layers;
pub mod parser;
pub mod resolver;

pub use credentials::Credentials;
pub use layers::{LayerKind, LayeredConfig};
pub use resolver::{
    BackupPath, ConfigResolver, EffectiveSpec, PROXY_NETWORK, VolumeMount, network_name,
    unit_name,
};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// No hostsolo.yaml in the start directory or any ancestor
    #[error("No hostsolo.yaml found in {0} or its parents")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The app has no declaration in hostsolo.yaml
    #[error("App '{0}' not found in configuration")]
    AppNotFound(String),

    /// The environment has no declaration in hostsolo.yaml
    #[error("Environment '{0}' not found in configuration")]
    EnvironmentNotFound(String),

    /// A variable layer file is missing
    #[error("Missing {layer} layer for {app} ({env}): {}", path.display())]
    MissingLayer {
        /// Application name
        app: String,
        /// Environment name
        env: String,
        /// Which layer is missing
        layer: LayerKind,
        /// Where it was expected
        path: PathBuf,
    },

    /// A variable layer file has a line that is not `KEY=VALUE`
    #[error("Invalid line {line} in {}: {reason}", path.display())]
    InvalidLayer {
        /// Layer file
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What is wrong with it
        reason: String,
    },

    /// A path template references a placeholder that is not defined
    #[error("Invalid template '{template}': undefined placeholder '{placeholder}'")]
    InvalidTemplate {
        /// The template as written
        template: String,
        /// The offending placeholder
        placeholder: String,
    },

    /// A provider credential is not set
    #[error("Missing credential: set {0}")]
    MissingCredential(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure (`hostsolo.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base domain every environment hostname hangs off
    pub domain: String,

    /// Contact email for certificate issuance
    pub email: String,

    /// Root of persistent app data, relative to the project root
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// DNS provider selection
    #[serde(default)]
    pub dns: DnsConfig,

    /// Backup provider selection
    #[serde(default)]
    pub backup: BackupConfig,

    /// Engine settings
    #[serde(default)]
    pub settings: Settings,

    /// Environments in declaration order
    #[serde(default)]
    pub environments: IndexMap<String, EnvironmentConfig>,

    /// App declarations in declaration order
    #[serde(default)]
    pub apps: IndexMap<String, AppConfig>,
}

impl Config {
    /// Look up an app declaration
    pub fn app(&self, name: &str) -> Result<&AppConfig> {
        self.apps
            .get(name)
            .ok_or_else(|| ConfigError::AppNotFound(name.to_string()))
    }

    /// Look up an environment declaration
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .get(name)
            .ok_or_else(|| ConfigError::EnvironmentNotFound(name.to_string()))
    }

    /// Full public hostname of an environment
    pub fn full_domain(&self, env: &str) -> Result<String> {
        let env_config = self.environment(env)?;
        Ok(env_config.hostname(&self.domain))
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsConfig {
    /// Provider name
    #[serde(default = "default_dns_provider")]
    pub provider: String,

    /// Record TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Fixed record target; the public IP is detected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            provider: default_dns_provider(),
            ttl: default_ttl(),
            target: None,
        }
    }
}

/// Backup provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupConfig {
    /// Provider name (`s3` or `local`)
    #[serde(default = "default_backup_provider")]
    pub provider: String,

    /// Bucket name for S3-compatible storage
    #[serde(default)]
    pub bucket: String,

    /// Custom endpoint for S3-compatible providers (MinIO, B2, Spaces)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Region override; the credential region is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Directory used by the `local` provider, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Number of snapshots to keep per (app, environment) when pruning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<usize>,

    /// Keep the local archive after a verified upload
    #[serde(default)]
    pub keep_local: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            provider: default_backup_provider(),
            bucket: String::new(),
            endpoint_url: None,
            region: None,
            path: None,
            retention: None,
            keep_local: false,
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Bound on every container runtime call, in seconds
    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout: u64,

    /// Bound on every DNS and object-storage request, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Local development mode: plain HTTP routing, no certificates
    #[serde(default)]
    pub local: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime_timeout: default_runtime_timeout(),
            http_timeout: default_http_timeout(),
            local: false,
        }
    }
}

/// Environment-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnvironmentConfig {
    /// Subdomain fragment; empty means the root domain
    #[serde(default)]
    pub subdomain: String,
}

impl EnvironmentConfig {
    /// Hostname of this environment under `domain`
    pub fn hostname(&self, domain: &str) -> String {
        if self.subdomain.is_empty() {
            domain.to_string()
        } else {
            format!("{}.{}", self.subdomain, domain)
        }
    }
}

/// Application declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Image repository
    pub image: String,

    /// Default image tag
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Exposed ports; the first is the routed backend port
    #[serde(default)]
    pub ports: Vec<PortMapping>,

    /// Volume mounts as `source:target[:mode]`, may contain `${ENV}`
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Static variable defaults (the floor layer)
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Paths captured by backups, may contain `${ENV}`
    #[serde(default)]
    pub backup_paths: Vec<String>,

    /// HTTP path the proxy polls for health
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_path: Option<String>,
}

/// Port declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PortMapping {
    /// Simple port number (container port only)
    Simple(u16),
    /// String form, either `"8055"` or `"host:container"`
    Full(String),
}

impl PortMapping {
    /// Port the container listens on
    pub fn container_port(&self) -> Option<u16> {
        match self {
            PortMapping::Simple(port) => Some(*port),
            PortMapping::Full(spec) => {
                let container = spec.rsplit(':').next()?;
                let container = container.split('/').next()?;
                container.trim().parse().ok()
            }
        }
    }
}

/// Environments assumed when hostsolo.yaml declares none
pub fn default_environments() -> IndexMap<String, EnvironmentConfig> {
    IndexMap::from([
        (
            "dev".to_string(),
            EnvironmentConfig {
                subdomain: "dev".to_string(),
            },
        ),
        (
            "staging".to_string(),
            EnvironmentConfig {
                subdomain: "staging".to_string(),
            },
        ),
        ("prod".to_string(), EnvironmentConfig::default()),
    ])
}

// Default values
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_dns_provider() -> String {
    "dnsimple".to_string()
}
fn default_ttl() -> u32 {
    3600
}
fn default_backup_provider() -> String {
    "s3".to_string()
}
fn default_runtime_timeout() -> u64 {
    120
}
fn default_http_timeout() -> u64 {
    30
}
fn default_tag() -> String {
    "latest".to_string()
}
