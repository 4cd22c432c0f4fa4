//! # Deploy orchestration
//!
//! The Host Solo engine: environments bound to network namespaces, app
//! deployments driven through a container runtime, proxy routing intent,
//! backups in object storage and DNS records for environment hostnames.
//!
//! Nothing here caches external state. Every operation resolves the
//! effective spec again and asks the runtime, the store or the DNS
//! provider for the current picture.
//!
//! ## Example
//!
//! ```no_run
//! use deploy_orchestration::DeploymentController;
//! use deploy_orchestration::runtime::DockerRuntime;
//! use hostsolo_config::ConfigResolver;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> deploy_orchestration::Result<()> {
//! let resolver = ConfigResolver::discover(std::path::Path::new("."))?;
//! let runtime = Arc::new(DockerRuntime::new(Duration::from_secs(120)));
//! let controller = DeploymentController::new(resolver, runtime);
//! controller.deploy("directus", "dev", None).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod backup;
pub mod deployment;
pub mod dns;
pub mod environment;
pub mod errors;
pub mod proxy;
pub mod runtime;

pub use backup::{BackupEngine, BackupSnapshot, RestoreOutcome};
pub use deployment::{DeployOptions, DeploymentController, DeploymentState, UnitSummary};
pub use dns::{DnsReconciler, DnsRecord, SyncAction, SyncOutcome};
pub use environment::{DestroyOptions, Environment, EnvironmentManager, EnvironmentState};
pub use errors::{BackupError, DeploymentError, DnsError, EnvironmentError};
pub use proxy::{ProxyController, RoutingIntent};
pub use runtime::{ContainerRuntime, DeploymentRecord, UnitSpec};

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] hostsolo_config::ConfigError),

    /// Environment lifecycle errors
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// Deployment and runtime errors
    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    /// Backup and storage errors
    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    /// DNS errors
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
