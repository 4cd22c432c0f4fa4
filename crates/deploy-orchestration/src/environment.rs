//! Environment lifecycle
//!
//! An environment is a name bound to its own network namespace
//! (`hostsolo-{env}`). The namespace is the only runtime object the
//! environment owns; whether it exists is asked of the runtime every time.

use crate::errors::EnvironmentError;
use crate::runtime::{ContainerRuntime, ENVIRONMENT_LABEL, MANAGED_LABEL, NetworkHandle};
use crate::Result;
use hostsolo_config::{ConfigResolver, PROXY_NETWORK, network_name};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Label recording an environment's subdomain on its network
pub const SUBDOMAIN_LABEL: &str = "hostsolo.subdomain";

/// Lifecycle state of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnvironmentState {
    /// No namespace exists
    Absent,
    /// Namespace exists
    Active,
    /// Just torn down by `destroy`
    Destroyed,
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentState::Absent => write!(f, "absent"),
            EnvironmentState::Active => write!(f, "active"),
            EnvironmentState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// An environment and its observed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Environment name
    pub name: String,
    /// Subdomain fragment, empty for the root domain
    pub subdomain: String,
    /// Network namespace name
    pub network: String,
    /// Public hostname
    pub hostname: String,
    /// Observed state
    pub state: EnvironmentState,
}

/// Options for [`EnvironmentManager::destroy`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Also delete `{data_dir}/{env}`; irreversible
    pub remove_data: bool,
    /// Destroy even with running units
    pub force: bool,
}

/// Creates, lists and destroys environments
#[derive(Clone)]
pub struct EnvironmentManager {
    resolver: ConfigResolver,
    runtime: Arc<dyn ContainerRuntime>,
}

impl EnvironmentManager {
    /// Create a manager over a runtime
    pub fn new(resolver: ConfigResolver, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { resolver, runtime }
    }

    fn subdomain_of(&self, name: &str) -> Option<String> {
        self.resolver
            .config()
            .environments
            .get(name)
            .map(|e| e.subdomain.clone())
    }

    fn describe(&self, name: &str, subdomain: String, state: EnvironmentState) -> Environment {
        let domain = &self.resolver.config().domain;
        let hostname = if subdomain.is_empty() {
            domain.clone()
        } else {
            format!("{}.{}", subdomain, domain)
        };
        Environment {
            name: name.to_string(),
            network: network_name(name),
            subdomain,
            hostname,
            state,
        }
    }

    fn network_labels(name: &str, subdomain: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ENVIRONMENT_LABEL.to_string(), name.to_string()),
            (SUBDOMAIN_LABEL.to_string(), subdomain.to_string()),
            (MANAGED_LABEL.to_string(), "true".to_string()),
        ])
    }

    /// Make sure a declared environment's namespace exists
    pub async fn ensure(&self, name: &str) -> Result<NetworkHandle> {
        let subdomain = self
            .subdomain_of(name)
            .ok_or_else(|| EnvironmentError::UnknownEnvironment(name.to_string()))?;
        let network = network_name(name);

        if self.runtime.network_exists(&network).await? {
            return Ok(NetworkHandle {
                name: network,
                created: false,
            });
        }

        info!("Creating namespace '{}' for environment '{}'", network, name);
        let handle = self
            .runtime
            .create_network(&network, &Self::network_labels(name, &subdomain))
            .await?;
        Ok(handle)
    }

    /// Make sure the network shared with the reverse proxy exists
    pub async fn ensure_proxy_network(&self) -> Result<NetworkHandle> {
        if self.runtime.network_exists(PROXY_NETWORK).await? {
            return Ok(NetworkHandle {
                name: PROXY_NETWORK.to_string(),
                created: false,
            });
        }
        info!("Creating shared proxy network '{}'", PROXY_NETWORK);
        let labels = BTreeMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]);
        Ok(self.runtime.create_network(PROXY_NETWORK, &labels).await?)
    }

    /// Create an environment's namespace, failing if it already exists
    ///
    /// The subdomain defaults to the declared one, then to the name.
    pub async fn create(&self, name: &str, subdomain: Option<&str>) -> Result<Environment> {
        let subdomain = subdomain
            .map(str::to_string)
            .or_else(|| self.subdomain_of(name))
            .unwrap_or_else(|| name.to_string());
        let network = network_name(name);

        if self.runtime.network_exists(&network).await? {
            return Err(EnvironmentError::NamespaceConflict {
                env: name.to_string(),
                network,
            }
            .into());
        }

        self.runtime
            .create_network(&network, &Self::network_labels(name, &subdomain))
            .await?;
        info!("Environment '{}' created ({})", name, network);
        Ok(self.describe(name, subdomain, EnvironmentState::Active))
    }

    /// Every declared environment with its current state
    pub async fn list(&self) -> Result<Vec<Environment>> {
        let mut environments = Vec::new();
        for (name, env) in &self.resolver.config().environments {
            let state = if self.runtime.network_exists(&network_name(name)).await? {
                EnvironmentState::Active
            } else {
                EnvironmentState::Absent
            };
            environments.push(self.describe(name, env.subdomain.clone(), state));
        }
        Ok(environments)
    }

    /// Tear an environment down
    ///
    /// Units are stopped and removed and the namespace is deleted. Data
    /// under `{data_dir}/{env}` is only touched with `remove_data`.
    pub async fn destroy(&self, name: &str, options: DestroyOptions) -> Result<Environment> {
        let subdomain = self
            .subdomain_of(name)
            .ok_or_else(|| EnvironmentError::UnknownEnvironment(name.to_string()))?;
        let units = self
            .runtime
            .list(&[(ENVIRONMENT_LABEL, name), (MANAGED_LABEL, "true")])
            .await?;

        let active: Vec<String> = units
            .iter()
            .filter(|u| u.status.is_active())
            .map(|u| u.unit.clone())
            .collect();
        if !active.is_empty() && !options.force {
            return Err(EnvironmentError::HasActiveDeployments {
                env: name.to_string(),
                units: active,
            }
            .into());
        }

        for unit in &units {
            if unit.status.is_active() {
                self.runtime.stop(&unit.unit).await?;
            }
            self.runtime.remove(&unit.unit).await?;
        }

        let network = network_name(name);
        if self.runtime.network_exists(&network).await? {
            self.runtime.remove_network(&network).await?;
        }

        if options.remove_data {
            let data = self.resolver.environment_data_dir(name);
            if data.exists() {
                warn!("Removing persistent data at {}", data.display());
                let target = data.clone();
                smol::unblock(move || std::fs::remove_dir_all(target))
                    .await
                    .map_err(|source| EnvironmentError::DataRemoval {
                        env: name.to_string(),
                        path: data,
                        source,
                    })?;
            }
        }

        info!(
            "Environment '{}' destroyed ({} unit(s) removed)",
            name,
            units.len()
        );
        Ok(self.describe(name, subdomain, EnvironmentState::Destroyed))
    }
}
