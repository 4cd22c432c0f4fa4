//! Deployment lifecycle per (app, environment)
//!
//! The controller never keeps state of its own. The current
//! [`DeploymentState`] is derived from the runtime record on every call.

use crate::environment::EnvironmentManager;
use crate::errors::DeploymentError;
use crate::proxy::{ProxyController, RoutingIntent};
use crate::runtime::{
    APP_LABEL, ContainerRuntime, DeploymentRecord, ENVIRONMENT_LABEL, LogOptions, MANAGED_LABEL,
    UnitSpec, UnitStatus,
};
use crate::Result;
use chrono::{DateTime, Utc};
use command_executor::LineStream;
use hostsolo_config::{ConfigResolver, EffectiveSpec, PROXY_NETWORK, unit_name};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle state of one app in one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeploymentState {
    /// No unit exists
    Absent,
    /// Unit is being created
    Starting,
    /// Unit is running
    Running,
    /// Unit is being restarted, possibly backing off after crashes
    Restarting,
    /// Unit is going down
    Stopping,
    /// Unit exists but is not running
    Stopped,
}

impl DeploymentState {
    /// Derive the state from a runtime record
    pub fn from_record(record: Option<&DeploymentRecord>) -> Self {
        match record.map(|r| &r.status) {
            None => DeploymentState::Absent,
            Some(UnitStatus::Running) => DeploymentState::Running,
            Some(UnitStatus::Restarting) => DeploymentState::Restarting,
            Some(UnitStatus::Removing) => DeploymentState::Stopping,
            Some(_) => DeploymentState::Stopped,
        }
    }

    /// Whether the runtime is in the middle of changing the unit
    ///
    /// `Restarting` is not one: the runtime reports a crash-looping unit
    /// that way and it must stay stoppable and replaceable.
    pub fn is_transitioning(self) -> bool {
        matches!(self, DeploymentState::Starting | DeploymentState::Stopping)
    }

    /// Whether a unit in this state can be stopped
    pub fn is_up(self) -> bool {
        matches!(self, DeploymentState::Running | DeploymentState::Restarting)
    }

    /// Allowed edges of the lifecycle graph
    pub fn can_transition_to(self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Absent, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Running, Restarting)
                // replace with a new spec
                | (Running, Starting)
                | (Restarting, Running)
                | (Restarting, Stopping)
                | (Restarting, Starting)
                | (Stopping, Stopped)
                | (Stopped, Starting)
                | (Stopped, Absent)
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentState::Absent => "absent",
            DeploymentState::Starting => "starting",
            DeploymentState::Running => "running",
            DeploymentState::Restarting => "restarting",
            DeploymentState::Stopping => "stopping",
            DeploymentState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// One row of the status overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    /// Application name
    pub app: String,
    /// Environment name
    pub environment: String,
    /// Unit name
    pub unit: String,
    /// Derived state
    pub state: DeploymentState,
    /// Running tag, if a unit exists
    pub tag: Option<String>,
    /// Public hostname
    pub hostname: String,
    /// Last start time
    pub started_at: Option<DateTime<Utc>>,
}

/// Options for [`DeploymentController::deploy_with`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Deploy this tag instead of the declared one
    pub tag: Option<String>,
    /// Pull the image first; a newer image replaces an otherwise unchanged unit
    pub pull: bool,
}

/// Drives deploy, stop, restart and logs
#[derive(Clone)]
pub struct DeploymentController {
    resolver: ConfigResolver,
    environments: EnvironmentManager,
    runtime: Arc<dyn ContainerRuntime>,
    proxy: ProxyController,
}

impl DeploymentController {
    /// Create a controller over a runtime
    pub fn new(resolver: ConfigResolver, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let proxy = ProxyController::from_config(resolver.config());
        let environments = EnvironmentManager::new(resolver.clone(), Arc::clone(&runtime));
        Self {
            resolver,
            environments,
            runtime,
            proxy,
        }
    }

    /// The environment manager this controller ensures namespaces with
    pub fn environments(&self) -> &EnvironmentManager {
        &self.environments
    }

    /// The proxy controller routing intent comes from
    pub fn proxy(&self) -> &ProxyController {
        &self.proxy
    }

    fn checked_unit(&self, app: &str, env: &str) -> Result<String> {
        let config = self.resolver.config();
        config.app(app)?;
        config.environment(env)?;
        Ok(unit_name(env, app))
    }

    /// Unit spec for an effective spec and its routing intent
    pub fn unit_spec(spec: &EffectiveSpec, intent: &RoutingIntent) -> UnitSpec {
        let mut labels = BTreeMap::from([
            (APP_LABEL.to_string(), spec.app.clone()),
            (ENVIRONMENT_LABEL.to_string(), spec.environment.clone()),
            (MANAGED_LABEL.to_string(), "true".to_string()),
        ]);
        labels.extend(intent.labels());

        let mut networks = vec![spec.network.clone()];
        if intent.enabled() {
            networks.push(PROXY_NETWORK.to_string());
        }

        UnitSpec {
            name: spec.unit_name.clone(),
            image: spec.image_ref(),
            networks,
            env: spec.variables.clone(),
            volumes: spec.volumes.iter().map(|v| v.to_arg()).collect(),
            ports: Vec::new(),
            labels,
            args: Vec::new(),
            restart_policy: Some("unless-stopped".to_string()),
        }
    }

    /// Current state, read from the runtime
    pub async fn state(&self, app: &str, env: &str) -> Result<DeploymentState> {
        let unit = self.checked_unit(app, env)?;
        let record = self.runtime.find(&unit).await?;
        Ok(DeploymentState::from_record(record.as_ref()))
    }

    fn transition(unit: &str, from: DeploymentState, to: DeploymentState) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(DeploymentError::InvalidTransition {
                unit: unit.to_string(),
                from,
                to,
            }
            .into());
        }
        info!("{}: {} -> {}", unit, from, to);
        Ok(())
    }

    /// Deploy an app, optionally at a specific tag, without pulling
    ///
    /// Deploying the same spec twice leaves the running unit alone.
    pub async fn deploy(&self, app: &str, env: &str, tag: Option<&str>) -> Result<DeploymentRecord> {
        let options = DeployOptions {
            tag: tag.map(str::to_string),
            pull: false,
        };
        self.deploy_with(app, env, &options).await
    }

    /// Deploy an app
    ///
    /// With `pull`, the image is fetched before anything else changes. A
    /// running unit with the same spec is only replaced when the pull
    /// brought in a newer image.
    pub async fn deploy_with(
        &self,
        app: &str,
        env: &str,
        options: &DeployOptions,
    ) -> Result<DeploymentRecord> {
        let spec = self
            .resolver
            .resolve_with_tag(app, env, options.tag.as_deref())?;
        let current = self.runtime.find(&spec.unit_name).await?;
        let mut state = DeploymentState::from_record(current.as_ref());
        if state.is_transitioning() {
            return Err(DeploymentError::ReplaceInProgress {
                unit: spec.unit_name.clone(),
                state,
            }
            .into());
        }

        let intent = self.proxy.publish(&spec);
        let unit = Self::unit_spec(&spec, &intent);

        let refreshed = if options.pull {
            self.runtime.pull(&unit.image).await?
        } else {
            false
        };

        if let Some(record) = &current {
            if state == DeploymentState::Running && record.matches(&unit) {
                if !refreshed {
                    info!("{} already runs {}, nothing to do", unit.name, unit.image);
                    return Ok(record.clone());
                }
                info!("{}: newer image for {}, replacing", unit.name, unit.image);
                Self::transition(&unit.name, state, DeploymentState::Stopping)?;
                self.runtime.stop(&unit.name).await?;
                self.runtime.remove(&unit.name).await?;
                state = DeploymentState::Absent;
            }
        }

        self.environments.ensure(env).await?;
        if intent.enabled() {
            self.environments.ensure_proxy_network().await?;
        }

        Self::transition(&unit.name, state, DeploymentState::Starting)?;
        let record = self.runtime.start(&unit).await?;
        info!(
            "{}: {} -> {} ({})",
            unit.name,
            DeploymentState::Starting,
            DeploymentState::from_record(Some(&record)),
            record.image
        );
        Ok(record)
    }

    /// Stop a running app
    ///
    /// Fails with [`DeploymentError::NotRunning`] without touching the
    /// runtime when nothing is running.
    pub async fn stop(&self, app: &str, env: &str) -> Result<DeploymentRecord> {
        let unit = self.checked_unit(app, env)?;
        let record = self.runtime.find(&unit).await?;
        let state = DeploymentState::from_record(record.as_ref());
        if !state.is_up() {
            debug!("{} is {}, refusing to stop", unit, state);
            return Err(DeploymentError::NotRunning {
                app: app.to_string(),
                env: env.to_string(),
            }
            .into());
        }

        Self::transition(&unit, state, DeploymentState::Stopping)?;
        self.runtime.stop(&unit).await?;
        let record = self.runtime.status(&unit).await?;
        info!("{}: {} -> {}", unit, DeploymentState::Stopping, DeploymentState::Stopped);
        Ok(record)
    }

    /// Restart an app at the tag it was last running
    ///
    /// An unchanged spec restarts in place; a changed one is stopped and
    /// deployed again.
    pub async fn restart(&self, app: &str, env: &str) -> Result<DeploymentRecord> {
        let unit_name = self.checked_unit(app, env)?;
        let Some(record) = self.runtime.find(&unit_name).await? else {
            return Err(DeploymentError::NotRunning {
                app: app.to_string(),
                env: env.to_string(),
            }
            .into());
        };
        let state = DeploymentState::from_record(Some(&record));
        if state.is_transitioning() {
            return Err(DeploymentError::ReplaceInProgress {
                unit: unit_name,
                state,
            }
            .into());
        }

        let spec = self.resolver.resolve_with_tag(app, env, Some(&record.tag))?;
        let unit = Self::unit_spec(&spec, &self.proxy.publish(&spec));

        if state == DeploymentState::Running && record.matches(&unit) {
            Self::transition(&unit_name, state, DeploymentState::Restarting)?;
            let restarted = self.runtime.restart(&unit_name).await?;
            info!(
                "{}: {} -> {}",
                unit_name,
                DeploymentState::Restarting,
                DeploymentState::from_record(Some(&restarted))
            );
            return Ok(restarted);
        }

        if state.is_up() {
            Self::transition(&unit_name, state, DeploymentState::Stopping)?;
            self.runtime.stop(&unit_name).await?;
        }
        self.deploy(app, env, Some(&record.tag)).await
    }

    /// Stream an app's logs
    pub async fn logs(&self, app: &str, env: &str, options: LogOptions) -> Result<LineStream> {
        let unit = self.checked_unit(app, env)?;
        Ok(self.runtime.logs(&unit, options).await?)
    }

    /// Overview of every declared app, optionally limited to one environment
    pub async fn status(&self, env: Option<&str>) -> Result<Vec<UnitSummary>> {
        let config = self.resolver.config();
        if let Some(env) = env {
            config.environment(env)?;
        }

        let mut filter = vec![(MANAGED_LABEL, "true")];
        if let Some(env) = env {
            filter.push((ENVIRONMENT_LABEL, env));
        }
        let records: BTreeMap<String, DeploymentRecord> = self
            .runtime
            .list(&filter)
            .await?
            .into_iter()
            .map(|r| (r.unit.clone(), r))
            .collect();

        let mut summaries = Vec::new();
        for (env_name, env_config) in &config.environments {
            if env.is_some_and(|e| e != env_name.as_str()) {
                continue;
            }
            for app in config.apps.keys() {
                let unit = unit_name(env_name, app);
                let record = records.get(&unit);
                summaries.push(UnitSummary {
                    app: app.clone(),
                    environment: env_name.clone(),
                    state: DeploymentState::from_record(record),
                    tag: record.map(|r| r.tag.clone()),
                    hostname: env_config.hostname(&config.domain),
                    started_at: record.and_then(|r| r.started_at),
                    unit,
                });
            }
        }
        Ok(summaries)
    }
}
