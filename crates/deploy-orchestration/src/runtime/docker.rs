//! Docker runtime driven through the `docker` CLI.

use super::traits::{
    ContainerRuntime, DeploymentRecord, LogOptions, NetworkHandle, SPEC_HASH_LABEL, UnitSpec,
    UnitStatus, split_image_ref,
};
use crate::errors::DeploymentError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use command_executor::{Command, Error as ExecError, Executor, LineStream, Output};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, DeploymentError>;

/// Runtime backed by the local Docker daemon
pub struct DockerRuntime {
    executor: Executor,
}

/// Subset of `docker inspect` output we rely on
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectInfo {
    id: String,
    name: String,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    started_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<InspectInfo> for DeploymentRecord {
    fn from(info: InspectInfo) -> Self {
        let (_, tag) = split_image_ref(&info.config.image);
        let started_at = info
            .state
            .started_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            // Docker reports year 1 for units that never started.
            .filter(|t| t.year() > 1);

        DeploymentRecord {
            unit: info.name.trim_start_matches('/').to_string(),
            id: info.id,
            tag: tag.to_string(),
            image: info.config.image,
            started_at,
            status: UnitStatus::parse(&info.state.status),
            labels: info.config.labels.unwrap_or_default(),
        }
    }
}

fn is_missing(output: &Output) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("no such") || stderr.contains("not found")
}

/// `docker pull` reports a fresh download on its last status line
fn pulled_newer(output: &Output) -> bool {
    output.stdout.contains("Downloaded newer image")
}

fn is_daemon_down(output: &Output) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("cannot connect to the docker daemon")
        || stderr.contains("is the docker daemon running")
        || stderr.contains("error during connect")
}

impl DockerRuntime {
    /// Create a runtime whose every call is bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            executor: Executor::local("docker").with_timeout(timeout),
        }
    }

    /// Run one docker call, translating executor failures
    async fn docker(&self, operation: &str, args: Vec<String>) -> Result<Output> {
        let command = Command::builder("docker").args(args).build();
        debug!("docker {}: {}", operation, command);

        let output = self.executor.output(command).await.map_err(|e| match e {
            ExecError::Timeout { after, .. } => DeploymentError::Timeout {
                operation: operation.to_string(),
                after,
            },
            ExecError::CommandNotFound { .. } => {
                DeploymentError::RuntimeUnreachable("docker CLI not found on PATH".to_string())
            }
            other => DeploymentError::RuntimeUnreachable(other.to_string()),
        })?;

        if !output.success() && is_daemon_down(&output) {
            return Err(DeploymentError::RuntimeUnreachable(
                output.failure_message().to_string(),
            ));
        }
        Ok(output)
    }

    /// Like [`docker`](Self::docker) but a non-zero exit is an error
    async fn docker_ok(&self, operation: &str, target: &str, args: Vec<String>) -> Result<Output> {
        let output = self.docker(operation, args).await?;
        if output.success() {
            Ok(output)
        } else if is_missing(&output) {
            Err(DeploymentError::UnitNotFound(target.to_string()))
        } else {
            Err(DeploymentError::CommandFailed {
                operation: operation.to_string(),
                target: target.to_string(),
                message: output.failure_message().to_string(),
            })
        }
    }

    async fn inspect(&self, ids: Vec<String>) -> Result<Vec<DeploymentRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let target = ids.join(" ");
        let mut args = vec![
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
        ];
        args.extend(ids);
        let output = self.docker_ok("inspect", &target, args).await?;

        let infos: Vec<InspectInfo> =
            serde_json::from_str(&output.stdout).map_err(|e| DeploymentError::CommandFailed {
                operation: "inspect".to_string(),
                target,
                message: format!("unreadable inspect output: {}", e),
            })?;
        Ok(infos.into_iter().map(DeploymentRecord::from).collect())
    }

    fn run_args(spec: &UnitSpec) -> Vec<String> {
        let mut labels = spec.labels.clone();
        labels.insert(SPEC_HASH_LABEL.to_string(), spec.fingerprint());

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];
        if let Some(network) = spec.networks.first() {
            args.extend(["--network".to_string(), network.clone()]);
        }
        if let Some(policy) = &spec.restart_policy {
            args.extend(["--restart".to_string(), policy.clone()]);
        }
        for (key, value) in &spec.env {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for volume in &spec.volumes {
            args.extend(["-v".to_string(), volume.clone()]);
        }
        for port in &spec.ports {
            args.extend(["-p".to_string(), port.clone()]);
        }
        // Routing labels ride on the create call so the proxy never sees a
        // half-built unit.
        for (key, value) in &labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }
        args.push(spec.image.clone());
        args.extend(spec.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn start(&self, spec: &UnitSpec) -> Result<DeploymentRecord> {
        if let Some(existing) = self.find(&spec.name).await? {
            if existing.status == UnitStatus::Running && existing.matches(spec) {
                info!("Unit '{}' already runs this spec, leaving it", spec.name);
                return Ok(existing);
            }
            info!(
                "Replacing unit '{}' ({}, {})",
                spec.name, existing.status, existing.image
            );
            if existing.status.is_active() {
                self.stop(&spec.name).await?;
            }
            self.remove(&spec.name).await?;
        }

        info!("Starting unit '{}' from {}", spec.name, spec.image);
        // Not docker_ok: a missing image must not read as a missing unit.
        let output = self.docker("run", Self::run_args(spec)).await?;
        if !output.success() {
            return Err(DeploymentError::CommandFailed {
                operation: "run".to_string(),
                target: spec.name.clone(),
                message: output.failure_message().to_string(),
            });
        }

        for network in spec.networks.iter().skip(1) {
            let connected = self
                .docker_ok(
                    "network connect",
                    &spec.name,
                    vec![
                        "network".to_string(),
                        "connect".to_string(),
                        network.clone(),
                        spec.name.clone(),
                    ],
                )
                .await;
            if let Err(e) = connected {
                warn!(
                    "Attaching '{}' to '{}' failed, removing the unit",
                    spec.name, network
                );
                if let Err(cleanup) = self.remove(&spec.name).await {
                    warn!("Cleanup of '{}' failed: {}", spec.name, cleanup);
                }
                return Err(e);
            }
        }

        self.status(&spec.name).await
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.docker_ok("stop", unit, vec!["stop".to_string(), unit.to_string()])
            .await?;
        info!("Stopped unit '{}'", unit);
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<bool> {
        info!("Pulling {}", image);
        // Not docker_ok: an unknown image must not read as a missing unit.
        let output = self
            .docker("pull", vec!["pull".to_string(), image.to_string()])
            .await?;
        if !output.success() {
            return Err(DeploymentError::CommandFailed {
                operation: "pull".to_string(),
                target: image.to_string(),
                message: output.failure_message().to_string(),
            });
        }
        let newer = pulled_newer(&output);
        debug!("Pulled {} (newer image: {})", image, newer);
        Ok(newer)
    }

    async fn restart(&self, unit: &str) -> Result<DeploymentRecord> {
        self.docker_ok("restart", unit, vec!["restart".to_string(), unit.to_string()])
            .await?;
        info!("Restarted unit '{}'", unit);
        self.status(unit).await
    }

    async fn remove(&self, unit: &str) -> Result<()> {
        match self
            .docker_ok(
                "rm",
                unit,
                vec!["rm".to_string(), "-f".to_string(), unit.to_string()],
            )
            .await
        {
            Ok(_) => {
                info!("Removed unit '{}'", unit);
                Ok(())
            }
            Err(DeploymentError::UnitNotFound(_)) => {
                debug!("Unit '{}' already gone", unit);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn status(&self, unit: &str) -> Result<DeploymentRecord> {
        self.inspect(vec![unit.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeploymentError::UnitNotFound(unit.to_string()))
    }

    async fn logs(&self, unit: &str, options: LogOptions) -> Result<LineStream> {
        // Fail fast on a missing unit instead of streaming docker's error.
        self.status(unit).await?;

        let mut command = Command::builder("docker").arg("logs");
        if options.follow {
            command = command.arg("--follow");
        }
        if let Some(tail) = options.tail {
            command = command.arg("--tail").arg(tail.to_string());
        }
        let command = command.arg(unit).build();

        self.executor.stream(command).await.map_err(|e| match e {
            ExecError::Timeout { after, .. } => DeploymentError::Timeout {
                operation: "logs".to_string(),
                after,
            },
            other => DeploymentError::RuntimeUnreachable(other.to_string()),
        })
    }

    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<DeploymentRecord>> {
        let mut args = vec!["ps".to_string(), "-a".to_string(), "-q".to_string()];
        for (key, value) in labels {
            args.extend(["--filter".to_string(), format!("label={}={}", key, value)]);
        }
        let output = self.docker_ok("ps", "units", args).await?;
        let ids: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let mut records = self.inspect(ids).await?;
        records.sort_by(|a, b| a.unit.cmp(&b.unit));
        Ok(records)
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .docker(
                "network inspect",
                vec!["network".to_string(), "inspect".to_string(), name.to_string()],
            )
            .await?;
        if output.success() {
            Ok(true)
        } else if is_missing(&output) {
            Ok(false)
        } else {
            Err(DeploymentError::CommandFailed {
                operation: "network inspect".to_string(),
                target: name.to_string(),
                message: output.failure_message().to_string(),
            })
        }
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<NetworkHandle> {
        let mut args = vec!["network".to_string(), "create".to_string()];
        for (key, value) in labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }
        args.push(name.to_string());
        self.docker_ok("network create", name, args).await?;
        info!("Created network '{}'", name);
        Ok(NetworkHandle {
            name: name.to_string(),
            created: true,
        })
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.docker_ok(
            "network rm",
            name,
            vec!["network".to_string(), "rm".to_string(), name.to_string()],
        )
        .await?;
        info!("Removed network '{}'", name);
        Ok(())
    }
}
