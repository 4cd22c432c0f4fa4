//! In-memory runtime for tests.

use super::traits::{
    ContainerRuntime, DeploymentRecord, LogOptions, NetworkHandle, SPEC_HASH_LABEL, UnitSpec,
    UnitStatus, split_image_ref,
};
use crate::errors::DeploymentError;
use async_trait::async_trait;
use chrono::Utc;
use command_executor::{LineStream, LogLine, LogSource};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Result<T> = std::result::Result<T, DeploymentError>;

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<String, DeploymentRecord>,
    networks: BTreeMap<String, BTreeMap<String, String>>,
    logs: BTreeMap<String, Vec<String>>,
    newer_images: BTreeSet<String>,
    calls: Vec<String>,
    next_id: u64,
    unreachable: bool,
}

/// Records every call and keeps units in a map
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
}

const READ_ONLY_CALLS: &[&str] = &["status", "list", "logs", "network_exists"];

impl MemoryRuntime {
    /// Empty runtime
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut State, call: String) -> Result<()> {
        state.calls.push(call);
        if state.unreachable {
            return Err(DeploymentError::RuntimeUnreachable(
                "memory runtime switched off".to_string(),
            ));
        }
        Ok(())
    }

    /// Every call in order, as `"<operation> <target>"`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls that change runtime state
    pub fn mutating_calls(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| {
                let op = c.split(' ').next().unwrap_or_default();
                !READ_ONLY_CALLS.contains(&op)
            })
            .cloned()
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of units, in any status
    pub fn unit_count(&self) -> usize {
        self.state().units.len()
    }

    /// Names of existing networks
    pub fn networks(&self) -> Vec<String> {
        self.state().networks.keys().cloned().collect()
    }

    /// Force a unit into a status, e.g. to simulate a transition
    pub fn set_status(&self, unit: &str, status: UnitStatus) {
        if let Some(record) = self.state().units.get_mut(unit) {
            record.status = status;
        }
    }

    /// Lines returned by `logs` for a unit
    pub fn set_logs(&self, unit: &str, lines: Vec<String>) {
        self.state().logs.insert(unit.to_string(), lines);
    }

    /// Have the next pull of `image` report a newer download
    pub fn publish_newer_image(&self, image: &str) {
        self.state().newer_images.insert(image.to_string());
    }

    /// Make every following call fail as unreachable
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn start(&self, spec: &UnitSpec) -> Result<DeploymentRecord> {
        let mut state = self.state();
        Self::record(&mut state, format!("start {}", spec.name))?;

        let fingerprint = spec.fingerprint();
        if let Some(existing) = state.units.get(&spec.name) {
            if existing.status == UnitStatus::Running
                && existing.spec_hash() == Some(fingerprint.as_str())
            {
                return Ok(existing.clone());
            }
        }
        for network in &spec.networks {
            if !state.networks.contains_key(network) {
                return Err(DeploymentError::CommandFailed {
                    operation: "run".to_string(),
                    target: spec.name.clone(),
                    message: format!("network {} not found", network),
                });
            }
        }

        state.next_id += 1;
        let mut labels = spec.labels.clone();
        labels.insert(SPEC_HASH_LABEL.to_string(), fingerprint);
        let record = DeploymentRecord {
            unit: spec.name.clone(),
            id: format!("mem{:08}", state.next_id),
            image: spec.image.clone(),
            tag: split_image_ref(&spec.image).1.to_string(),
            started_at: Some(Utc::now()),
            status: UnitStatus::Running,
            labels,
        };
        state.units.insert(spec.name.clone(), record.clone());
        Ok(record)
    }

    async fn pull(&self, image: &str) -> Result<bool> {
        let mut state = self.state();
        Self::record(&mut state, format!("pull {}", image))?;
        Ok(state.newer_images.remove(image))
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, format!("stop {}", unit))?;
        let record = state
            .units
            .get_mut(unit)
            .ok_or_else(|| DeploymentError::UnitNotFound(unit.to_string()))?;
        record.status = UnitStatus::Exited;
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<DeploymentRecord> {
        let mut state = self.state();
        Self::record(&mut state, format!("restart {}", unit))?;
        let record = state
            .units
            .get_mut(unit)
            .ok_or_else(|| DeploymentError::UnitNotFound(unit.to_string()))?;
        record.status = UnitStatus::Running;
        record.started_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn remove(&self, unit: &str) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, format!("remove {}", unit))?;
        state.units.remove(unit);
        Ok(())
    }

    async fn status(&self, unit: &str) -> Result<DeploymentRecord> {
        let mut state = self.state();
        Self::record(&mut state, format!("status {}", unit))?;
        state
            .units
            .get(unit)
            .cloned()
            .ok_or_else(|| DeploymentError::UnitNotFound(unit.to_string()))
    }

    async fn logs(&self, unit: &str, options: LogOptions) -> Result<LineStream> {
        let mut state = self.state();
        Self::record(&mut state, format!("logs {}", unit))?;
        if !state.units.contains_key(unit) {
            return Err(DeploymentError::UnitNotFound(unit.to_string()));
        }
        let mut lines = state.logs.get(unit).cloned().unwrap_or_default();
        if let Some(tail) = options.tail {
            let skip = lines.len().saturating_sub(tail);
            lines.drain(..skip);
        }
        Ok(stream::iter(lines)
            .map(|line| LogLine::new(LogSource::Stdout, line))
            .boxed())
    }

    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<DeploymentRecord>> {
        let mut state = self.state();
        Self::record(&mut state, "list units".to_string())?;
        Ok(state
            .units
            .values()
            .filter(|record| {
                labels
                    .iter()
                    .all(|(k, v)| record.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .cloned()
            .collect())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state();
        Self::record(&mut state, format!("network_exists {}", name))?;
        Ok(state.networks.contains_key(name))
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<NetworkHandle> {
        let mut state = self.state();
        Self::record(&mut state, format!("create_network {}", name))?;
        if state.networks.contains_key(name) {
            return Err(DeploymentError::CommandFailed {
                operation: "network create".to_string(),
                target: name.to_string(),
                message: "network already exists".to_string(),
            });
        }
        state.networks.insert(name.to_string(), labels.clone());
        Ok(NetworkHandle {
            name: name.to_string(),
            created: true,
        })
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, format!("remove_network {}", name))?;
        state
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DeploymentError::UnitNotFound(name.to_string()))
    }
}
