pub mod backup;
pub mod config;
pub mod deploy;
pub mod dns;
pub mod env;
pub mod proxy;
pub mod status;

use anyhow::{Context, Result};
use deploy_orchestration::backup::store_from_config;
use deploy_orchestration::dns::{DnsimpleProvider, HttpIpSource};
use deploy_orchestration::runtime::{ContainerRuntime, DockerRuntime, LineStream, LogSource};
use deploy_orchestration::{BackupEngine, DeploymentController, DnsReconciler, EnvironmentManager};
use futures::StreamExt;
use hostsolo_config::{ConfigResolver, Credentials};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A loaded project and the engine pieces built from it
pub struct Project {
    pub resolver: ConfigResolver,
    credentials: Credentials,
}

impl Project {
    pub fn load(start: &Path) -> Result<Self> {
        let resolver = ConfigResolver::discover(start).context("Failed to load hostsolo.yaml")?;
        let credentials = Credentials::load(resolver.project_root())
            .context("Failed to read credentials")?;
        Ok(Self {
            resolver,
            credentials,
        })
    }

    fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.config().settings.runtime_timeout)
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.config().settings.http_timeout)
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::new(DockerRuntime::new(self.runtime_timeout()))
    }

    pub fn deployments(&self) -> DeploymentController {
        DeploymentController::new(self.resolver.clone(), self.runtime())
    }

    pub fn environments(&self) -> EnvironmentManager {
        EnvironmentManager::new(self.resolver.clone(), self.runtime())
    }

    pub fn backups(&self) -> Result<BackupEngine> {
        let store = store_from_config(&self.resolver, &self.credentials)?;
        Ok(BackupEngine::new(self.resolver.clone(), self.runtime(), store))
    }

    pub fn dns(&self) -> Result<DnsReconciler> {
        let credentials = self.credentials.require_dnsimple()?;
        let provider = DnsimpleProvider::new(credentials, self.http_timeout())?;
        Ok(DnsReconciler::new(
            self.resolver.clone(),
            Arc::new(provider),
            Arc::new(HttpIpSource::new(self.http_timeout())),
        ))
    }
}

/// Refuse destructive verbs without an explicit `--yes`
pub fn require_confirmation(yes: bool, action: &str) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to {} without --yes", action);
    }
    Ok(())
}

/// Print log lines until the stream ends
pub async fn print_logs(mut stream: LineStream) {
    while let Some(line) = stream.next().await {
        match line.source {
            LogSource::Stdout => println!("{}", line.line),
            LogSource::Stderr => eprintln!("{}", line.line),
        }
    }
}
