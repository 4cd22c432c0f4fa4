use super::{Project, print_logs};
use anyhow::Result;
use deploy_orchestration::proxy::PROXY_UNIT;
use deploy_orchestration::runtime::{ContainerRuntime, LogOptions};
use std::path::Path;

const PROXY_STATE_DIR: &str = ".hostsolo/traefik";

pub async fn up(project: &Path) -> Result<()> {
    let project = Project::load(project)?;
    let controller = project.deployments();
    let state_dir = project.resolver.project_root().join(PROXY_STATE_DIR);
    std::fs::create_dir_all(&state_dir)?;

    println!("Starting Traefik proxy...");
    controller.environments().ensure_proxy_network().await?;
    let unit = controller.proxy().proxy_unit(&state_dir);
    let runtime = project.runtime();
    runtime.start(&unit).await?;

    if controller.proxy().is_local() {
        println!("✓ Traefik started in local mode (plain HTTP)");
    } else {
        println!("✓ Traefik started");
        println!("  Certificates are issued on first request");
    }
    Ok(())
}

pub async fn down(project: &Path) -> Result<()> {
    let project = Project::load(project)?;
    println!("Stopping Traefik proxy...");
    project.runtime().stop(PROXY_UNIT).await?;
    println!("✓ Traefik stopped");
    Ok(())
}

pub async fn restart(project: &Path) -> Result<()> {
    let project = Project::load(project)?;
    println!("Restarting Traefik proxy...");
    project.runtime().restart(PROXY_UNIT).await?;
    println!("✓ Traefik restarted");
    Ok(())
}

pub async fn logs(project: &Path, follow: bool, tail: usize) -> Result<()> {
    let project = Project::load(project)?;
    let options = LogOptions {
        follow,
        tail: Some(tail),
    };
    let stream = project.runtime().logs(PROXY_UNIT, options).await?;
    print_logs(stream).await;
    Ok(())
}
