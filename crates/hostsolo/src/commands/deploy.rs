use super::{Project, print_logs};
use anyhow::Result;
use deploy_orchestration::DeployOptions;
use deploy_orchestration::runtime::LogOptions;
use std::path::Path;

pub async fn up(project: &Path, app: &str, env: &str, tag: Option<String>, pull: bool) -> Result<()> {
    let project = Project::load(project)?;
    let hostname = project.resolver.hostname(env)?;

    println!("Deploying {} to {}...", app, env);
    println!("  Domain: {}", hostname);
    if let Some(tag) = &tag {
        println!("  Tag: {}", tag);
    }

    let options = DeployOptions { tag, pull };
    let record = project.deployments().deploy_with(app, env, &options).await?;
    let scheme = if project.resolver.config().settings.local {
        "http"
    } else {
        "https"
    };
    println!("✓ {} deployed to {} ({})", app, env, record.image);
    println!("  URL: {}://{}", scheme, hostname);
    Ok(())
}

pub async fn stop(project: &Path, app: &str, env: &str) -> Result<()> {
    let project = Project::load(project)?;
    println!("Stopping {} in {}...", app, env);
    project.deployments().stop(app, env).await?;
    println!("✓ {} stopped", app);
    Ok(())
}

pub async fn restart(project: &Path, app: &str, env: &str) -> Result<()> {
    let project = Project::load(project)?;
    println!("Restarting {} in {}...", app, env);
    let record = project.deployments().restart(app, env).await?;
    println!("✓ {} restarted ({})", app, record.image);
    Ok(())
}

pub async fn logs(project: &Path, app: &str, env: &str, follow: bool, tail: usize) -> Result<()> {
    let project = Project::load(project)?;
    let options = LogOptions {
        follow,
        tail: Some(tail),
    };
    let stream = project.deployments().logs(app, env, options).await?;
    print_logs(stream).await;
    Ok(())
}
