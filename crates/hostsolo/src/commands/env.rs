use super::{Project, require_confirmation};
use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use deploy_orchestration::{DestroyOptions, EnvironmentState};
use std::path::Path;

/// List environments and their network state
pub async fn list(project: &Path) -> Result<()> {
    let project = Project::load(project)?;
    let environments = project.environments().list().await?;

    let mut table = Table::new();
    table.set_header(vec!["ENVIRONMENT", "DOMAIN", "NETWORK", "STATE"]);
    for env in &environments {
        let color = match env.state {
            EnvironmentState::Active => Color::Green,
            _ => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&env.name),
            Cell::new(&env.hostname),
            Cell::new(&env.network),
            Cell::new(env.state).fg(color),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub async fn create(project: &Path, name: &str, subdomain: Option<&str>) -> Result<()> {
    let project = Project::load(project)?;
    let env = project.environments().create(name, subdomain).await?;
    println!("✓ Environment '{}' created", env.name);
    println!("  Network: {}", env.network);
    println!("  Domain: {}", env.hostname);
    if project.resolver.config().environments.get(name).is_none() {
        println!(
            "  ⚠ '{}' is not declared in hostsolo.yaml; add it under environments to deploy to it",
            name
        );
    }
    Ok(())
}

pub async fn destroy(
    project: &Path,
    name: &str,
    remove_data: bool,
    force: bool,
    yes: bool,
) -> Result<()> {
    require_confirmation(yes, &format!("destroy environment '{}'", name))?;
    let project = Project::load(project)?;

    println!("Destroying environment '{}'...", name);
    let env = project
        .environments()
        .destroy(name, DestroyOptions { remove_data, force })
        .await?;
    println!("✓ Environment '{}' {}", env.name, env.state);
    if remove_data {
        println!(
            "  Data removed: {}",
            project.resolver.environment_data_dir(name).display()
        );
    }
    Ok(())
}
