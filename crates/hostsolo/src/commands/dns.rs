use super::{Project, require_confirmation};
use anyhow::Result;
use comfy_table::{Cell, Table};
use deploy_orchestration::{DnsError, Error};
use std::path::Path;
use tracing::info;

pub async fn setup(project: &Path, app: &str, env: &str, ip: Option<&str>) -> Result<()> {
    let project = Project::load(project)?;
    let outcome = project.dns()?.sync_with_target(app, env, ip).await?;
    println!(
        "✓ {} {} -> {} ({})",
        outcome.record.record_type,
        outcome.record.hostname(),
        outcome.record.content,
        outcome.action
    );
    Ok(())
}

pub async fn list(project: &Path) -> Result<()> {
    let project = Project::load(project)?;
    let records = project.dns()?.records().await?;
    if records.is_empty() {
        println!("No records in {}", project.resolver.config().domain);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["NAME", "TYPE", "CONTENT", "TTL"]);
    for record in &records {
        let name = if record.name.is_empty() {
            "@"
        } else {
            record.name.as_str()
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(&record.record_type),
            Cell::new(&record.content),
            Cell::new(record.ttl),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub async fn delete(project: &Path, env: &str, yes: bool) -> Result<()> {
    require_confirmation(yes, &format!("delete the DNS record of '{}'", env))?;
    let project = Project::load(project)?;
    match project.dns()?.delete(env).await {
        Ok(record) => {
            println!("✓ Deleted {} {}", record.record_type, record.hostname());
            Ok(())
        }
        Err(Error::Dns(DnsError::NotFound { name, .. })) => {
            info!("No record for {}, already consistent", name);
            println!("✓ No record for {}", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
