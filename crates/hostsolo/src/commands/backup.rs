use super::{Project, require_confirmation};
use anyhow::Result;
use comfy_table::{Cell, Table};
use std::path::Path;

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub async fn now(project: &Path, app: &str, env: &str) -> Result<()> {
    let project = Project::load(project)?;
    let engine = project.backups()?;
    println!("Backing up {} ({})...", app, env);

    let snapshot = engine.backup_now(app, env).await?;
    println!("✓ Backup created: {}", snapshot.timestamp);
    println!("  Location: {} ({})", snapshot.key, engine.store().describe());
    println!("  Size: {}", human_size(snapshot.size));
    for path in &snapshot.paths {
        println!("  - {}", path);
    }
    Ok(())
}

pub async fn list(project: &Path, app: &str, env: &str, limit: usize, json: bool) -> Result<()> {
    let project = Project::load(project)?;
    let mut snapshots = project.backups()?.list(app, env).await?;
    snapshots.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }
    if snapshots.is_empty() {
        println!("No backups found for {} ({})", app, env);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["TIMESTAMP", "SIZE", "PATHS"]);
    for snapshot in &snapshots {
        table.add_row(vec![
            Cell::new(&snapshot.timestamp),
            Cell::new(human_size(snapshot.size)),
            Cell::new(snapshot.paths.join(", ")),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub async fn restore(project: &Path, app: &str, env: &str, timestamp: &str, yes: bool) -> Result<()> {
    require_confirmation(yes, &format!("overwrite the data of {} ({})", app, env))?;
    let project = Project::load(project)?;

    println!("Restoring {} ({}) from {}...", app, env, timestamp);
    let outcome = project.backups()?.restore(app, env, timestamp).await?;
    for path in &outcome.restored {
        println!("  restored {}", path.display());
    }
    println!("✓ Restore complete");
    if outcome.stopped_unit {
        println!(
            "  {} was stopped and stays stopped; run `hostsolo deploy up {} --env {}` to start it",
            app, app, env
        );
    }
    Ok(())
}

pub async fn delete(project: &Path, app: &str, env: &str, timestamp: &str, yes: bool) -> Result<()> {
    require_confirmation(yes, &format!("delete backup {}", timestamp))?;
    let project = Project::load(project)?;
    project.backups()?.delete(app, env, timestamp).await?;
    println!("✓ Backup {} deleted", timestamp);
    Ok(())
}

pub async fn prune(project: &Path, app: &str, env: &str, yes: bool) -> Result<()> {
    require_confirmation(yes, "prune backups")?;
    let project = Project::load(project)?;
    let pruned = project.backups()?.prune(app, env).await?;
    if pruned.is_empty() {
        println!("Nothing to prune for {} ({})", app, env);
    } else {
        for snapshot in &pruned {
            println!("  deleted {}", snapshot.timestamp);
        }
        println!("✓ Pruned {} backup(s)", pruned.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
