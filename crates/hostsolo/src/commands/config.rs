use anyhow::{Context, Result};
use hostsolo_config::{ConfigResolver, parser};
use std::path::Path;

pub fn validate(project: &Path) -> Result<()> {
    let path = parser::find_config_file(project)?;
    println!("Validating {}...", path.display());
    let config = parser::parse_file(&path).context("Failed to parse configuration")?;

    println!("✓ Configuration valid");
    println!("  Domain: {}", config.domain);
    println!(
        "  Environments: {}",
        config.environments.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("  Apps: {}", config.apps.len());
    Ok(())
}

pub fn show(project: &Path, app: &str, env: &str, json: bool) -> Result<()> {
    let resolver = ConfigResolver::discover(project)?;
    let spec = resolver.resolve(app, env)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&spec)?);
        return Ok(());
    }

    println!("{} ({})", spec.app, spec.environment);
    println!("  Unit: {}", spec.unit_name);
    println!("  Image: {}", spec.image_ref());
    println!("  Network: {}", spec.network);
    println!("  Hostname: {}", spec.hostname);
    if let Some(port) = spec.primary_port() {
        println!("  Port: {}", port);
    }
    println!("  Variables:");
    let layers = resolver.load_layers(app, env)?;
    for (key, value) in &spec.variables {
        let source = layers
            .source_of(key)
            .map(|l| l.to_string())
            .unwrap_or_default();
        println!("    {}={}  [{}]", key, value, source);
    }
    if !spec.volumes.is_empty() {
        println!("  Volumes:");
        for volume in &spec.volumes {
            println!("    {}", volume.to_arg());
        }
    }
    if !spec.backup_paths.is_empty() {
        println!("  Backup paths:");
        for path in &spec.backup_paths {
            println!("    {}", path.path.display());
        }
    }
    Ok(())
}
