//! YAML parser for hostsolo.yaml

use crate::{Config, ConfigError, Result, default_environments};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names searched for, in order, in every directory
pub const CONFIG_FILE_NAMES: &[&str] = &["hostsolo.yaml", "hostsolo.yml"];

const DNS_PROVIDERS: &[&str] = &["dnsimple"];
const BACKUP_PROVIDERS: &[&str] = &["s3", "local"];

/// Walk from `start` towards the filesystem root looking for a config file
pub fn find_config_file(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!("Found config at {}", candidate.display());
                return Ok(candidate);
            }
        }
        current = dir.parent();
    }
    Err(ConfigError::ConfigNotFound(start.to_path_buf()))
}

/// Parse a configuration file
pub fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse configuration from a string
pub fn parse_str(content: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(content)?;
    if config.environments.is_empty() {
        config.environments = default_environments();
    }
    validate_config(&config)?;
    Ok(config)
}

/// Validate a configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.domain.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "'domain' must not be empty".to_string(),
        ));
    }

    if !DNS_PROVIDERS.contains(&config.dns.provider.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "Unknown DNS provider '{}'",
            config.dns.provider
        )));
    }

    if !BACKUP_PROVIDERS.contains(&config.backup.provider.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "Unknown backup provider '{}'",
            config.backup.provider
        )));
    }

    let mut subdomains = HashSet::new();
    for (name, env) in &config.environments {
        validate_name("environment", name)?;
        if !subdomains.insert(env.subdomain.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Environment '{}' reuses subdomain '{}'",
                name, env.subdomain
            )));
        }
    }

    for (name, app) in &config.apps {
        validate_name("app", name)?;

        if app.image.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "App '{}' has no image",
                name
            )));
        }

        for volume in &app.volumes {
            let parts: Vec<&str> = volume.split(':').collect();
            if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "App '{}' has malformed volume '{}', expected source:target[:mode]",
                    name, volume
                )));
            }
        }

        for port in &app.ports {
            if port.container_port().is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "App '{}' has malformed port {:?}",
                    name, port
                )));
            }
        }
    }

    Ok(())
}

/// Names end up in container and network names, keep them DNS-safe
fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "Invalid {} name '{}': use lowercase letters, digits, '-' or '_'",
            kind, name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
domain: example.com
email: ops@example.com
apps:
  directus:
    image: directus/directus
    tag: "10.8"
    ports: [8055]
    volumes:
      - ./data/${ENV}/directus/uploads:/directus/uploads
    environment:
      DB_CLIENT: sqlite3
    backup_paths:
      - ./data/${ENV}/directus
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_str(MINIMAL).unwrap();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.dns.provider, "dnsimple");
        assert_eq!(config.dns.ttl, 3600);
        assert_eq!(config.backup.provider, "s3");
        assert_eq!(config.settings.runtime_timeout, 120);

        let app = config.app("directus").unwrap();
        assert_eq!(app.tag, "10.8");
        assert_eq!(app.environment["DB_CLIENT"], "sqlite3");
    }

    #[test]
    fn test_default_environments_applied() {
        let config = parse_str(MINIMAL).unwrap();
        assert_eq!(config.environments.len(), 3);
        assert_eq!(config.full_domain("dev").unwrap(), "dev.example.com");
        assert_eq!(config.full_domain("prod").unwrap(), "example.com");
    }

    #[test]
    fn test_declared_environments_replace_defaults() {
        let yaml = r#"
domain: example.com
email: ops@example.com
environments:
  qa:
    subdomain: qa
"#;
        let config = parse_str(yaml).unwrap();
        assert_eq!(config.environments.len(), 1);
        assert!(matches!(
            config.environment("dev"),
            Err(ConfigError::EnvironmentNotFound(_))
        ));
    }

    #[test]
    fn test_empty_domain_rejected() {
        let yaml = "domain: ''\nemail: a@b.c\n";
        assert!(matches!(
            parse_str(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_duplicate_subdomain_rejected() {
        let yaml = r#"
domain: example.com
email: ops@example.com
environments:
  a: { subdomain: x }
  b: { subdomain: x }
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("reuses subdomain"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let yaml = r#"
domain: example.com
email: ops@example.com
backup:
  provider: ftp
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("Unknown backup provider"));
    }

    #[test]
    fn test_malformed_volume_rejected() {
        let yaml = r#"
domain: example.com
email: ops@example.com
apps:
  web:
    image: nginx
    volumes: ["/only-one-part"]
"#;
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("malformed volume"));
    }

    #[test]
    fn test_invalid_app_name_rejected() {
        let yaml = r#"
domain: example.com
email: ops@example.com
apps:
  My App:
    image: nginx
"#;
        assert!(parse_str(yaml).is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hostsolo.yml"), MINIMAL).unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("hostsolo.yml"));
    }
}
