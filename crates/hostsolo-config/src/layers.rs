//! Layered variable files
//!
//! Every app carries three variable layers, folded lowest to highest:
//!
//! 1. `static` - the `environment:` map in hostsolo.yaml
//! 2. `shared` - `config/{app}/shared.env`
//! 3. `environment` - `config/{app}/{env}.env`
//!
//! A key present in a higher layer always wins.

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the three variable layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    /// Defaults declared inline in hostsolo.yaml
    Static,
    /// Values shared by every environment of an app
    Shared,
    /// Values for one environment of an app
    Environment,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Static => write!(f, "static"),
            LayerKind::Shared => write!(f, "shared"),
            LayerKind::Environment => write!(f, "environment"),
        }
    }
}

/// The three layers for one (app, environment) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayeredConfig {
    /// Lowest precedence
    pub static_vars: BTreeMap<String, String>,
    /// Middle precedence
    pub shared: BTreeMap<String, String>,
    /// Highest precedence
    pub environment: BTreeMap<String, String>,
}

impl LayeredConfig {
    /// Fold the layers into one map
    pub fn merged(&self) -> BTreeMap<String, String> {
        [&self.static_vars, &self.shared, &self.environment]
            .into_iter()
            .fold(BTreeMap::new(), |mut acc, layer| {
                acc.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
                acc
            })
    }

    /// Which layer supplies the effective value of `key`
    pub fn source_of(&self, key: &str) -> Option<LayerKind> {
        if self.environment.contains_key(key) {
            Some(LayerKind::Environment)
        } else if self.shared.contains_key(key) {
            Some(LayerKind::Shared)
        } else if self.static_vars.contains_key(key) {
            Some(LayerKind::Static)
        } else {
            None
        }
    }
}

/// Path of the shared layer file for an app
pub fn shared_layer_path(project_root: &Path, app: &str) -> PathBuf {
    project_root.join("config").join(app).join("shared.env")
}

/// Path of the environment layer file for an app
pub fn environment_layer_path(project_root: &Path, app: &str, env: &str) -> PathBuf {
    project_root
        .join("config")
        .join(app)
        .join(format!("{}.env", env))
}

/// Read one layer file
pub fn read_layer_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    parse_env_str(path, &content)
}

/// Parse dotenv-style content
///
/// Blank lines and `#` comments are skipped, an optional `export ` prefix is
/// accepted, and values may be wrapped in single or double quotes.
pub fn parse_env_str(path: &Path, content: &str) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let invalid = |reason: &str| ConfigError::InvalidLayer {
            path: path.to_path_buf(),
            line: idx + 1,
            reason: reason.to_string(),
        };

        let (key, value) = line.split_once('=').ok_or_else(|| invalid("expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        {
            return Err(invalid("key contains invalid characters"));
        }

        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
