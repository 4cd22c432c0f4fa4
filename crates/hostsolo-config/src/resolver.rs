//! Effective-spec resolution
//!
//! [`ConfigResolver`] combines the app declaration, the three variable
//! layers and the environment declaration into an [`EffectiveSpec`]. It
//! only ever reads files, and it reads them again on every call so an edit
//! to a layer file is visible on the next operation.

use crate::layers::{self, LayerKind, LayeredConfig};
use crate::{Config, ConfigError, Result, parser};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Network every routed unit and the reverse proxy share
pub const PROXY_NETWORK: &str = "hostsolo-proxy";

/// Network namespace of an environment
pub fn network_name(env: &str) -> String {
    format!("hostsolo-{}", env)
}

/// Runtime unit name of an app in an environment
pub fn unit_name(env: &str, app: &str) -> String {
    format!("hostsolo-{}-{}", env, app)
}

/// A volume mount with its source resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    /// Absolute host path, or a named volume
    pub source: String,
    /// Path inside the container
    pub target: String,
    /// Optional mount mode such as `ro`
    pub mode: Option<String>,
}

impl VolumeMount {
    /// `source:target[:mode]` as the runtime expects it
    pub fn to_arg(&self) -> String {
        match &self.mode {
            Some(mode) => format!("{}:{}:{}", self.source, self.target, mode),
            None => format!("{}:{}", self.source, self.target),
        }
    }
}

/// A backup path with its placeholders substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupPath {
    /// The path as declared, after substitution (may be relative)
    pub declared: String,
    /// Absolute location on disk
    pub path: PathBuf,
}

/// Fully merged runtime specification for one (app, environment) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSpec {
    /// Application name
    pub app: String,
    /// Environment name
    pub environment: String,
    /// Runtime unit name, `hostsolo-{env}-{app}`
    pub unit_name: String,
    /// Image repository
    pub image: String,
    /// Image tag to run
    pub tag: String,
    /// Merged variables
    pub variables: BTreeMap<String, String>,
    /// Resolved volume mounts
    pub volumes: Vec<VolumeMount>,
    /// Resolved backup paths
    pub backup_paths: Vec<BackupPath>,
    /// Environment network namespace
    pub network: String,
    /// Public hostname
    pub hostname: String,
    /// Container ports, first one is routed
    pub ports: Vec<u16>,
    /// Health-check path for the proxy
    pub healthcheck_path: Option<String>,
}

impl EffectiveSpec {
    /// `image:tag`
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Port the proxy routes to
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }
}

/// Resolves effective specs from an explicitly passed configuration
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    config: Arc<Config>,
    project_root: PathBuf,
}

impl ConfigResolver {
    /// Create a resolver over a parsed configuration
    pub fn new(config: Arc<Config>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
        }
    }

    /// Locate hostsolo.yaml from `start` upwards and load it
    pub fn discover(start: &Path) -> Result<Self> {
        let path = parser::find_config_file(start)?;
        let config = parser::parse_file(&path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf());
        Ok(Self::new(Arc::new(config), root))
    }

    /// The loaded configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Directory holding hostsolo.yaml
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Absolute root of persistent app data
    pub fn data_dir(&self) -> PathBuf {
        self.absolutize(&self.config.data_dir)
    }

    /// Persistent-data tree of one environment
    pub fn environment_data_dir(&self, env: &str) -> PathBuf {
        self.data_dir().join(env)
    }

    /// Public hostname of an environment
    pub fn hostname(&self, env: &str) -> Result<String> {
        self.config.full_domain(env)
    }

    /// Read the three variable layers of an app
    pub fn load_layers(&self, app: &str, env: &str) -> Result<LayeredConfig> {
        let app_config = self.config.app(app)?;
        self.config.environment(env)?;

        let shared = self.read_layer(
            app,
            env,
            LayerKind::Shared,
            layers::shared_layer_path(&self.project_root, app),
        )?;
        let environment = self.read_layer(
            app,
            env,
            LayerKind::Environment,
            layers::environment_layer_path(&self.project_root, app, env),
        )?;

        Ok(LayeredConfig {
            static_vars: app_config.environment.clone(),
            shared,
            environment,
        })
    }

    /// Resolve the effective spec with the app's declared tag
    pub fn resolve(&self, app: &str, env: &str) -> Result<EffectiveSpec> {
        self.resolve_with_tag(app, env, None)
    }

    /// Resolve the effective spec, optionally overriding the image tag
    pub fn resolve_with_tag(&self, app: &str, env: &str, tag: Option<&str>) -> Result<EffectiveSpec> {
        let app_config = self.config.app(app)?;
        let hostname = self.hostname(env)?;
        let layered = self.load_layers(app, env)?;

        let volumes = app_config
            .volumes
            .iter()
            .map(|volume| self.resolve_volume(volume, app, env))
            .collect::<Result<Vec<_>>>()?;

        let backup_paths = app_config
            .backup_paths
            .iter()
            .map(|declared| {
                let declared = substitute(declared, app, env)?;
                let path = self.absolutize(&declared);
                Ok(BackupPath { declared, path })
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = EffectiveSpec {
            app: app.to_string(),
            environment: env.to_string(),
            unit_name: unit_name(env, app),
            image: app_config.image.clone(),
            tag: tag.unwrap_or(&app_config.tag).to_string(),
            variables: layered.merged(),
            volumes,
            backup_paths,
            network: network_name(env),
            hostname,
            ports: app_config
                .ports
                .iter()
                .filter_map(|p| p.container_port())
                .collect(),
            healthcheck_path: app_config.healthcheck_path.clone(),
        };
        debug!(
            "Resolved {} ({}) -> {} with {} variables",
            app,
            env,
            spec.image_ref(),
            spec.variables.len()
        );
        Ok(spec)
    }

    fn read_layer(
        &self,
        app: &str,
        env: &str,
        layer: LayerKind,
        path: PathBuf,
    ) -> Result<BTreeMap<String, String>> {
        if !path.is_file() {
            return Err(ConfigError::MissingLayer {
                app: app.to_string(),
                env: env.to_string(),
                layer,
                path,
            });
        }
        layers::read_layer_file(&path)
    }

    fn resolve_volume(&self, volume: &str, app: &str, env: &str) -> Result<VolumeMount> {
        let resolved = substitute(volume, app, env)?;
        let mut parts = resolved.splitn(3, ':');
        let (source, target) = match (parts.next(), parts.next()) {
            (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => {
                (source, target)
            }
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Malformed volume '{}'",
                    volume
                )));
            }
        };
        let mode = parts.next().map(str::to_string);

        let source = if is_host_path(source) {
            self.absolutize(source).to_string_lossy().into_owned()
        } else {
            source.to_string()
        };

        Ok(VolumeMount {
            source,
            target: target.to_string(),
            mode,
        })
    }

    fn absolutize(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let relative = path.strip_prefix(".").unwrap_or(path);
        self.project_root.join(relative)
    }
}

/// Host paths are absolute or dot-relative; anything else is a named volume
fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.')
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

/// Substitute `${ENV}` and `${APP}` in a path template
pub fn substitute(template: &str, app: &str, env: &str) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;
    for cap in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = match name.as_str() {
            "ENV" => env,
            "APP" => app,
            other => {
                return Err(ConfigError::InvalidTemplate {
                    template: template.to_string(),
                    placeholder: other.to_string(),
                });
            }
        };
        result.push_str(&template[last..whole.start()]);
        result.push_str(value);
        last = whole.end();
    }
    result.push_str(&template[last..]);

    if result.contains("${") {
        return Err(ConfigError::InvalidTemplate {
            template: template.to_string(),
            placeholder: "${".to_string(),
        });
    }
    Ok(result)
}
