//! Routing intent for the reverse proxy.
//!
//! The proxy discovers routes from unit labels, so publishing a route means
//! producing labels that ride on the unit's create call. Nothing here talks
//! to the proxy.

use crate::runtime::{MANAGED_LABEL, UnitSpec};
use hostsolo_config::{Config, EffectiveSpec, PROXY_NETWORK};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the reverse-proxy unit
pub const PROXY_UNIT: &str = "hostsolo-traefik";
/// Reverse-proxy image
pub const PROXY_IMAGE: &str = "traefik:v3.1";
/// Certificate resolver used for TLS routes
pub const CERT_RESOLVER: &str = "letsencrypt";

/// What the proxy should do for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingIntent {
    /// Router and service name
    pub router: String,
    /// Public hostname
    pub hostname: String,
    /// Backend port; `None` disables routing
    pub port: Option<u16>,
    /// Terminate TLS with an issued certificate
    pub tls: bool,
    /// Path the proxy polls for backend health
    pub healthcheck_path: Option<String>,
}

impl RoutingIntent {
    /// Whether the unit is routed at all
    pub fn enabled(&self) -> bool {
        self.port.is_some()
    }

    /// Labels the proxy reads
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        let Some(port) = self.port else {
            labels.insert("traefik.enable".to_string(), "false".to_string());
            return labels;
        };

        let router = format!("traefik.http.routers.{}", self.router);
        let service = format!("traefik.http.services.{}", self.router);

        labels.insert("traefik.enable".to_string(), "true".to_string());
        labels.insert(
            "traefik.docker.network".to_string(),
            PROXY_NETWORK.to_string(),
        );
        labels.insert(
            format!("{}.rule", router),
            format!("Host(`{}`)", self.hostname),
        );
        if self.tls {
            labels.insert(format!("{}.entrypoints", router), "websecure".to_string());
            labels.insert(format!("{}.tls", router), "true".to_string());
            labels.insert(
                format!("{}.tls.certresolver", router),
                CERT_RESOLVER.to_string(),
            );
        } else {
            labels.insert(format!("{}.entrypoints", router), "web".to_string());
        }
        labels.insert(format!("{}.service", router), self.router.clone());
        labels.insert(
            format!("{}.loadbalancer.server.port", service),
            port.to_string(),
        );
        if let Some(path) = &self.healthcheck_path {
            labels.insert(format!("{}.loadbalancer.healthcheck.path", service), path.clone());
        }
        labels
    }
}

/// Turns effective specs into routing intent
#[derive(Debug, Clone)]
pub struct ProxyController {
    local: bool,
    email: String,
}

impl ProxyController {
    /// `local` selects plain HTTP routing without certificates
    pub fn new(local: bool, email: impl Into<String>) -> Self {
        Self {
            local,
            email: email.into(),
        }
    }

    /// Controller for a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.settings.local, config.email.clone())
    }

    /// Whether routes are served without TLS
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Routing intent for a spec
    pub fn publish(&self, spec: &EffectiveSpec) -> RoutingIntent {
        RoutingIntent {
            router: spec.unit_name.clone(),
            hostname: spec.hostname.clone(),
            port: spec.primary_port(),
            tls: !self.local,
            healthcheck_path: spec.healthcheck_path.clone(),
        }
    }

    /// Unit spec of the reverse proxy itself
    ///
    /// Certificates are kept under `state_dir/letsencrypt` so they survive
    /// proxy replacement.
    pub fn proxy_unit(&self, state_dir: &Path) -> UnitSpec {
        let mut args = vec![
            "--providers.docker=true".to_string(),
            "--providers.docker.exposedbydefault=false".to_string(),
            format!("--providers.docker.network={}", PROXY_NETWORK),
            "--entrypoints.web.address=:80".to_string(),
        ];
        let mut ports = vec!["80:80".to_string()];
        let mut volumes = vec!["/var/run/docker.sock:/var/run/docker.sock:ro".to_string()];

        if !self.local {
            ports.push("443:443".to_string());
            args.extend([
                "--entrypoints.websecure.address=:443".to_string(),
                "--entrypoints.web.http.redirections.entrypoint.to=websecure".to_string(),
                "--entrypoints.web.http.redirections.entrypoint.scheme=https".to_string(),
                format!(
                    "--certificatesresolvers.{}.acme.email={}",
                    CERT_RESOLVER, self.email
                ),
                format!(
                    "--certificatesresolvers.{}.acme.storage=/letsencrypt/acme.json",
                    CERT_RESOLVER
                ),
                format!(
                    "--certificatesresolvers.{}.acme.tlschallenge=true",
                    CERT_RESOLVER
                ),
            ]);
            volumes.push(format!(
                "{}:/letsencrypt",
                state_dir.join("letsencrypt").display()
            ));
        }

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        UnitSpec {
            name: PROXY_UNIT.to_string(),
            image: PROXY_IMAGE.to_string(),
            networks: vec![PROXY_NETWORK.to_string()],
            env: BTreeMap::new(),
            volumes,
            ports,
            labels,
            args,
            restart_policy: Some("unless-stopped".to_string()),
        }
    }
}
