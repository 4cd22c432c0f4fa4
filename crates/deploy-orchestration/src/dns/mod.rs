//! DNS records for environment hostnames
//!
//! Each environment gets one `A` record in the configured zone. The name is
//! the environment's subdomain, or the apex for the root domain.

mod dnsimple;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod public_ip;

pub use dnsimple::DnsimpleProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FixedIpSource, MemoryDnsProvider};
pub use public_ip::{HttpIpSource, IP_SERVICES};

use crate::errors::DnsError;
use crate::Result;
use async_trait::async_trait;
use hostsolo_config::ConfigResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Record type managed for environment hostnames
pub const RECORD_TYPE: &str = "A";

/// A record as the provider holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned identifier
    pub id: u64,
    /// Zone the record lives in
    pub zone: String,
    /// Name relative to the zone, empty for the apex
    pub name: String,
    /// Record type, e.g. `A`
    pub record_type: String,
    /// Target value
    pub content: String,
    /// Time to live in seconds
    pub ttl: u32,
}

impl DnsRecord {
    /// Fully qualified hostname
    pub fn hostname(&self) -> String {
        if self.name.is_empty() {
            self.zone.clone()
        } else {
            format!("{}.{}", self.name, self.zone)
        }
    }
}

/// Fields of a record to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRequest {
    /// Name relative to the zone
    pub name: String,
    /// Record type
    pub record_type: String,
    /// Target value
    pub content: String,
    /// Time to live in seconds
    pub ttl: u32,
}

/// A DNS provider API scoped to one account
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Every record in a zone
    async fn list_records(&self, zone: &str) -> std::result::Result<Vec<DnsRecord>, DnsError>;

    /// The first record with this name and type
    async fn find_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> std::result::Result<Option<DnsRecord>, DnsError> {
        Ok(self
            .list_records(zone)
            .await?
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type))
    }

    /// Create a record
    async fn create_record(
        &self,
        zone: &str,
        request: &RecordRequest,
    ) -> std::result::Result<DnsRecord, DnsError>;

    /// Change a record's target and TTL
    async fn update_record(
        &self,
        zone: &str,
        id: u64,
        content: &str,
        ttl: u32,
    ) -> std::result::Result<DnsRecord, DnsError>;

    /// Delete a record
    async fn delete_record(&self, zone: &str, id: u64) -> std::result::Result<(), DnsError>;
}

/// Where the host's public address comes from
#[async_trait]
pub trait IpSource: Send + Sync {
    /// The host's public IPv4 address
    async fn public_ip(&self) -> std::result::Result<String, DnsError>;
}

/// What `sync` did to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncAction {
    /// No record existed
    Created,
    /// The record pointed elsewhere or had another TTL
    Updated,
    /// The record already matched
    Unchanged,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Created => write!(f, "created"),
            SyncAction::Updated => write!(f, "updated"),
            SyncAction::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Record as it now stands
    pub record: DnsRecord,
    /// Change applied
    pub action: SyncAction,
}

/// Keeps environment records pointing at the host
#[derive(Clone)]
pub struct DnsReconciler {
    resolver: ConfigResolver,
    provider: Arc<dyn DnsProvider>,
    ip_source: Arc<dyn IpSource>,
}

impl DnsReconciler {
    /// Create a reconciler over a provider and an address source
    pub fn new(
        resolver: ConfigResolver,
        provider: Arc<dyn DnsProvider>,
        ip_source: Arc<dyn IpSource>,
    ) -> Self {
        Self {
            resolver,
            provider,
            ip_source,
        }
    }

    fn zone(&self) -> &str {
        &self.resolver.config().domain
    }

    fn record_name(&self, env: &str) -> Result<String> {
        Ok(self.resolver.config().environment(env)?.subdomain.clone())
    }

    async fn target(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(target) = explicit {
            return Ok(target.to_string());
        }
        if let Some(target) = &self.resolver.config().dns.target {
            return Ok(target.clone());
        }
        let ip = self.ip_source.public_ip().await?;
        debug!("Detected public IP {}", ip);
        Ok(ip)
    }

    /// Point the app's environment hostname at this host
    pub async fn sync(&self, app: &str, env: &str) -> Result<SyncOutcome> {
        self.sync_with_target(app, env, None).await
    }

    /// Point the app's environment hostname at `target`, or the configured
    /// or detected address when `None`
    pub async fn sync_with_target(
        &self,
        app: &str,
        env: &str,
        target: Option<&str>,
    ) -> Result<SyncOutcome> {
        self.resolver.config().app(app)?;
        let name = self.record_name(env)?;
        let zone = self.zone().to_string();
        let ttl = self.resolver.config().dns.ttl;
        let content = self.target(target).await?;

        let existing = self.provider.find_record(&zone, &name, RECORD_TYPE).await?;
        let outcome = match existing {
            Some(record) if record.content == content && record.ttl == ttl => SyncOutcome {
                record,
                action: SyncAction::Unchanged,
            },
            Some(record) => {
                info!(
                    "Updating {} {} from {} to {}",
                    RECORD_TYPE,
                    record.hostname(),
                    record.content,
                    content
                );
                let record = self
                    .provider
                    .update_record(&zone, record.id, &content, ttl)
                    .await?;
                SyncOutcome {
                    record,
                    action: SyncAction::Updated,
                }
            }
            None => {
                let request = RecordRequest {
                    name,
                    record_type: RECORD_TYPE.to_string(),
                    content,
                    ttl,
                };
                let record = self.provider.create_record(&zone, &request).await?;
                info!("Created {} {} -> {}", RECORD_TYPE, record.hostname(), record.content);
                SyncOutcome {
                    record,
                    action: SyncAction::Created,
                }
            }
        };
        Ok(outcome)
    }

    /// Remove an environment's record
    pub async fn delete(&self, env: &str) -> Result<DnsRecord> {
        let name = self.record_name(env)?;
        let zone = self.zone().to_string();
        let Some(record) = self.provider.find_record(&zone, &name, RECORD_TYPE).await? else {
            return Err(DnsError::NotFound {
                name: self.resolver.hostname(env)?,
                record_type: RECORD_TYPE.to_string(),
            }
            .into());
        };
        self.provider.delete_record(&zone, record.id).await?;
        info!("Deleted {} {}", RECORD_TYPE, record.hostname());
        Ok(record)
    }

    /// Every record in the zone
    pub async fn records(&self) -> Result<Vec<DnsRecord>> {
        Ok(self.provider.list_records(self.zone()).await?)
    }
}
