//! In-memory DNS provider for tests.

use super::{DnsProvider, DnsRecord, IpSource, RecordRequest};
use crate::errors::DnsError;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Result<T> = std::result::Result<T, DnsError>;

#[derive(Debug, Default)]
struct State {
    records: Vec<DnsRecord>,
    calls: Vec<String>,
    next_id: u64,
    rate_limited: bool,
}

/// Keeps records in a list and logs every call
#[derive(Debug, Default)]
pub struct MemoryDnsProvider {
    state: Mutex<State>,
}

impl MemoryDnsProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut State, call: String) -> Result<()> {
        state.calls.push(call);
        if state.rate_limited {
            return Err(DnsError::RateLimited {
                retry_after: Some(60),
            });
        }
        Ok(())
    }

    /// Every call in order, as `"<operation> <zone> [<detail>]"`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls that change records
    pub fn writes(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| !c.starts_with("list") && !c.starts_with("find"))
            .cloned()
            .collect()
    }

    /// Snapshot of all records
    pub fn all(&self) -> Vec<DnsRecord> {
        self.state().records.clone()
    }

    /// Seed a record as if created elsewhere
    pub fn insert(&self, zone: &str, name: &str, content: &str, ttl: u32) -> DnsRecord {
        let mut state = self.state();
        state.next_id += 1;
        let record = DnsRecord {
            id: state.next_id,
            zone: zone.to_string(),
            name: name.to_string(),
            record_type: "A".to_string(),
            content: content.to_string(),
            ttl,
        };
        state.records.push(record.clone());
        record
    }

    /// Make every following call fail with a rate limit
    pub fn set_rate_limited(&self, limited: bool) {
        self.state().rate_limited = limited;
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecord>> {
        let mut state = self.state();
        Self::record(&mut state, format!("list {}", zone))?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.zone == zone)
            .cloned()
            .collect())
    }

    async fn find_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>> {
        let mut state = self.state();
        Self::record(&mut state, format!("find {} {}", zone, name))?;
        Ok(state
            .records
            .iter()
            .find(|r| r.zone == zone && r.name == name && r.record_type == record_type)
            .cloned())
    }

    async fn create_record(&self, zone: &str, request: &RecordRequest) -> Result<DnsRecord> {
        let mut state = self.state();
        Self::record(&mut state, format!("create {} {}", zone, request.name))?;
        state.next_id += 1;
        let record = DnsRecord {
            id: state.next_id,
            zone: zone.to_string(),
            name: request.name.clone(),
            record_type: request.record_type.clone(),
            content: request.content.clone(),
            ttl: request.ttl,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(&self, zone: &str, id: u64, content: &str, ttl: u32) -> Result<DnsRecord> {
        let mut state = self.state();
        Self::record(&mut state, format!("update {} {}", zone, id))?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.zone == zone && r.id == id)
            .ok_or_else(|| DnsError::Provider {
                status: Some(404),
                message: format!("record {} not found", id),
            })?;
        record.content = content.to_string();
        record.ttl = ttl;
        Ok(record.clone())
    }

    async fn delete_record(&self, zone: &str, id: u64) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, format!("delete {} {}", zone, id))?;
        let before = state.records.len();
        state.records.retain(|r| !(r.zone == zone && r.id == id));
        if state.records.len() == before {
            return Err(DnsError::Provider {
                status: Some(404),
                message: format!("record {} not found", id),
            });
        }
        Ok(())
    }
}

/// Always answers with the same address
#[derive(Debug, Clone)]
pub struct FixedIpSource(pub String);

#[async_trait]
impl IpSource for FixedIpSource {
    async fn public_ip(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
