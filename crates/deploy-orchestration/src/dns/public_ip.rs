//! Public address detection over plain-text echo services

use super::IpSource;
use crate::errors::DnsError;
use async_trait::async_trait;
use reqwest::blocking::Client;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// Services tried in order; each answers with the caller's address
pub const IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Asks the echo services in turn until one answers with an IPv4 address
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    services: Vec<String>,
    timeout: Duration,
}

impl HttpIpSource {
    /// Source over [`IP_SERVICES`]
    pub fn new(timeout: Duration) -> Self {
        Self::with_services(IP_SERVICES.iter().map(|s| s.to_string()).collect(), timeout)
    }

    /// Source over other services
    pub fn with_services(services: Vec<String>, timeout: Duration) -> Self {
        Self { services, timeout }
    }
}

fn parse_address(body: &str) -> Option<String> {
    body.trim().parse::<Ipv4Addr>().ok().map(|ip| ip.to_string())
}

fn query(services: &[String], timeout: Duration) -> Result<String, DnsError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DnsError::PublicIpUnresolved(e.to_string()))?;

    let mut failures = Vec::new();
    for service in services {
        debug!("Asking {} for the public IP", service);
        let answer = client
            .get(service)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text());
        match answer {
            Ok(body) => match parse_address(&body) {
                Some(ip) => return Ok(ip),
                None => failures.push(format!("{}: not an IPv4 address", service)),
            },
            Err(e) => {
                warn!("{} did not answer: {}", service, e);
                failures.push(format!("{}: {}", service, e));
            }
        }
    }
    Err(DnsError::PublicIpUnresolved(failures.join("; ")))
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn public_ip(&self) -> Result<String, DnsError> {
        let services = self.services.clone();
        let timeout = self.timeout;
        smol::unblock(move || query(&services, timeout)).await
    }
}
