//! DNSimple v2 REST API

use super::{DnsProvider, DnsRecord, RecordRequest};
use crate::errors::DnsError;
use async_trait::async_trait;
use hostsolo_config::credentials::DnsimpleCredentials;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Result<T> = std::result::Result<T, DnsError>;

/// Production API endpoint
pub const DNSIMPLE_API: &str = "https://api.dnsimple.com/v2";

const PER_PAGE: u32 = 100;

/// DNSimple provider, scoped to one account
#[derive(Clone)]
pub struct DnsimpleProvider {
    inner: Arc<Api>,
}

struct Api {
    http: Client,
    base_url: String,
    credentials: DnsimpleCredentials,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    current_page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: u64,
    zone_id: String,
    name: String,
    content: String,
    ttl: u32,
    #[serde(rename = "type")]
    record_type: String,
}

impl From<ApiRecord> for DnsRecord {
    fn from(r: ApiRecord) -> Self {
        DnsRecord {
            id: r.id,
            zone: r.zone_id,
            name: r.name,
            record_type: r.record_type,
            content: r.content,
            ttl: r.ttl,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

impl DnsimpleProvider {
    /// Provider against the production API
    pub fn new(credentials: DnsimpleCredentials, timeout: Duration) -> Result<Self> {
        Self::with_base_url(DNSIMPLE_API, credentials, timeout)
    }

    /// Provider against another endpoint, e.g. the sandbox
    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: DnsimpleCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hostsolo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DnsError::Provider {
                status: None,
                message: e.to_string(),
            })?;
        Ok(Self {
            inner: Arc::new(Api {
                http,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                credentials,
                timeout,
            }),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Api) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        smol::unblock(move || f(&inner)).await
    }
}

impl Api {
    fn records_url(&self, zone: &str) -> String {
        format!(
            "{}/{}/zones/{}/records",
            self.base_url, self.credentials.account_id, zone
        )
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.credentials.token)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    DnsError::Timeout {
                        operation: operation.to_string(),
                        after: self.timeout,
                    }
                } else {
                    DnsError::Provider {
                        status: None,
                        message: e.to_string(),
                    }
                }
            })?;
        check_status(response)
    }

    fn json<T: DeserializeOwned>(&self, response: Response) -> Result<Envelope<T>> {
        response.json().map_err(|e| DnsError::Provider {
            status: None,
            message: format!("unexpected response: {}", e),
        })
    }

    fn list(&self, zone: &str, filter: &[(&str, &str)]) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let page_param = page.to_string();
            let per_page = PER_PAGE.to_string();
            let mut query = vec![("page", page_param.as_str()), ("per_page", per_page.as_str())];
            query.extend_from_slice(filter);
            debug!("dnsimple list {} page {}", zone, page);

            let request = self.http.get(self.records_url(zone)).query(&query);
            let envelope: Envelope<Vec<ApiRecord>> = self.json(self.send("list", request)?)?;
            records.extend(envelope.data.into_iter().map(DnsRecord::from));
            match envelope.pagination {
                Some(p) if p.current_page < p.total_pages => page = p.current_page + 1,
                _ => break,
            }
        }
        Ok(records)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(DnsError::RateLimited { retry_after });
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ApiMessage>(&body)
        .map(|m| m.message)
        .unwrap_or(body);
    Err(DnsError::Provider {
        status: Some(status.as_u16()),
        message,
    })
}

#[async_trait]
impl DnsProvider for DnsimpleProvider {
    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecord>> {
        let zone = zone.to_string();
        self.run(move |api| api.list(&zone, &[])).await
    }

    async fn find_record(
        &self,
        zone: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<DnsRecord>> {
        let zone = zone.to_string();
        let name = name.to_string();
        let record_type = record_type.to_string();
        self.run(move |api| {
            let found = api.list(&zone, &[("name", name.as_str()), ("type", record_type.as_str())])?;
            Ok(found
                .into_iter()
                .find(|r| r.name == name && r.record_type == record_type))
        })
        .await
    }

    async fn create_record(&self, zone: &str, request: &RecordRequest) -> Result<DnsRecord> {
        let zone = zone.to_string();
        let request = request.clone();
        self.run(move |api| {
            let body = CreateBody {
                name: &request.name,
                record_type: &request.record_type,
                content: &request.content,
                ttl: request.ttl,
            };
            let http = api.http.post(api.records_url(&zone)).json(&body);
            let envelope: Envelope<ApiRecord> = api.json(api.send("create", http)?)?;
            Ok(envelope.data.into())
        })
        .await
    }

    async fn update_record(&self, zone: &str, id: u64, content: &str, ttl: u32) -> Result<DnsRecord> {
        let zone = zone.to_string();
        let content = content.to_string();
        self.run(move |api| {
            let url = format!("{}/{}", api.records_url(&zone), id);
            let http = api.http.patch(url).json(&UpdateBody {
                content: &content,
                ttl,
            });
            let envelope: Envelope<ApiRecord> = api.json(api.send("update", http)?)?;
            Ok(envelope.data.into())
        })
        .await
    }

    async fn delete_record(&self, zone: &str, id: u64) -> Result<()> {
        let zone = zone.to_string();
        self.run(move |api| {
            let url = format!("{}/{}", api.records_url(&zone), id);
            api.send("delete", api.http.delete(url)).map(|_| ())
        })
        .await
    }
}
