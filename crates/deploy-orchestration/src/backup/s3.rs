//! S3-compatible object storage
//!
//! Path-style requests signed with AWS Signature Version 4, so the same
//! client works against AWS, MinIO, Backblaze B2 and DigitalOcean Spaces.
//! Requests use the blocking reqwest client on smol's blocking pool.

use super::store::{ObjectInfo, ObjectStore};
use crate::errors::BackupError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hostsolo_config::credentials::AwsCredentials;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Result<T> = std::result::Result<T, BackupError>;
type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";

/// Object store speaking the S3 REST API
#[derive(Clone)]
pub struct S3ObjectStore {
    inner: Arc<S3Client>,
}

struct S3Client {
    http: Client,
    endpoint: String,
    bucket: String,
    region: String,
    credentials: AwsCredentials,
    timeout: Duration,
}

impl S3ObjectStore {
    /// Create a store; `endpoint` defaults to AWS for the region
    pub fn new(
        bucket: impl Into<String>,
        endpoint: Option<String>,
        region: Option<String>,
        credentials: AwsCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        let region = region.unwrap_or_else(|| credentials.region.clone());
        let endpoint = endpoint
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region))
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackupError::Storage {
                operation: "client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            inner: Arc::new(S3Client {
                http,
                endpoint,
                bucket: bucket.into(),
                region,
                credentials,
                timeout,
            }),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S3Client) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        smol::unblock(move || f(&inner)).await
    }
}

/// Percent-encode per SigV4 rules; `/` is kept in paths
fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| BackupError::Storage {
        operation: "sign".to_string(),
        reason: e.to_string(),
    })?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Objects and continuation token from one ListObjectsV2 page
fn parse_list_page(xml: &str) -> Result<(Vec<ObjectInfo>, Option<String>)> {
    let pattern = |re: &str| {
        Regex::new(re).map_err(|e| BackupError::Storage {
            operation: "list".to_string(),
            reason: e.to_string(),
        })
    };
    let contents = pattern(r"(?s)<Contents>(.*?)</Contents>")?;
    let key = pattern(r"<Key>(.*?)</Key>")?;
    let size = pattern(r"<Size>(\d+)</Size>")?;
    let truncated = pattern(r"<IsTruncated>\s*true\s*</IsTruncated>")?;
    let token = pattern(r"<NextContinuationToken>(.*?)</NextContinuationToken>")?;

    let mut objects = Vec::new();
    for block in contents.captures_iter(xml) {
        let body = &block[1];
        let Some(k) = key.captures(body) else { continue };
        let bytes = size
            .captures(body)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        objects.push(ObjectInfo {
            key: xml_unescape(&k[1]),
            size: bytes,
        });
    }

    let next = if truncated.is_match(xml) {
        token.captures(xml).map(|c| xml_unescape(&c[1]))
    } else {
        None
    };
    Ok((objects, next))
}

impl S3Client {
    fn storage_error(&self, operation: &str, e: reqwest::Error) -> BackupError {
        if e.is_timeout() {
            BackupError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }
        } else {
            BackupError::Storage {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn host(&self) -> &str {
        self.endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint)
            .split('/')
            .next()
            .unwrap_or_default()
    }

    fn canonical_path(&self, key: &str) -> String {
        if key.is_empty() {
            format!("/{}", uri_encode(&self.bucket, false))
        } else {
            format!(
                "/{}/{}",
                uri_encode(&self.bucket, false),
                uri_encode(key, true)
            )
        }
    }

    /// SigV4 `Authorization` plus the headers it covers
    fn sign(
        &self,
        method: &Method,
        path: &str,
        query: &[(String, String)],
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut sorted: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
            .collect();
        sorted.sort();
        let canonical_query = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let host = self.host();
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            path,
            canonical_query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.credentials.secret_access_key).as_bytes(),
            &date,
        )?;
        let k_region = hmac_sha256(&k_date, &self.region)?;
        let k_service = hmac_sha256(&k_region, SERVICE)?;
        let k_signing = hmac_sha256(&k_service, "aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign)?);

        Ok(vec![
            (
                "authorization".to_string(),
                format!(
                    "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                    self.credentials.access_key_id, scope, signed_headers, signature
                ),
            ),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date),
        ])
    }

    fn send(
        &self,
        operation: &str,
        method: Method,
        key: &str,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Response> {
        let path = self.canonical_path(key);
        let payload_hash = hex::encode(Sha256::digest(&body));
        let headers = self.sign(&method, &path, query, &payload_hash, Utc::now())?;

        let mut url = format!("{}{}", self.endpoint, path);
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{}?{}", url, qs);
        }
        debug!("s3 {} {}", method, url);

        let mut request = self.http.request(method, &url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        request
            .body(body)
            .send()
            .map_err(|e| self.storage_error(operation, e))
    }

    fn expect_success(&self, operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(BackupError::Storage {
            operation: operation.to_string(),
            reason: format!("HTTP {}: {}", status, body.chars().take(300).collect::<String>()),
        })
    }

    fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let response = self.send("put", Method::PUT, key, &[], body)?;
        self.expect_success("put", response).map(|_| ())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.send("get", Method::GET, key, &[], Vec::new())?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackupError::ObjectNotFound(key.to_string()));
        }
        let response = self.expect_success("get", response)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| self.storage_error("get", e))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let response = self.send("head", Method::HEAD, key, &[], Vec::new())?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.expect_success("head", response)?;
        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Some(ObjectInfo {
            key: key.to_string(),
            size,
        }))
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(t) = &token {
                query.push(("continuation-token".to_string(), t.clone()));
            }
            let response = self.send("list", Method::GET, "", &query, Vec::new())?;
            let body = self
                .expect_success("list", response)?
                .text()
                .map_err(|e| self.storage_error("list", e))?;
            let (page, next) = parse_list_page(&body)?;
            objects.extend(page);
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let response = self.send("delete", Method::DELETE, key, &[], Vec::new())?;
        self.expect_success("delete", response).map(|_| ())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn describe(&self) -> String {
        format!("s3://{} ({})", self.inner.bucket, self.inner.endpoint)
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let key = key.to_string();
        let path: PathBuf = path.to_path_buf();
        self.run(move |s3| {
            let body = std::fs::read(&path)?;
            s3.put(&key, body)
        })
        .await
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.run(move |s3| s3.put(&key, bytes)).await
    }

    async fn get_file(&self, key: &str, dest: &Path) -> Result<()> {
        let key = key.to_string();
        let dest = dest.to_path_buf();
        self.run(move |s3| {
            let bytes = s3.get(&key)?;
            std::fs::write(&dest, bytes)?;
            Ok(())
        })
        .await
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let key = key.to_string();
        self.run(move |s3| s3.get(&key)).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let key = key.to_string();
        self.run(move |s3| s3.head(&key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let prefix = prefix.to_string();
        self.run(move |s3| s3.list(&prefix)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |s3| s3.delete(&key)).await
    }
}
