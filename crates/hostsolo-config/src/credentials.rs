//! Provider credentials
//!
//! Secrets never live in hostsolo.yaml. They come from the process
//! environment, falling back to a `.env` file in the project root.

use crate::layers::parse_env_str;
use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// DNSimple API token
pub const DNSIMPLE_TOKEN: &str = "HOSTSOLO_DNSIMPLE_TOKEN";
/// DNSimple account identifier
pub const DNSIMPLE_ACCOUNT_ID: &str = "HOSTSOLO_DNSIMPLE_ACCOUNT_ID";
/// S3 access key
pub const AWS_ACCESS_KEY_ID: &str = "HOSTSOLO_AWS_ACCESS_KEY_ID";
/// S3 secret key
pub const AWS_SECRET_ACCESS_KEY: &str = "HOSTSOLO_AWS_SECRET_ACCESS_KEY";
/// S3 region
pub const AWS_REGION: &str = "HOSTSOLO_AWS_REGION";

const DEFAULT_REGION: &str = "us-east-1";

/// DNSimple API credentials
#[derive(Clone, PartialEq, Eq)]
pub struct DnsimpleCredentials {
    /// Bearer token
    pub token: String,
    /// Account the zone belongs to
    pub account_id: String,
}

/// S3 credentials
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Signing region
    pub region: String,
}

// Keep secrets out of logs and panics.
impl fmt::Debug for DnsimpleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsimpleCredentials")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Credential lookup over the process environment and `.env`
#[derive(Clone, Default)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Load credentials; process environment wins over `.env`
    pub fn load(project_root: &Path) -> Result<Self> {
        let dotenv = project_root.join(".env");
        let file_values = if dotenv.is_file() {
            let content = std::fs::read_to_string(&dotenv)?;
            parse_env_str(&dotenv, &content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self::from_sources(file_values, std::env::vars()))
    }

    /// Build from explicit sources, the second overriding the first
    pub fn from_sources(
        file_values: BTreeMap<String, String>,
        env_values: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut values = file_values;
        values.extend(
            env_values
                .into_iter()
                .filter(|(k, _)| k.starts_with("HOSTSOLO_")),
        );
        values.retain(|_, v| !v.is_empty());
        Self { values }
    }

    /// Look up one value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingCredential(key.to_string()))
    }

    /// DNSimple token and account, or the first missing variable
    pub fn require_dnsimple(&self) -> Result<DnsimpleCredentials> {
        Ok(DnsimpleCredentials {
            token: self.require(DNSIMPLE_TOKEN)?,
            account_id: self.require(DNSIMPLE_ACCOUNT_ID)?,
        })
    }

    /// S3 keys and region, or the first missing variable
    pub fn require_aws(&self) -> Result<AwsCredentials> {
        Ok(AwsCredentials {
            access_key_id: self.require(AWS_ACCESS_KEY_ID)?,
            secret_access_key: self.require(AWS_SECRET_ACCESS_KEY)?,
            region: self
                .get(AWS_REGION)
                .unwrap_or(DEFAULT_REGION)
                .to_string(),
        })
    }
}
