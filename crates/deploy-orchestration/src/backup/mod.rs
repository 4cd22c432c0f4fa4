//! Snapshots of an app's persistent paths in object storage
//!
//! Objects are keyed `{app}/{env}/{timestamp}/archive.tar.gz` with a
//! `manifest.json` beside the archive. Nothing about snapshots is kept
//! locally beyond the archive itself; listing always asks the store.

pub mod archive;
mod s3;
mod store;

pub use archive::{ArchiveEntry, BackupManifest, MANIFEST_NAME};
pub use s3::S3ObjectStore;
pub use store::{LocalObjectStore, ObjectInfo, ObjectStore};

use crate::deployment::DeploymentState;
use crate::errors::BackupError;
use crate::runtime::ContainerRuntime;
use crate::Result;
use chrono::{DateTime, Utc};
use hostsolo_config::{ConfigResolver, Credentials, unit_name};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot timestamp format; sorts lexicographically
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Object name of the archive under a snapshot prefix
pub const ARCHIVE_NAME: &str = "archive.tar.gz";

/// Directory for local copies of archives, relative to the project root
const LOCAL_BACKUP_DIR: &str = ".hostsolo/backups";

/// Directory of the `local` storage provider when `backup.path` is unset
const DEFAULT_LOCAL_STORE: &str = ".hostsolo/storage";

/// One stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSnapshot {
    /// Application name
    pub app: String,
    /// Environment name
    pub environment: String,
    /// Snapshot timestamp
    pub timestamp: String,
    /// Key of the archive object
    pub key: String,
    /// Archive size in bytes
    pub size: u64,
    /// Declared paths captured
    pub paths: Vec<String>,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    /// Snapshot that was restored
    pub snapshot: BackupSnapshot,
    /// Paths overwritten on disk
    pub restored: Vec<PathBuf>,
    /// Whether a running unit was stopped first
    pub stopped_unit: bool,
}

fn snapshot_prefix(app: &str, env: &str) -> String {
    format!("{}/{}/", app, env)
}

fn archive_key(app: &str, env: &str, timestamp: &str) -> String {
    format!("{}/{}/{}/{}", app, env, timestamp, ARCHIVE_NAME)
}

fn manifest_key(app: &str, env: &str, timestamp: &str) -> String {
    format!("{}/{}/{}/{}", app, env, timestamp, MANIFEST_NAME)
}

/// Build the object store `backup.provider` names
pub fn store_from_config(
    resolver: &ConfigResolver,
    credentials: &Credentials,
) -> Result<Arc<dyn ObjectStore>> {
    let config = resolver.config();
    let backup = &config.backup;
    match backup.provider.as_str() {
        "local" => {
            let path = backup.path.as_deref().unwrap_or(DEFAULT_LOCAL_STORE);
            Ok(Arc::new(LocalObjectStore::new(
                resolver.project_root().join(path),
            )))
        }
        _ => {
            let aws = credentials.require_aws()?;
            let store = S3ObjectStore::new(
                backup.bucket.clone(),
                backup.endpoint_url.clone(),
                backup.region.clone(),
                aws,
                Duration::from_secs(config.settings.http_timeout),
            )?;
            Ok(Arc::new(store))
        }
    }
}

/// Captures, lists, restores and deletes snapshots
#[derive(Clone)]
pub struct BackupEngine {
    resolver: ConfigResolver,
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ObjectStore>,
    keep_local: bool,
    retention: Option<usize>,
}

impl BackupEngine {
    /// Create an engine; retention and `keep_local` come from the config
    pub fn new(
        resolver: ConfigResolver,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let keep_local = resolver.config().backup.keep_local;
        let retention = resolver.config().backup.retention;
        Self {
            resolver,
            runtime,
            store,
            keep_local,
            retention,
        }
    }

    /// The store snapshots live in
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn local_archive(&self, app: &str, env: &str, timestamp: &str) -> PathBuf {
        self.resolver
            .project_root()
            .join(LOCAL_BACKUP_DIR)
            .join(app)
            .join(env)
            .join(format!("{}.tar.gz", timestamp))
    }

    fn check_declared(&self, app: &str, env: &str) -> Result<()> {
        let config = self.resolver.config();
        config.app(app)?;
        config.environment(env)?;
        Ok(())
    }

    /// Capture the app's backup paths now
    pub async fn backup_now(&self, app: &str, env: &str) -> Result<BackupSnapshot> {
        self.backup_at(app, env, Utc::now()).await
    }

    /// Capture the app's backup paths under the timestamp of `at`
    ///
    /// An existing snapshot with the same timestamp is never overwritten.
    pub async fn backup_at(&self, app: &str, env: &str, at: DateTime<Utc>) -> Result<BackupSnapshot> {
        let spec = self.resolver.resolve(app, env)?;
        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();

        let mut claimed: Vec<(&str, String)> = Vec::new();
        let mut entries = Vec::new();
        for declared in &spec.backup_paths {
            let Some(entry) = ArchiveEntry::new(&declared.declared, declared.path.clone()) else {
                continue;
            };
            if let Some((first, _)) = claimed.iter().find(|(_, name)| *name == entry.name) {
                return Err(BackupError::ConflictingBackupPaths {
                    app: app.to_string(),
                    name: entry.name,
                    first: first.to_string(),
                    second: declared.declared.clone(),
                }
                .into());
            }
            claimed.push((declared.declared.as_str(), entry.name.clone()));

            if !declared.path.exists() {
                warn!(
                    "Backup path {} ({}) does not exist, skipping",
                    declared.declared,
                    declared.path.display()
                );
                continue;
            }
            entries.push(entry);
        }
        if entries.is_empty() {
            return Err(BackupError::NoBackupPaths {
                app: app.to_string(),
                env: env.to_string(),
            }
            .into());
        }

        let key = archive_key(app, env, &timestamp);
        if self.store.head(&key).await?.is_some() {
            return Err(BackupError::Storage {
                operation: "backup".to_string(),
                reason: format!("snapshot {} already exists", key),
            }
            .into());
        }

        let manifest = BackupManifest {
            app: app.to_string(),
            environment: env.to_string(),
            timestamp: timestamp.clone(),
            created_at: at,
            image: spec.image_ref(),
            entries,
        };

        let local = self.local_archive(app, env, &timestamp);
        let size = {
            let local = local.clone();
            let manifest = manifest.clone();
            smol::unblock(move || archive::create(&local, &manifest))
                .await
                .map_err(BackupError::Io)?
        };
        info!(
            "Archived {} path(s) of {} ({}) into {} ({} bytes)",
            manifest.entries.len(),
            app,
            env,
            local.display(),
            size
        );

        self.upload(&key, &local, size, &manifest).await?;

        if self.keep_local {
            debug!("Keeping local archive {}", local.display());
        } else if let Err(e) = std::fs::remove_file(&local) {
            warn!("Could not remove local archive {}: {}", local.display(), e);
        }

        Ok(BackupSnapshot {
            app: app.to_string(),
            environment: env.to_string(),
            paths: manifest.paths(),
            timestamp,
            key,
            size,
        })
    }

    /// Upload and verify; every failure leaves the local archive in place
    async fn upload(&self, key: &str, local: &Path, size: u64, manifest: &BackupManifest) -> Result<()> {
        let failed = |reason: String| BackupError::UploadFailed {
            key: key.to_string(),
            reason,
            local: local.to_path_buf(),
        };

        info!("Uploading {} to {}", key, self.store.describe());
        self.store
            .put_file(key, local)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let manifest_bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|e| failed(format!("manifest: {}", e)))?;
        self.store
            .put_bytes(
                &manifest_key(&manifest.app, &manifest.environment, &manifest.timestamp),
                manifest_bytes,
            )
            .await
            .map_err(|e| failed(e.to_string()))?;

        match self.store.head(key).await {
            Ok(Some(info)) if info.size == size => Ok(()),
            Ok(Some(info)) => Err(failed(format!(
                "remote size {} does not match local size {}",
                info.size, size
            ))
            .into()),
            Ok(None) => Err(failed("object missing after upload".to_string()).into()),
            Err(e) => Err(failed(e.to_string()).into()),
        }
    }

    /// Snapshots of an app in an environment, most recent first
    pub async fn list(&self, app: &str, env: &str) -> Result<Vec<BackupSnapshot>> {
        self.check_declared(app, env)?;
        let prefix = snapshot_prefix(app, env);
        let objects = self.store.list(&prefix).await?;

        let mut archives: BTreeMap<String, u64> = BTreeMap::new();
        for object in &objects {
            let Some(rest) = object.key.strip_prefix(&prefix) else {
                continue;
            };
            if let Some((timestamp, ARCHIVE_NAME)) = rest.split_once('/') {
                archives.insert(timestamp.to_string(), object.size);
            }
        }

        let mut snapshots = Vec::with_capacity(archives.len());
        for (timestamp, size) in archives.into_iter().rev() {
            let paths = match self.store.get_bytes(&manifest_key(app, env, &timestamp)).await {
                Ok(bytes) => serde_json::from_slice::<BackupManifest>(&bytes)
                    .map(|m| m.paths())
                    .unwrap_or_else(|e| {
                        warn!("Unreadable manifest for {}/{}/{}: {}", app, env, timestamp, e);
                        Vec::new()
                    }),
                Err(BackupError::ObjectNotFound(_)) => {
                    warn!("Snapshot {}/{}/{} has no manifest", app, env, timestamp);
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };
            snapshots.push(BackupSnapshot {
                app: app.to_string(),
                environment: env.to_string(),
                key: archive_key(app, env, &timestamp),
                timestamp,
                size,
                paths,
            });
        }
        Ok(snapshots)
    }

    /// Put a snapshot's paths back on disk
    ///
    /// A running unit is stopped first and left stopped; deploy again to
    /// bring it back.
    pub async fn restore(&self, app: &str, env: &str, timestamp: &str) -> Result<RestoreOutcome> {
        let spec = self.resolver.resolve(app, env)?;
        let key = archive_key(app, env, timestamp);
        let Some(object) = self.store.head(&key).await? else {
            return Err(BackupError::SnapshotNotFound {
                app: app.to_string(),
                env: env.to_string(),
                timestamp: timestamp.to_string(),
            }
            .into());
        };

        let unit = unit_name(env, app);
        let record = self.runtime.find(&unit).await?;
        let state = DeploymentState::from_record(record.as_ref());
        if state.is_transitioning() {
            return Err(BackupError::RestoreTargetBusy { unit, state }.into());
        }
        let stopped_unit = state.is_up();
        if stopped_unit {
            info!("Stopping {} before restoring", unit);
            self.runtime.stop(&unit).await?;
        }

        let staging = tempfile::Builder::new()
            .prefix("hostsolo-restore-")
            .tempdir()
            .map_err(BackupError::Io)?;
        let downloaded = staging.path().join(ARCHIVE_NAME);
        self.store.get_file(&key, &downloaded).await?;

        let mut manifest = {
            let downloaded = downloaded.clone();
            smol::unblock(move || archive::read_manifest(&downloaded))
                .await
                .map_err(|e| BackupError::CorruptArchive(format!("{}: {}", key, e)))?
        };
        if manifest.app != app || manifest.environment != env {
            return Err(BackupError::CorruptArchive(format!(
                "{} holds {} ({}), not {} ({})",
                key, manifest.app, manifest.environment, app, env
            ))
            .into());
        }

        // Restore to where the paths resolve today, not where they were.
        for entry in &mut manifest.entries {
            if let Some(current) = spec
                .backup_paths
                .iter()
                .filter_map(|p| ArchiveEntry::new(&p.declared, p.path.clone()))
                .find(|e| e.name == entry.name)
            {
                entry.path = current.path;
            }
        }

        let restored = {
            let manifest = manifest.clone();
            smol::unblock(move || archive::restore(&downloaded, &manifest))
                .await
                .map_err(BackupError::Io)?
        };
        info!(
            "Restored {} path(s) of {} ({}) from {}; {} left stopped",
            restored.len(),
            app,
            env,
            timestamp,
            unit
        );

        Ok(RestoreOutcome {
            snapshot: BackupSnapshot {
                app: app.to_string(),
                environment: env.to_string(),
                timestamp: timestamp.to_string(),
                key: object.key,
                size: object.size,
                paths: manifest.paths(),
            },
            restored,
            stopped_unit,
        })
    }

    /// Delete one snapshot
    pub async fn delete(&self, app: &str, env: &str, timestamp: &str) -> Result<()> {
        self.check_declared(app, env)?;
        let prefix = format!("{}{}/", snapshot_prefix(app, env), timestamp);
        let objects = self.store.list(&prefix).await?;
        if objects.is_empty() {
            return Err(BackupError::SnapshotNotFound {
                app: app.to_string(),
                env: env.to_string(),
                timestamp: timestamp.to_string(),
            }
            .into());
        }
        for object in objects {
            debug!("Deleting {}", object.key);
            self.store.delete(&object.key).await?;
        }
        info!("Deleted backup {}/{}/{}", app, env, timestamp);
        Ok(())
    }

    /// Delete all but the `backup.retention` most recent snapshots
    pub async fn prune(&self, app: &str, env: &str) -> Result<Vec<BackupSnapshot>> {
        let keep = self.retention.ok_or(BackupError::RetentionNotConfigured)?;
        let snapshots = self.list(app, env).await?;
        let expired: Vec<BackupSnapshot> = snapshots.into_iter().skip(keep).collect();
        for snapshot in &expired {
            self.delete(app, env, &snapshot.timestamp).await?;
        }
        info!(
            "Pruned {} snapshot(s) of {} ({}), keeping {}",
            expired.len(),
            app,
            env,
            keep
        );
        Ok(expired)
    }
}
