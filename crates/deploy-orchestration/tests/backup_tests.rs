//! Backup lifecycle against a local object store

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deploy_orchestration::backup::{LocalObjectStore, ObjectInfo, ObjectStore};
use deploy_orchestration::runtime::{ContainerRuntime, UnitStatus};
use deploy_orchestration::{
    BackupEngine, BackupError, DeploymentController, DeploymentState, Error,
};
use std::path::Path;
use std::sync::Arc;

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::seconds(seconds)
}

/// Accepts manifests but rejects archive uploads
struct RejectingStore(LocalObjectStore);

#[async_trait]
impl ObjectStore for RejectingStore {
    fn describe(&self) -> String {
        "rejecting".to_string()
    }
    async fn put_file(&self, key: &str, _path: &Path) -> Result<(), BackupError> {
        Err(BackupError::Storage {
            operation: "put".to_string(),
            reason: format!("HTTP 403 for {}", key),
        })
    }
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), BackupError> {
        self.0.put_bytes(key, bytes).await
    }
    async fn get_file(&self, key: &str, dest: &Path) -> Result<(), BackupError> {
        self.0.get_file(key, dest).await
    }
    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, BackupError> {
        self.0.get_bytes(key).await
    }
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, BackupError> {
        self.0.head(key).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, BackupError> {
        self.0.list(prefix).await
    }
    async fn delete(&self, key: &str) -> Result<(), BackupError> {
        self.0.delete(key).await
    }
}

fn seed_data(root: &Path) {
    common::write(root, "data/dev/directus/db.sqlite", "original rows");
    common::write(root, "data/dev/directus/uploads/logo.png", "\u{1}\u{2}png");
}

#[smol_potat::test]
async fn test_backup_and_restore_round_trip() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store.clone());
    seed_data(dir.path());

    let snapshot = engine.backup_at("directus", "dev", at(0)).await.unwrap();
    assert_eq!(snapshot.timestamp, "2024-05-01T10-00-00");
    assert_eq!(
        snapshot.key,
        "directus/dev/2024-05-01T10-00-00/archive.tar.gz"
    );
    // the missing declared path is skipped
    assert_eq!(snapshot.paths, vec!["data/dev/directus".to_string()]);
    assert!(
        store
            .head("directus/dev/2024-05-01T10-00-00/manifest.json")
            .await
            .unwrap()
            .is_some()
    );
    // keep_local is off, so the verified upload drops the local copy
    assert!(
        !dir.path()
            .join(".hostsolo/backups/directus/dev/2024-05-01T10-00-00.tar.gz")
            .exists()
    );

    common::write(dir.path(), "data/dev/directus/db.sqlite", "corrupted");
    common::write(dir.path(), "data/dev/directus/stray.tmp", "junk");

    let outcome = engine
        .restore("directus", "dev", &snapshot.timestamp)
        .await
        .unwrap();
    assert_eq!(outcome.restored.len(), 1);
    assert!(!outcome.stopped_unit);
    let data = dir.path().join("data/dev/directus");
    assert_eq!(
        std::fs::read_to_string(data.join("db.sqlite")).unwrap(),
        "original rows"
    );
    assert_eq!(
        std::fs::read(data.join("uploads/logo.png")).unwrap(),
        b"\x01\x02png"
    );
    assert!(!data.join("stray.tmp").exists());
}

#[smol_potat::test]
async fn test_list_is_most_recent_first() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    for offset in [0, 3600, 60] {
        engine.backup_at("directus", "dev", at(offset)).await.unwrap();
    }

    let timestamps: Vec<String> = engine
        .list("directus", "dev")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(
        timestamps,
        vec![
            "2024-05-01T11-00-00",
            "2024-05-01T10-01-00",
            "2024-05-01T10-00-00"
        ]
    );
    assert!(engine.list("directus", "prod").await.unwrap().is_empty());
}

#[smol_potat::test]
async fn test_same_timestamp_is_not_overwritten() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    engine.backup_at("directus", "dev", at(0)).await.unwrap();
    assert!(matches!(
        engine.backup_at("directus", "dev", at(0)).await,
        Err(Error::Backup(BackupError::Storage { .. }))
    ));
    assert_eq!(engine.list("directus", "dev").await.unwrap().len(), 1);
}

#[smol_potat::test]
async fn test_failed_upload_keeps_local_archive() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(RejectingStore(LocalObjectStore::new(
        dir.path().join("storage"),
    )));
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    let err = engine
        .backup_at("directus", "dev", at(0))
        .await
        .unwrap_err();
    match err {
        Error::Backup(BackupError::UploadFailed { key, local, .. }) => {
            assert_eq!(key, "directus/dev/2024-05-01T10-00-00/archive.tar.gz");
            assert!(local.exists());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[smol_potat::test]
async fn test_nothing_to_back_up() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);

    assert!(matches!(
        engine.backup_now("directus", "dev").await,
        Err(Error::Backup(BackupError::NoBackupPaths { .. }))
    ));
}

#[smol_potat::test]
async fn test_restore_stops_running_unit_and_leaves_it_stopped() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let controller = DeploymentController::new(resolver.clone(), runtime.clone());
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    let snapshot = engine.backup_at("directus", "dev", at(0)).await.unwrap();
    controller.deploy("directus", "dev", None).await.unwrap();

    let outcome = engine
        .restore("directus", "dev", &snapshot.timestamp)
        .await
        .unwrap();
    assert!(outcome.stopped_unit);
    assert_eq!(
        controller.state("directus", "dev").await.unwrap(),
        DeploymentState::Stopped
    );
    assert!(memory.calls().contains(&"stop hostsolo-dev-directus".to_string()));
    assert!(!memory.calls().iter().any(|c| c.starts_with("restart")));
}

#[smol_potat::test]
async fn test_restore_refuses_unit_being_removed() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let controller = DeploymentController::new(resolver.clone(), runtime.clone());
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    let snapshot = engine.backup_at("directus", "dev", at(0)).await.unwrap();
    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Removing);

    assert!(matches!(
        engine.restore("directus", "dev", &snapshot.timestamp).await,
        Err(Error::Backup(BackupError::RestoreTargetBusy { .. }))
    ));
    assert_eq!(
        memory.status("hostsolo-dev-directus").await.unwrap().status,
        UnitStatus::Removing
    );
}

#[smol_potat::test]
async fn test_restore_stops_crash_looping_unit() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let controller = DeploymentController::new(resolver.clone(), runtime.clone());
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    let snapshot = engine.backup_at("directus", "dev", at(0)).await.unwrap();
    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Restarting);

    let outcome = engine
        .restore("directus", "dev", &snapshot.timestamp)
        .await
        .unwrap();
    assert!(outcome.stopped_unit);
    assert_eq!(
        controller.state("directus", "dev").await.unwrap(),
        DeploymentState::Stopped
    );
}

#[smol_potat::test]
async fn test_missing_snapshot() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);

    assert!(matches!(
        engine.restore("directus", "dev", "2020-01-01T00-00-00").await,
        Err(Error::Backup(BackupError::SnapshotNotFound { .. }))
    ));
    assert!(matches!(
        engine.delete("directus", "dev", "2020-01-01T00-00-00").await,
        Err(Error::Backup(BackupError::SnapshotNotFound { .. }))
    ));
    assert!(memory.mutating_calls().is_empty());
}

#[smol_potat::test]
async fn test_delete_and_prune() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    for offset in 0..4 {
        engine
            .backup_at("directus", "dev", at(offset * 60))
            .await
            .unwrap();
    }
    engine
        .delete("directus", "dev", "2024-05-01T10-03-00")
        .await
        .unwrap();
    assert_eq!(engine.list("directus", "dev").await.unwrap().len(), 3);

    // retention is 2
    let pruned = engine.prune("directus", "dev").await.unwrap();
    let pruned: Vec<_> = pruned.iter().map(|s| s.timestamp.as_str()).collect();
    assert_eq!(pruned, vec!["2024-05-01T10-00-00"]);

    let kept: Vec<String> = engine
        .list("directus", "dev")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(kept, vec!["2024-05-01T10-02-00", "2024-05-01T10-01-00"]);
}

#[smol_potat::test]
async fn test_colliding_backup_paths_are_rejected() {
    let (dir, _) = common::project();
    let config = common::CONFIG.replace(
        "      - ./data/${ENV}/missing",
        "      - ../data/${ENV}/directus",
    );
    common::write(dir.path(), "hostsolo.yaml", &config);
    let resolver = hostsolo_config::ConfigResolver::discover(dir.path()).unwrap();
    let (_memory, runtime) = common::runtime();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("storage")));
    let engine = BackupEngine::new(resolver, runtime, store);
    seed_data(dir.path());

    match engine.backup_at("directus", "dev", at(0)).await.unwrap_err() {
        Error::Backup(BackupError::ConflictingBackupPaths {
            name,
            first,
            second,
            ..
        }) => {
            assert_eq!(name, "data/dev/directus");
            assert_eq!(first, "./data/dev/directus");
            assert_eq!(second, "../data/dev/directus");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.list("directus", "dev").await.unwrap().is_empty());
}
