//! Shared project fixture for the orchestration tests

#![allow(dead_code)]

use deploy_orchestration::runtime::{ContainerRuntime, MemoryRuntime};
use hostsolo_config::ConfigResolver;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const CONFIG: &str = r#"
domain: example.com
email: ops@example.com
data_dir: ./data
dns:
  ttl: 600
backup:
  provider: local
  path: ./storage
  retention: 2
environments:
  dev:
    subdomain: dev
  staging:
    subdomain: staging
  prod:
    subdomain: ""
apps:
  directus:
    image: directus/directus
    tag: "10.8"
    ports: [8055]
    volumes:
      - ./data/${ENV}/directus/uploads:/directus/uploads
    environment:
      DB_CLIENT: postgres
    backup_paths:
      - ./data/${ENV}/directus
      - ./data/${ENV}/missing
  worker:
    image: busybox
    environment:
      MODE: batch
"#;

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A project with layer files for every app in every environment
pub fn project() -> (TempDir, ConfigResolver) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hostsolo.yaml", CONFIG);
    for app in ["directus", "worker"] {
        write(dir.path(), &format!("config/{}/shared.env", app), "DB_CLIENT=sqlite3\n");
        for env in ["dev", "staging", "prod"] {
            write(
                dir.path(),
                &format!("config/{}/{}.env", app, env),
                &format!("KEY={}-key\n", env),
            );
        }
    }
    let resolver = ConfigResolver::discover(dir.path()).unwrap();
    (dir, resolver)
}

pub fn runtime() -> (Arc<MemoryRuntime>, Arc<dyn ContainerRuntime>) {
    let memory = Arc::new(MemoryRuntime::new());
    let runtime: Arc<dyn ContainerRuntime> = memory.clone();
    (memory, runtime)
}
