//! End-to-end CLI tests for commands that do not need a container engine

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIG: &str = r#"
domain: example.com
email: ops@example.com
backup:
  provider: local
  path: ./storage
environments:
  dev:
    subdomain: dev
  prod:
    subdomain: ""
apps:
  directus:
    image: directus/directus
    tag: "10.8"
    ports: [8055]
    environment:
      DB_CLIENT: postgres
    backup_paths:
      - ./data/${ENV}/directus
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hostsolo.yaml", CONFIG);
    write(dir.path(), "config/directus/shared.env", "DB_CLIENT=sqlite3\n");
    write(dir.path(), "config/directus/dev.env", "KEY=dev-key\n");
    write(dir.path(), "config/directus/prod.env", "KEY=prod-key\n");
    dir
}

fn hostsolo(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hostsolo"))
        .arg("-C")
        .arg(dir)
        .args(args)
        .env_remove("HOSTSOLO_DNSIMPLE_TOKEN")
        .env_remove("HOSTSOLO_DNSIMPLE_ACCOUNT_ID")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run hostsolo")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_config_validate() {
    let dir = project();
    let output = hostsolo(dir.path(), &["config", "validate"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Configuration valid"));
    assert!(out.contains("dev, prod"));
}

#[test]
fn test_config_show_reports_layer_sources() {
    let dir = project();
    let output = hostsolo(dir.path(), &["config", "show", "directus", "--env", "dev"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("hostsolo-dev-directus"));
    assert!(out.contains("directus/directus:10.8"));
    assert!(out.contains("DB_CLIENT=sqlite3  [shared]"), "{}", out);
    assert!(out.contains("KEY=dev-key  [environment]"), "{}", out);
}

#[test]
fn test_config_show_json() {
    let dir = project();
    let output = hostsolo(
        dir.path(),
        &["config", "show", "directus", "-e", "prod", "--json"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let spec: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(spec["hostname"], "example.com");
    assert_eq!(spec["network"], "hostsolo-prod");
    assert_eq!(spec["variables"]["KEY"], "prod-key");
}

#[test]
fn test_missing_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = hostsolo(dir.path(), &["config", "show", "directus"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No hostsolo.yaml found"));
}

#[test]
fn test_destructive_verbs_need_yes() {
    let dir = project();
    write(dir.path(), "data/dev/directus/db.sqlite", "rows");

    let output = hostsolo(dir.path(), &["env", "destroy", "dev", "--remove-data"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("without --yes"));
    assert!(dir.path().join("data/dev/directus/db.sqlite").exists());

    let output = hostsolo(
        dir.path(),
        &["backup", "delete", "directus", "-e", "dev", "-t", "2024-01-01T00-00-00"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("without --yes"));
}

#[test]
fn test_backup_now_and_list_with_local_store() {
    let dir = project();
    write(dir.path(), "data/dev/directus/db.sqlite", "rows");

    let output = hostsolo(dir.path(), &["backup", "now", "directus", "--env", "dev"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Backup created"));

    let output = hostsolo(
        dir.path(),
        &["backup", "list", "directus", "--env", "dev", "--json"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let snapshots: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let snapshots = snapshots.as_array().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0]["paths"][0], "data/dev/directus");
    assert!(dir.path().join("storage/directus/dev").is_dir());
}

#[test]
fn test_dns_without_credentials() {
    let dir = project();
    let output = hostsolo(dir.path(), &["dns", "list"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("HOSTSOLO_DNSIMPLE_TOKEN"));
}
