//! Integration tests for hostsolo-config

use hostsolo_config::{ConfigError, ConfigResolver, LayerKind, parser};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
domain: example.com
email: ops@example.com
data_dir: ./data
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
    volumes:
      - ./data/${ENV}/directus/uploads:/directus/uploads
      - /srv/shared/${APP}:/shared:ro
      - pgdata:/var/lib/postgresql/data
    environment:
      DB_CLIENT: postgres
      LOG_LEVEL: info
      PUBLIC_URL: http://localhost
    backup_paths:
      - ./data/${ENV}/directus
    healthcheck_path: /server/health
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project(shared: &str, dev: &str) -> (TempDir, ConfigResolver) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hostsolo.yaml", CONFIG);
    write(dir.path(), "config/directus/shared.env", shared);
    write(dir.path(), "config/directus/dev.env", dev);
    let resolver = ConfigResolver::discover(dir.path()).unwrap();
    (dir, resolver)
}

#[test]
fn test_directus_dev_scenario() {
    let (_dir, resolver) = project("DB_CLIENT=sqlite3\n", "KEY=dev-key\n");

    let spec = resolver.resolve("directus", "dev").unwrap();
    assert_eq!(spec.variables["DB_CLIENT"], "sqlite3");
    assert_eq!(spec.variables["KEY"], "dev-key");
}

#[test]
fn test_precedence_law() {
    let (_dir, resolver) = project(
        "LOG_LEVEL=warn\nPUBLIC_URL=https://shared.example.com\n",
        "PUBLIC_URL=https://dev.example.com\n",
    );

    let spec = resolver.resolve("directus", "dev").unwrap();
    // static only
    assert_eq!(spec.variables["DB_CLIENT"], "postgres");
    // static + shared
    assert_eq!(spec.variables["LOG_LEVEL"], "warn");
    // static + shared + environment
    assert_eq!(spec.variables["PUBLIC_URL"], "https://dev.example.com");

    let layers = resolver.load_layers("directus", "dev").unwrap();
    assert_eq!(layers.source_of("PUBLIC_URL"), Some(LayerKind::Environment));
    assert_eq!(layers.source_of("LOG_LEVEL"), Some(LayerKind::Shared));
    assert_eq!(layers.source_of("DB_CLIENT"), Some(LayerKind::Static));
    assert!(!spec.variables.contains_key("UNDEFINED"));
}

#[test]
fn test_resolve_is_deterministic() {
    let (_dir, resolver) = project("B=2\nA=1\n", "C=3\n");

    let first = resolver.resolve("directus", "dev").unwrap();
    for _ in 0..5 {
        assert_eq!(resolver.resolve("directus", "dev").unwrap(), first);
    }

    let other = ConfigResolver::new(
        Arc::clone(resolver.config()),
        resolver.project_root().to_path_buf(),
    );
    assert_eq!(other.resolve("directus", "dev").unwrap(), first);
}

#[test]
fn test_layer_edits_are_seen_on_next_resolve() {
    let (dir, resolver) = project("", "KEY=one\n");
    assert_eq!(resolver.resolve("directus", "dev").unwrap().variables["KEY"], "one");

    write(dir.path(), "config/directus/dev.env", "KEY=two\n");
    assert_eq!(resolver.resolve("directus", "dev").unwrap().variables["KEY"], "two");
}

#[test]
fn test_paths_and_names() {
    let (dir, resolver) = project("", "");
    let spec = resolver.resolve("directus", "dev").unwrap();

    assert_eq!(spec.unit_name, "hostsolo-dev-directus");
    assert_eq!(spec.network, "hostsolo-dev");
    assert_eq!(spec.hostname, "dev.example.com");
    assert_eq!(spec.image_ref(), "directus/directus:10.8");
    assert_eq!(spec.primary_port(), Some(8055));
    assert_eq!(spec.healthcheck_path.as_deref(), Some("/server/health"));

    let uploads = dir.path().join("data/dev/directus/uploads");
    assert_eq!(spec.volumes[0].source, uploads.to_string_lossy());
    assert_eq!(spec.volumes[0].target, "/directus/uploads");
    assert_eq!(spec.volumes[1].source, "/srv/shared/directus");
    assert_eq!(spec.volumes[1].mode.as_deref(), Some("ro"));
    assert_eq!(spec.volumes[2].source, "pgdata");

    assert_eq!(spec.backup_paths[0].declared, "./data/dev/directus");
    assert_eq!(spec.backup_paths[0].path, dir.path().join("data/dev/directus"));
}

#[test]
fn test_tag_override() {
    let (_dir, resolver) = project("", "");
    let spec = resolver
        .resolve_with_tag("directus", "dev", Some("11.0"))
        .unwrap();
    assert_eq!(spec.image_ref(), "directus/directus:11.0");
}

#[test]
fn test_prod_hostname_is_apex() {
    let (dir, resolver) = project("", "");
    write(dir.path(), "config/directus/prod.env", "");
    let spec = resolver.resolve("directus", "prod").unwrap();
    assert_eq!(spec.hostname, "example.com");
}

#[test]
fn test_missing_environment_layer() {
    let (_dir, resolver) = project("", "");
    // prod.env was never written
    match resolver.resolve("directus", "prod") {
        Err(ConfigError::MissingLayer { layer, env, .. }) => {
            assert_eq!(layer, LayerKind::Environment);
            assert_eq!(env, "prod");
        }
        other => panic!("expected MissingLayer, got {:?}", other),
    }
}

#[test]
fn test_missing_shared_layer() {
    let (dir, resolver) = project("", "");
    std::fs::remove_file(dir.path().join("config/directus/shared.env")).unwrap();
    assert!(matches!(
        resolver.resolve("directus", "dev"),
        Err(ConfigError::MissingLayer {
            layer: LayerKind::Shared,
            ..
        })
    ));
}

#[test]
fn test_unknown_app_and_environment() {
    let (_dir, resolver) = project("", "");
    assert!(matches!(
        resolver.resolve("wordpress", "dev"),
        Err(ConfigError::AppNotFound(_))
    ));
    assert!(matches!(
        resolver.resolve("directus", "qa"),
        Err(ConfigError::EnvironmentNotFound(_))
    ));
}

#[test]
fn test_undefined_placeholder_in_volume() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = CONFIG.replace("${APP}", "${REGION}");
    write(dir.path(), "hostsolo.yaml", &yaml);
    write(dir.path(), "config/directus/shared.env", "");
    write(dir.path(), "config/directus/dev.env", "");

    let resolver = ConfigResolver::discover(dir.path()).unwrap();
    assert!(matches!(
        resolver.resolve("directus", "dev"),
        Err(ConfigError::InvalidTemplate { .. })
    ));
}

#[test]
fn test_invalid_layer_line() {
    let (_dir, resolver) = project("GOOD=1\nthis is not valid\n", "");
    match resolver.resolve("directus", "dev") {
        Err(ConfigError::InvalidLayer { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected InvalidLayer, got {:?}", other),
    }
}

#[test]
fn test_parse_file_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "hostsolo.yaml", CONFIG);
    let config = parser::parse_file(&dir.path().join("hostsolo.yaml")).unwrap();
    assert_eq!(config.apps.len(), 1);
    assert_eq!(config.environments.len(), 2);
}
