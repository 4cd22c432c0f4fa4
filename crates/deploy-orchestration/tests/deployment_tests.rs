//! Deployment lifecycle against the in-memory runtime

mod common;

use deploy_orchestration::runtime::{ContainerRuntime, LogOptions, SPEC_HASH_LABEL, UnitStatus};
use deploy_orchestration::{
    DeployOptions, DeploymentController, DeploymentError, DeploymentState, Error,
};
use futures::StreamExt;

#[smol_potat::test]
async fn test_deploy_is_idempotent() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let first = controller.deploy("directus", "dev", None).await.unwrap();
    assert_eq!(first.unit, "hostsolo-dev-directus");
    assert_eq!(first.tag, "10.8");
    assert!(first.spec_hash().is_some());
    assert_eq!(first.labels["hostsolo.app"], "directus");
    assert_eq!(first.labels["traefik.enable"], "true");

    memory.clear_calls();
    let second = controller.deploy("directus", "dev", None).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(memory.unit_count(), 1);
    assert!(memory.mutating_calls().is_empty(), "{:?}", memory.calls());
}

#[smol_potat::test]
async fn test_deploy_creates_namespaces() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    let networks = memory.networks();
    assert!(networks.contains(&"hostsolo-dev".to_string()));
    assert!(networks.contains(&"hostsolo-proxy".to_string()));

    // An app without ports is not routed, so it only joins its environment.
    controller.deploy("worker", "staging", None).await.unwrap();
    let record = memory.status("hostsolo-staging-worker").await.unwrap();
    assert_eq!(record.labels["traefik.enable"], "false");
    assert!(memory.networks().contains(&"hostsolo-staging".to_string()));
}

#[smol_potat::test]
async fn test_new_tag_replaces_unit() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let first = controller.deploy("directus", "dev", None).await.unwrap();
    let second = controller
        .deploy("directus", "dev", Some("11.0"))
        .await
        .unwrap();
    assert_eq!(second.tag, "11.0");
    assert_ne!(second.id, first.id);
    assert_ne!(second.spec_hash(), first.spec_hash());
    assert_eq!(memory.unit_count(), 1);
}

#[smol_potat::test]
async fn test_stop_without_running_unit_mutates_nothing() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let err = controller.stop("directus", "dev").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Deployment(DeploymentError::NotRunning { ref app, ref env })
            if app == "directus" && env == "dev"
    ));
    assert!(memory.mutating_calls().is_empty(), "{:?}", memory.calls());
}

#[smol_potat::test]
async fn test_stop_keeps_unit_and_second_stop_fails() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    let stopped = controller.stop("directus", "dev").await.unwrap();
    assert_eq!(stopped.status, UnitStatus::Exited);
    assert_eq!(memory.unit_count(), 1);
    assert_eq!(
        controller.state("directus", "dev").await.unwrap(),
        DeploymentState::Stopped
    );

    memory.clear_calls();
    assert!(matches!(
        controller.stop("directus", "dev").await,
        Err(Error::Deployment(DeploymentError::NotRunning { .. }))
    ));
    assert!(memory.mutating_calls().is_empty());
}

#[smol_potat::test]
async fn test_restart_keeps_running_tag() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let deployed = controller
        .deploy("directus", "dev", Some("11.0"))
        .await
        .unwrap();
    memory.clear_calls();

    let restarted = controller.restart("directus", "dev").await.unwrap();
    assert_eq!(restarted.tag, "11.0");
    assert_eq!(restarted.id, deployed.id);
    assert_eq!(
        memory.mutating_calls(),
        vec!["restart hostsolo-dev-directus".to_string()]
    );
}

#[smol_potat::test]
async fn test_restart_after_layer_change_redeploys() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let deployed = controller.deploy("directus", "dev", None).await.unwrap();
    common::write(dir.path(), "config/directus/dev.env", "KEY=rotated\n");
    memory.clear_calls();

    let restarted = controller.restart("directus", "dev").await.unwrap();
    assert_eq!(restarted.tag, deployed.tag);
    assert_ne!(
        restarted.labels.get(SPEC_HASH_LABEL),
        deployed.labels.get(SPEC_HASH_LABEL)
    );
    let calls = memory.mutating_calls();
    assert_eq!(calls.first().map(String::as_str), Some("stop hostsolo-dev-directus"));
    assert_eq!(calls.last().map(String::as_str), Some("start hostsolo-dev-directus"));
}

#[smol_potat::test]
async fn test_restart_absent_is_not_running() {
    let (_dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    assert!(matches!(
        controller.restart("directus", "dev").await,
        Err(Error::Deployment(DeploymentError::NotRunning { .. }))
    ));
}

#[smol_potat::test]
async fn test_deploy_refuses_unit_being_removed() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Removing);
    memory.clear_calls();

    let err = controller
        .deploy("directus", "dev", Some("11.0"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Deployment(DeploymentError::ReplaceInProgress {
            state: DeploymentState::Stopping,
            ..
        })
    ));
    assert!(matches!(
        controller.restart("directus", "dev").await,
        Err(Error::Deployment(DeploymentError::ReplaceInProgress { .. }))
    ));
    assert!(memory.mutating_calls().is_empty());
}

#[smol_potat::test]
async fn test_crash_looping_unit_can_be_stopped() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Restarting);

    let record = controller.stop("directus", "dev").await.unwrap();
    assert_eq!(record.status, UnitStatus::Exited);
    assert_eq!(
        controller.state("directus", "dev").await.unwrap(),
        DeploymentState::Stopped
    );
}

#[smol_potat::test]
async fn test_crash_looping_unit_is_replaced_by_deploy() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Restarting);

    let record = controller
        .deploy("directus", "dev", Some("11.0"))
        .await
        .unwrap();
    assert_eq!(record.tag, "11.0");
    assert_eq!(record.status, UnitStatus::Running);
    assert_eq!(memory.unit_count(), 1);

    // same spec, still crash-looping: deploy must not treat it as running
    memory.set_status("hostsolo-dev-directus", UnitStatus::Restarting);
    memory.clear_calls();
    controller
        .deploy("directus", "dev", Some("11.0"))
        .await
        .unwrap();
    assert!(
        memory
            .calls()
            .contains(&"start hostsolo-dev-directus".to_string())
    );
}

#[smol_potat::test]
async fn test_crash_looping_unit_can_be_restarted() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_status("hostsolo-dev-directus", UnitStatus::Restarting);
    memory.clear_calls();

    let record = controller.restart("directus", "dev").await.unwrap();
    assert_eq!(record.status, UnitStatus::Running);
    assert_eq!(record.tag, "10.8");
    let calls = memory.mutating_calls();
    assert_eq!(calls.first().map(String::as_str), Some("stop hostsolo-dev-directus"));
    assert_eq!(calls.last().map(String::as_str), Some("start hostsolo-dev-directus"));
}

#[smol_potat::test]
async fn test_deploy_pulls_image_before_starting() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    let options = DeployOptions {
        tag: None,
        pull: true,
    };
    controller.deploy_with("directus", "dev", &options).await.unwrap();

    let calls = memory.mutating_calls();
    assert_eq!(
        calls.first().map(String::as_str),
        Some("pull directus/directus:10.8")
    );
    assert_eq!(calls.last().map(String::as_str), Some("start hostsolo-dev-directus"));
}

#[smol_potat::test]
async fn test_deploy_without_pull_never_pulls() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", Some("11.0")).await.unwrap();
    assert!(!memory.calls().iter().any(|c| c.starts_with("pull")));
}

#[smol_potat::test]
async fn test_pulled_newer_image_replaces_unchanged_unit() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);
    let options = DeployOptions {
        tag: None,
        pull: true,
    };

    let first = controller.deploy_with("directus", "dev", &options).await.unwrap();

    // registry unchanged: pulled, but the unit is left alone
    memory.clear_calls();
    let same = controller.deploy_with("directus", "dev", &options).await.unwrap();
    assert_eq!(same.id, first.id);
    assert_eq!(
        memory.mutating_calls(),
        vec!["pull directus/directus:10.8".to_string()]
    );

    // a newer image behind the same tag
    memory.publish_newer_image("directus/directus:10.8");
    memory.clear_calls();
    let replaced = controller.deploy_with("directus", "dev", &options).await.unwrap();
    assert_ne!(replaced.id, first.id);
    assert_eq!(replaced.tag, "10.8");
    assert_eq!(
        memory.mutating_calls(),
        vec![
            "pull directus/directus:10.8".to_string(),
            "stop hostsolo-dev-directus".to_string(),
            "remove hostsolo-dev-directus".to_string(),
            "start hostsolo-dev-directus".to_string(),
        ]
    );
    assert_eq!(memory.unit_count(), 1);
}

#[smol_potat::test]
async fn test_unreachable_runtime_is_surfaced() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    memory.set_unreachable(true);
    assert!(matches!(
        controller.deploy("directus", "dev", None).await,
        Err(Error::Deployment(DeploymentError::RuntimeUnreachable(_)))
    ));
}

#[smol_potat::test]
async fn test_unknown_app_fails_before_runtime() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    assert!(matches!(
        controller.deploy("ghost", "dev", None).await,
        Err(Error::Config(hostsolo_config::ConfigError::AppNotFound(_)))
    ));
    assert!(memory.calls().is_empty());
}

#[smol_potat::test]
async fn test_logs_stream_lines() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    memory.set_logs(
        "hostsolo-dev-directus",
        vec!["boot".to_string(), "ready".to_string(), "request".to_string()],
    );

    let options = LogOptions {
        follow: false,
        tail: Some(2),
    };
    let lines: Vec<String> = controller
        .logs("directus", "dev", options)
        .await
        .unwrap()
        .map(|l| l.line)
        .collect()
        .await;
    assert_eq!(lines, vec!["ready", "request"]);
}

#[smol_potat::test]
async fn test_status_overview() {
    let (_dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();

    let all = controller.status(None).await.unwrap();
    assert_eq!(all.len(), 6);

    let dev = controller.status(Some("dev")).await.unwrap();
    assert_eq!(dev.len(), 2);
    let directus = dev.iter().find(|s| s.app == "directus").unwrap();
    assert_eq!(directus.state, DeploymentState::Running);
    assert_eq!(directus.tag.as_deref(), Some("10.8"));
    assert_eq!(directus.hostname, "dev.example.com");
    let worker = dev.iter().find(|s| s.app == "worker").unwrap();
    assert_eq!(worker.state, DeploymentState::Absent);

    let prod = controller.status(Some("prod")).await.unwrap();
    assert!(prod.iter().all(|s| s.hostname == "example.com"));
}
