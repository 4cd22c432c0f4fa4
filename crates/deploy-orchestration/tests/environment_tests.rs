//! Environment lifecycle against the in-memory runtime

mod common;

use deploy_orchestration::runtime::ContainerRuntime;
use deploy_orchestration::{
    DeploymentController, DeploymentState, DestroyOptions, EnvironmentError, EnvironmentManager,
    EnvironmentState, Error,
};

#[smol_potat::test]
async fn test_ensure_is_idempotent() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    let first = manager.ensure("dev").await.unwrap();
    assert_eq!(first.name, "hostsolo-dev");
    assert!(first.created);

    let second = manager.ensure("dev").await.unwrap();
    assert_eq!(second.name, "hostsolo-dev");
    assert!(!second.created);
    assert_eq!(memory.networks(), vec!["hostsolo-dev".to_string()]);
}

#[smol_potat::test]
async fn test_ensure_unknown_environment() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    assert!(matches!(
        manager.ensure("qa").await,
        Err(Error::Environment(EnvironmentError::UnknownEnvironment(_)))
    ));
    assert!(memory.calls().is_empty());
}

#[smol_potat::test]
async fn test_create_conflicts_with_existing_namespace() {
    let (_dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    let env = manager.create("staging", None).await.unwrap();
    assert_eq!(env.state, EnvironmentState::Active);
    assert_eq!(env.hostname, "staging.example.com");

    assert!(matches!(
        manager.create("staging", None).await,
        Err(Error::Environment(EnvironmentError::NamespaceConflict { .. }))
    ));
}

#[smol_potat::test]
async fn test_list_reports_state() {
    let (_dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    manager.ensure("prod").await.unwrap();
    let envs = manager.list().await.unwrap();
    let names: Vec<_> = envs.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["dev", "staging", "prod"]);

    let prod = envs.iter().find(|e| e.name == "prod").unwrap();
    assert_eq!(prod.state, EnvironmentState::Active);
    assert_eq!(prod.hostname, "example.com");
    let dev = envs.iter().find(|e| e.name == "dev").unwrap();
    assert_eq!(dev.state, EnvironmentState::Absent);
}

#[smol_potat::test]
async fn test_destroy_refuses_running_units_without_force() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    let err = controller
        .environments()
        .destroy("dev", DestroyOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Environment(EnvironmentError::HasActiveDeployments { env, units }) => {
            assert_eq!(env, "dev");
            assert_eq!(units, vec!["hostsolo-dev-directus".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(memory.unit_count(), 1);
}

#[smol_potat::test]
async fn test_destroy_without_remove_data_keeps_data() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    common::write(dir.path(), "data/dev/directus/db.sqlite", "rows");
    controller.deploy("directus", "dev", None).await.unwrap();

    let env = controller
        .environments()
        .destroy(
            "dev",
            DestroyOptions {
                remove_data: false,
                force: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(env.state, EnvironmentState::Destroyed);
    assert_eq!(memory.unit_count(), 0);
    assert!(!memory.networks().contains(&"hostsolo-dev".to_string()));
    assert_eq!(
        controller.state("directus", "dev").await.unwrap(),
        DeploymentState::Absent
    );
    assert!(dir.path().join("data/dev/directus/db.sqlite").exists());
}

#[smol_potat::test]
async fn test_destroy_with_remove_data_purges_only_that_environment() {
    let (dir, resolver) = common::project();
    let (_memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    common::write(dir.path(), "data/dev/directus/db.sqlite", "rows");
    common::write(dir.path(), "data/prod/directus/db.sqlite", "rows");
    manager.ensure("dev").await.unwrap();

    manager
        .destroy(
            "dev",
            DestroyOptions {
                remove_data: true,
                force: false,
            },
        )
        .await
        .unwrap();
    assert!(!dir.path().join("data/dev").exists());
    assert!(dir.path().join("data/prod/directus/db.sqlite").exists());
}

#[smol_potat::test]
async fn test_destroy_removes_stopped_units_without_force() {
    let (_dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let controller = DeploymentController::new(resolver, runtime);

    controller.deploy("directus", "dev", None).await.unwrap();
    controller.stop("directus", "dev").await.unwrap();

    controller
        .environments()
        .destroy("dev", DestroyOptions::default())
        .await
        .unwrap();
    assert_eq!(memory.unit_count(), 0);
    assert!(memory.find("hostsolo-dev-directus").await.unwrap().is_none());
}

#[smol_potat::test]
async fn test_destroy_rejects_undeclared_names() {
    let (dir, resolver) = common::project();
    let (memory, runtime) = common::runtime();
    let manager = EnvironmentManager::new(resolver, runtime);

    for name in ["nosuch", "..", ""] {
        let result = manager
            .destroy(
                name,
                DestroyOptions {
                    remove_data: true,
                    force: true,
                },
            )
            .await;
        assert!(
            matches!(
                result,
                Err(Error::Environment(EnvironmentError::UnknownEnvironment(_)))
            ),
            "destroy({name:?}) should be refused"
        );
    }
    assert!(memory.calls().is_empty());
    assert!(dir.path().join("hostsolo.yaml").exists());
    assert!(dir.path().join("config/directus/shared.env").exists());
}
