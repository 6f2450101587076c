//! Control plane against a live PostgreSQL (CONVOY_TEST_POSTGRES_DSN).

#![cfg(feature = "db-tests")]

mod support;

use convoy_api::{ControlPlane, ServerConfig};
use convoy_core::{wire, ConfigKind, DEFAULT_GROUP_NAME};
use convoy_storage::{open_store, StorageDriver, StoreHandle};
use support::{beat, check_of, detail, scenario_config};

async fn connect(config: &ServerConfig) -> StoreHandle {
    let raw = open_store(StorageDriver::Postgres, &config.storage_dsn, &config.store_options())
        .await
        .expect("postgres reachable");
    StoreHandle::new(raw)
}

#[tokio::test]
async fn test_heartbeat_plan_over_postgres() {
    let config = ServerConfig {
        storage_driver: StorageDriver::Postgres,
        storage_dsn: std::env::var("CONVOY_TEST_POSTGRES_DSN")
            .unwrap_or_else(|_| "postgres://postgres@localhost/convoy_test".to_string()),
        ..scenario_config()
    };
    let store = connect(&config).await;
    let plane = ControlPlane::bootstrap(store.clone(), &config).await.unwrap();

    let name = format!("db-test-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
    plane.create_config(ConfigKind::Pipeline, detail(&name, "body")).await.unwrap();
    plane.apply_config(ConfigKind::Pipeline, &name, DEFAULT_GROUP_NAME).await.unwrap();

    let agent = format!("{name}-agent");
    let reply = plane.heartbeat(beat(&agent, 0, &[], &[])).await.unwrap();
    assert_eq!(check_of(&reply.pipeline_check_results, &name), wire::CheckStatus::New);
    plane.agents().flush_pending().await.unwrap();

    let restarted = ControlPlane::bootstrap(store.clone(), &config).await.unwrap();
    assert!(restarted.get_agent(agent.as_bytes()).await.is_ok());

    restarted.remove_config(ConfigKind::Pipeline, &name, DEFAULT_GROUP_NAME).await.unwrap();
    restarted.delete_config(ConfigKind::Pipeline, &name).await.unwrap();
    store.close().await.unwrap();
}
