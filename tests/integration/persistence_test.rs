//! Persistence integration tests
//!
//! The queue, identifier map and cache survive a restart of the client.

use crate::assert_ok;
use crate::common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;
use xfsync::client::local_db::LocalDatabase;
use xfsync::client::offline::{EffectStatus, MutationContext};
use xfsync::client::sync::NetworkStatus;
use xfsync::shared::Operation;

fn create_list(name: &str) -> Operation {
    Operation::new("mutation CreateList($name: String!) { createList(name: $name) { __typename id name } }")
        .with_variables(json!({ "name": name }))
}

fn add_item(list_id: &str) -> Operation {
    Operation::new("mutation AddItem($listId: ID!) { addItem(listId: $listId) { __typename id } }")
        .with_variables(json!({ "listId": list_id }))
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("offline.db");
    let server = start_graphql_server().await;
    mount_operation(
        &server,
        "CreateList",
        data_response(json!({"createList": {"__typename": "TodoList", "id": "S1", "name": "trip"}})),
    )
    .await;
    mount_operation(&server, "AddItem", data_response(json!({"addItem": {"__typename": "Item", "id": "S2"}}))).await;

    let list_id = Uuid::new_v4().to_string();
    {
        let client = create_file_client(&server, &db_path, NetworkStatus::Offline).await;
        assert_ok!(
            client
                .mutate(
                    create_list("trip"),
                    MutationContext::new().optimistic_response(
                        json!({"createList": {"__typename": "TodoList", "id": list_id, "name": "trip"}})
                    ),
                )
                .await
        );
        assert_ok!(client.mutate(add_item(&list_id), MutationContext::new()).await);
        client.shutdown().await;
    }

    let client = create_file_client(&server, &db_path, NetworkStatus::Offline).await;
    let effects = client.pending_effects().await;
    assert_eq!(effects.len(), 2);
    assert_eq!(effects[0].operation.operation_name.as_deref(), Some("CreateList"));
    assert_eq!(effects[1].operation.operation_name.as_deref(), Some("AddItem"));
    assert!(effects.iter().all(|e| e.status == EffectStatus::Queued));
    assert_eq!(client.id_map().await.len(), 1);
    assert!(client
        .cache()
        .extract(true)
        .contains_key(&format!("TodoList:{}", list_id)));
    assert!(received_bodies(&server).await.is_empty());

    client.set_online(true);
    wait_for_drain(&client).await;

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1]["variables"]["listId"], "S1");
    client.shutdown().await;

    let db = LocalDatabase::open(&db_path).await.unwrap();
    assert!(db.pending_effects().await.unwrap().is_empty());
    let state = db.load_state().await.unwrap();
    assert!(state.id_map.is_empty());
    assert!(state.snapshot.is_none());
}

#[tokio::test]
async fn test_retry_count_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("offline.db");
    let server = start_graphql_server().await;

    {
        let client = create_file_client(&server, &db_path, NetworkStatus::Offline).await;
        assert_ok!(
            client
                .mutate(Operation::new("mutation Ping { ping }"), MutationContext::new())
                .await
        );
        client.shutdown().await;
    }

    // Simulate attempts made before the restart
    {
        let db = LocalDatabase::open(&db_path).await.unwrap();
        let mut effects = db.pending_effects().await.unwrap();
        effects[0].retry_count = 4;
        effects[0].last_error = Some("Network error: connection refused".to_string());
        db.update_effect(&effects[0]).await.unwrap();
        db.close().await;
    }

    let client = create_file_client(&server, &db_path, NetworkStatus::Offline).await;
    let effects = client.pending_effects().await;
    assert_eq!(effects[0].retry_count, 4);
    assert_eq!(
        effects[0].last_error.as_deref(),
        Some("Network error: connection refused")
    );
}
