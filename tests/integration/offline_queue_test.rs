//! Offline queue integration tests
//!
//! Issuing mutations while offline, replay order, and resuming a drain that
//! was interrupted by a connectivity change.

use crate::common::*;
use crate::{assert_ok, assert_pending};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use xfsync::client::offline::MutationContext;
use xfsync::client::sync::NetworkStatus;
use xfsync::shared::{Operation, QueueEventKind};

fn add_todo(name: &str) -> Operation {
    Operation::new("mutation AddTodo($name: String!) { addTodo(name: $name) { __typename id name } }")
        .with_variables(json!({ "name": name }))
}

fn named(name: &str) -> Operation {
    Operation::new(format!("mutation {} {{ touch {{ __typename id }} }}", name))
}

#[tokio::test]
async fn test_offline_mutation_returns_optimistic_result_without_network() {
    let server = start_graphql_server().await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let temp_id = Uuid::new_v4().to_string();
    let optimistic = json!({"addTodo": {"__typename": "Todo", "id": temp_id, "name": "milk"}});
    let outcome = assert_ok!(
        client
            .mutate(add_todo("milk"), MutationContext::new().optimistic_response(optimistic.clone()))
            .await
    );

    assert_eq!(outcome.immediate(), &optimistic);
    let pending = assert_pending!(outcome);
    assert_eq!(pending.optimistic(), &optimistic);

    let cached = client.cache().extract(true);
    assert!(cached.contains_key(&format!("Todo:{}", temp_id)));
    assert_eq!(client.pending_count().await, 1);
    assert!(received_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn test_offline_mutation_without_optimistic_response_returns_null_skeleton() {
    let server = start_graphql_server().await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let outcome = assert_ok!(client.mutate(add_todo("bread"), MutationContext::new()).await);

    assert_eq!(outcome.immediate(), &json!({"addTodo": null}));
    assert!(received_bodies(&server).await.is_empty());

    let effects = client.pending_effects().await;
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].mutation_name().as_deref(), Some("addTodo"));
}

#[tokio::test]
async fn test_queries_cannot_be_queued() {
    let server = start_graphql_server().await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let result = client
        .mutate(Operation::new("query Todos { todos { id } }"), MutationContext::new())
        .await;

    assert!(matches!(result, Err(xfsync::shared::SyncError::Validation { .. })));
    assert_eq!(client.pending_count().await, 0);
}

#[tokio::test]
async fn test_queued_mutations_replay_in_issue_order() {
    let server = start_graphql_server().await;
    for name in ["First", "Second", "Third"] {
        mount_operation(
            &server,
            name,
            data_response(json!({"touch": {"__typename": "Counter", "id": name}})),
        )
        .await;
    }
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let mut handles = Vec::new();
    for name in ["First", "Second", "Third"] {
        let outcome = assert_ok!(client.mutate(named(name), MutationContext::new()).await);
        handles.push(assert_pending!(outcome));
    }
    assert!(received_bodies(&server).await.is_empty());

    client.set_online(true);
    for handle in handles {
        let committed = tokio::time::timeout(Duration::from_secs(10), handle.committed())
            .await
            .expect("mutation settled");
        assert_ok!(committed);
    }

    assert_eq!(received_operation_names(&server).await, vec!["First", "Second", "Third"]);
    assert_eq!(client.pending_count().await, 0);
    assert!(client.id_map().await.is_empty());
}

#[tokio::test]
async fn test_mutation_issued_online_is_still_queued_first() {
    let server = start_graphql_server().await;
    mount_operation(
        &server,
        "AddTodo",
        data_response(json!({"addTodo": {"__typename": "Todo", "id": "42", "name": "eggs"}})),
    )
    .await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    let outcome = assert_ok!(client.mutate(add_todo("eggs"), MutationContext::new()).await);
    let pending = assert_pending!(outcome);
    let data = assert_ok!(pending.committed().await);

    assert_eq!(data["addTodo"]["id"], "42");
    assert_eq!(received_bodies(&server).await.len(), 1);
    assert!(client.cache().extract(true).contains_key("Todo:42"));
}

#[tokio::test]
async fn test_going_offline_mid_drain_resumes_without_duplicates() {
    let server = start_graphql_server().await;
    mount_operation(&server, "First", data_response(json!({"touch": {"__typename": "Counter", "id": "1"}}))).await;
    mount_delayed_operation(
        &server,
        "Second",
        json!({"touch": {"__typename": "Counter", "id": "2"}}),
        Duration::from_millis(300),
    )
    .await;
    mount_operation(&server, "Third", data_response(json!({"touch": {"__typename": "Counter", "id": "3"}}))).await;

    let client = create_test_client(&server, NetworkStatus::Offline).await;
    let mut events = client.subscribe_events();

    let first = assert_pending!(assert_ok!(client.mutate(named("First"), MutationContext::new()).await));
    let first_id = first.effect_id();
    for name in ["Second", "Third"] {
        assert_ok!(client.mutate(named(name), MutationContext::new()).await);
    }

    client.set_online(true);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if event.effect_id == Some(first_id) && event.kind == QueueEventKind::Committed {
                return;
            }
        }
    })
    .await
    .expect("first mutation committed");
    client.set_online(false);

    // Whatever was in flight finishes; nothing new is sent while offline
    tokio::time::sleep(Duration::from_millis(600)).await;
    let names = received_operation_names(&server).await;
    assert!(!names.contains(&"Third".to_string()), "sent while offline: {:?}", names);
    assert!(client.pending_count().await >= 1);

    client.set_online(true);
    wait_for_drain(&client).await;

    assert_eq!(received_operation_names(&server).await, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn test_status_reports_pending_and_network() {
    let server = start_graphql_server().await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    assert_ok!(client.mutate(named("Later"), MutationContext::new()).await);

    let status = client.status().await;
    assert_eq!(status.pending_operations, 1);
    assert_eq!(status.network_status, NetworkStatus::Offline);
    assert!(!status.is_syncing);
}
