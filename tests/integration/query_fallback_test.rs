//! Query fallback integration tests

use crate::common::*;
use crate::{assert_err, assert_ok, assert_pending};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use xfsync::client::offline::MutationContext;
use xfsync::client::sync::NetworkStatus;
use xfsync::shared::{Operation, SyncError};

fn todos_query() -> Operation {
    Operation::new("query Todos { todos { __typename id name } }")
}

fn todos_data() -> serde_json::Value {
    json!({"todos": [
        {"__typename": "Todo", "id": "1", "name": "milk"},
        {"__typename": "Todo", "id": "2", "name": "bread"}
    ]})
}

#[tokio::test]
async fn test_offline_query_is_served_from_cache() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Todos", data_response(todos_data())).await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    let online = assert_ok!(client.query(todos_query()).await);
    assert_eq!(online, todos_data());
    assert_eq!(received_bodies(&server).await.len(), 1);

    client.set_online(false);
    let offline = assert_ok!(client.query(todos_query()).await);

    assert_eq!(offline, todos_data());
    assert_eq!(received_bodies(&server).await.len(), 1);
}

#[tokio::test]
async fn test_offline_query_sees_optimistic_updates() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Todos", data_response(todos_data())).await;
    let client = create_test_client(&server, NetworkStatus::Online).await;
    assert_ok!(client.query(todos_query()).await);

    client.set_online(false);
    let rename = Operation::new("mutation Rename($id: ID!, $name: String!) { rename(id: $id, name: $name) { __typename id name } }")
        .with_variables(json!({"id": "1", "name": "oat milk"}));
    assert_ok!(
        client
            .mutate(
                rename,
                MutationContext::new()
                    .optimistic_response(json!({"rename": {"__typename": "Todo", "id": "1", "name": "oat milk"}})),
            )
            .await
    );

    let todos = assert_ok!(client.query(todos_query()).await);
    assert_eq!(todos["todos"][0]["name"], "oat milk");
    assert_eq!(todos["todos"][1]["name"], "bread");
}

#[tokio::test]
async fn test_offline_cache_miss_is_an_error() {
    let server = start_graphql_server().await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    assert_err!(client.query(todos_query()).await, SyncError::CacheMiss { .. });
    assert!(received_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_falls_back_to_cache() {
    let server = start_graphql_server().await;
    mount_operation_once(&server, "Todos", data_response(todos_data())).await;
    mount_operation(&server, "Todos", server_error()).await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    assert_ok!(client.query(todos_query()).await);
    let fallback = assert_ok!(client.query(todos_query()).await);

    assert_eq!(fallback, todos_data());
    assert_eq!(received_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn test_query_graphql_errors_are_returned() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Todos", errors_response(json!([{"message": "not authorized"}]))).await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    assert_err!(client.query(todos_query()).await, SyncError::GraphQL { .. });
}

#[tokio::test]
async fn test_query_fetched_during_replay_survives_commit() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Todos", data_response(todos_data())).await;
    mount_delayed_operation(
        &server,
        "Touch",
        json!({"touch": {"__typename": "Stamp", "id": "s1"}}),
        Duration::from_millis(300),
    )
    .await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    let touch = Operation::new("mutation Touch { touch { __typename id } }");
    let _pending = assert_pending!(assert_ok!(client.mutate(touch, MutationContext::new()).await));
    assert_ok!(client.query(todos_query()).await);
    assert_eq!(client.pending_count().await, 1);

    wait_for_drain(&client).await;
    client.set_online(false);

    let offline = assert_ok!(client.query(todos_query()).await);
    assert_eq!(offline, todos_data());
}

#[tokio::test]
async fn test_query_fetched_during_replay_survives_discard() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Todos", data_response(todos_data())).await;
    mount_operation(
        &server,
        "Touch",
        errors_response(json!([{"message": "not allowed"}])).set_delay(Duration::from_millis(300)),
    )
    .await;
    let client = create_test_client(&server, NetworkStatus::Online).await;

    let touch = Operation::new("mutation Touch { touch { __typename id } }");
    let pending = assert_pending!(assert_ok!(client.mutate(touch, MutationContext::new()).await));
    assert_ok!(client.query(todos_query()).await);

    assert!(pending.committed().await.is_err());
    client.set_online(false);

    let offline = assert_ok!(client.query(todos_query()).await);
    assert_eq!(offline, todos_data());
}
