//! Identifier reconciliation integration tests
//!
//! A mutation that creates an entity offline hands out a temporary id; later
//! mutations that reference it must reach the server with the real id.

use crate::common::*;
use crate::{assert_ok, assert_pending};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;
use xfsync::client::offline::MutationContext;
use xfsync::client::sync::NetworkStatus;
use xfsync::shared::Operation;

fn create_list(name: &str) -> Operation {
    Operation::new("mutation CreateList($name: String!) { createList(name: $name) { __typename id name } }")
        .with_variables(json!({ "name": name }))
}

fn add_item(list_id: &str, text: &str) -> Operation {
    Operation::new(
        "mutation AddItem($listId: ID!, $text: String!) { addItem(listId: $listId, text: $text) { __typename id listId text } }",
    )
    .with_variables(json!({ "listId": list_id, "text": text }))
}

#[tokio::test]
async fn test_dependent_mutation_is_sent_with_server_id() {
    let server = start_graphql_server().await;
    mount_operation(
        &server,
        "CreateList",
        data_response(json!({"createList": {"__typename": "TodoList", "id": "S1", "name": "groceries"}})),
    )
    .await;
    mount_operation(
        &server,
        "AddItem",
        data_response(json!({"addItem": {"__typename": "Item", "id": "S2", "listId": "S1", "text": "milk"}})),
    )
    .await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let list_id = Uuid::new_v4().to_string();
    let item_id = Uuid::new_v4().to_string();
    assert_ok!(
        client
            .mutate(
                create_list("groceries"),
                MutationContext::new().optimistic_response(
                    json!({"createList": {"__typename": "TodoList", "id": list_id, "name": "groceries"}})
                ),
            )
            .await
    );
    let item = assert_pending!(assert_ok!(
        client
            .mutate(
                add_item(&list_id, "milk"),
                MutationContext::new().optimistic_response(
                    json!({"addItem": {"__typename": "Item", "id": item_id, "listId": list_id, "text": "milk"}})
                ),
            )
            .await
    ));

    let id_map = client.id_map().await;
    assert_eq!(id_map.len(), 2);
    assert!(id_map.get(&list_id).is_none());

    client.set_online(true);
    let committed = assert_ok!(item.committed().await);
    assert_eq!(committed["addItem"]["id"], "S2");

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["operationName"], "CreateList");
    assert_eq!(bodies[1]["operationName"], "AddItem");
    assert_eq!(bodies[1]["variables"]["listId"], "S1");
    assert!(!bodies[1].to_string().contains(&list_id));

    let cached = client.cache().extract(true);
    assert!(cached.contains_key("TodoList:S1"));
    assert!(cached.contains_key("Item:S2"));
    assert!(!cached.contains_key(&format!("TodoList:{}", list_id)));

    wait_for_drain(&client).await;
    assert!(client.id_map().await.is_empty());
}

#[tokio::test]
async fn test_nested_references_are_rewritten() {
    let server = start_graphql_server().await;
    mount_operation(
        &server,
        "CreateList",
        data_response(json!({"createList": {"__typename": "TodoList", "id": "S7", "name": "chores"}})),
    )
    .await;
    mount_operation(&server, "ShareLists", data_response(json!({"shareLists": true}))).await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let list_id = Uuid::new_v4().to_string();
    assert_ok!(
        client
            .mutate(
                create_list("chores"),
                MutationContext::new().optimistic_response(
                    json!({"createList": {"__typename": "TodoList", "id": list_id, "name": "chores"}})
                ),
            )
            .await
    );
    let share = Operation::new("mutation ShareLists($input: ShareInput!) { shareLists(input: $input) }")
        .with_variables(json!({"input": {"lists": [{"id": list_id}, {"id": "existing"}], "with": "bob"}}));
    let pending = assert_pending!(assert_ok!(client.mutate(share, MutationContext::new()).await));

    client.set_online(true);
    assert_ok!(pending.committed().await);

    let bodies = received_bodies(&server).await;
    assert_eq!(
        bodies[1]["variables"]["input"],
        json!({"lists": [{"id": "S7"}, {"id": "existing"}], "with": "bob"})
    );
}

#[tokio::test]
async fn test_unrelated_uuid_variables_are_left_alone() {
    let server = start_graphql_server().await;
    mount_operation(&server, "Tag", data_response(json!({"tag": true}))).await;
    let client = create_test_client(&server, NetworkStatus::Offline).await;

    let foreign = Uuid::new_v4().to_string();
    let tag = Operation::new("mutation Tag($ref: ID!) { tag(ref: $ref) }").with_variables(json!({"ref": foreign}));
    let pending = assert_pending!(assert_ok!(client.mutate(tag, MutationContext::new()).await));

    client.set_online(true);
    assert_ok!(pending.committed().await);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[0]["variables"]["ref"], json!(foreign));
}
