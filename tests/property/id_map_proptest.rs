//! Property-based tests for identifier extraction and rewriting

use proptest::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;
use xfsync::client::cache::default_data_id;
use xfsync::client::offline::{extract_identifiers, resolve_references, IdMap};

const TEMP_IDS: [&str; 4] = [
    "0b7c6f0e-8f2a-4c3b-9d1e-2a3b4c5d6e7f",
    "1c8d7a1f-9a3b-4d4c-8e2f-3b4c5d6e7f80",
    "2d9e8b2a-ab4c-4e5d-9f30-4c5d6e7f8091",
    "3eaf9c3b-bc5d-4f6e-a041-5d6e7f8091a2",
];

fn id_pool() -> Vec<String> {
    let mut pool: Vec<String> = TEMP_IDS.iter().map(|id| id.to_string()).collect();
    pool.push("42".to_string());
    pool.push("existing".to_string());
    pool
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
        proptest::sample::select(id_pool()).prop_map(Value::String),
        ("[A-Z][a-z]{2,6}", proptest::sample::select(id_pool()))
            .prop_map(|(typename, id)| json!({"__typename": typename, "id": id})),
    ]
}

fn json_tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Map covering the first `mapped` pool identifiers
fn id_map(mapped: usize) -> (IdMap, Vec<String>) {
    let owner = Uuid::new_v4();
    let mut map = IdMap::new();
    let temps: Vec<String> = TEMP_IDS.iter().take(mapped).map(|id| id.to_string()).collect();
    for (index, temp) in temps.iter().enumerate() {
        map.insert(temp.clone(), format!("server-{}", index), owner);
    }
    (map, temps)
}

fn contains_string(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s == needle,
        Value::Array(items) => items.iter().any(|item| contains_string(item, needle)),
        Value::Object(fields) => fields.values().any(|child| contains_string(child, needle)),
        _ => false,
    }
}

proptest! {
    #[test]
    fn test_extraction_is_deterministic(tree in json_tree()) {
        let first = extract_identifiers(&tree, &default_data_id);
        let second = extract_identifiers(&tree, &default_data_id);
        prop_assert_eq!(&first, &second);
        for id in first.values() {
            prop_assert!(Uuid::parse_str(id).is_ok());
        }
    }

    #[test]
    fn test_resolved_payload_has_no_mapped_temp_ids(tree in json_tree(), mapped in 0usize..4) {
        let (map, temps) = id_map(mapped);
        let resolved = resolve_references(&tree, &map).unwrap();

        for temp in &temps {
            prop_assert!(!contains_string(&resolved, temp));
        }
        let remaining = extract_identifiers(&resolved, &default_data_id);
        prop_assert!(remaining.values().all(|id| !temps.contains(id)));
    }

    #[test]
    fn test_unmapped_values_are_unchanged(tree in json_tree()) {
        let resolved = resolve_references(&tree, &IdMap::new()).unwrap();
        prop_assert_eq!(resolved, tree);
    }

    #[test]
    fn test_resolution_is_idempotent(tree in json_tree(), mapped in 0usize..4) {
        let (map, _) = id_map(mapped);
        let once = resolve_references(&tree, &map).unwrap();
        let twice = resolve_references(&once, &map).unwrap();
        prop_assert_eq!(once, twice);
    }
}
