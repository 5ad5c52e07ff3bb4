//! # Identifier Map
//!
//! Tracks client-generated temporary identifiers (UUIDs placed in optimistic
//! responses) and the identifiers the server assigns when the owning mutation
//! commits, and rewrites queued payloads so dependent mutations reference the
//! server identifiers.
//!
//! ## Correlation
//!
//! Every entry records the effect that introduced it (its correlation token),
//! the entity `__typename`, and the path of the entity inside that effect's
//! optimistic response. On commit only the committing effect's entries are
//! resolved, each by looking up its own path in the server response and
//! checking the typename. [`map_identifiers`] keeps the older whole-tree
//! positional alignment available as a utility; it silently mismatches when the
//! server reorders arrays.
//!
//! ## Walks
//!
//! JSON trees are owned values and cannot contain cycles, but they come from
//! callers and servers, so every walk is bounded by [`MAX_WALK_DEPTH`].

use crate::shared::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Deepest nesting any walk descends into
pub const MAX_WALK_DEPTH: usize = 128;

/// One temporary identifier and what is known about it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TempIdEntry {
    /// Client-generated identifier
    pub temp_id: String,
    /// `__typename` of the entity carrying it
    pub typename: String,
    /// Path of the entity inside the owning effect's optimistic response
    pub path: String,
    /// Effect that introduced the identifier
    pub effect_id: Uuid,
    /// Server-assigned identifier, once known
    pub server_id: Option<String>,
}

/// Temporary identifier → server identifier map
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdMap {
    entries: BTreeMap<String, TempIdEntry>,
}

/// Trailing `:`-separated component of a cache key (`"Todo:abc"` → `"abc"`)
///
/// Keys without a separator are taken whole, so identity functions that
/// return bare identifiers still resolve.
fn trailing_component(key: &str) -> Option<&str> {
    let id = key.rsplit_once(':').map_or(key, |(_, id)| id);
    Some(id).filter(|id| !id.is_empty())
}

/// Whether `id` looks like a client-generated identifier
pub fn is_temporary_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

/// Node at a dotted path (`"createTodo.items.0"`)
fn node_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn walk_entities<F, V>(value: &Value, path: &str, depth: usize, identity: &F, visit: &mut V)
where
    F: Fn(&Map<String, Value>) -> Option<String>,
    V: FnMut(&str, &Map<String, Value>, String),
{
    if depth > MAX_WALK_DEPTH {
        tracing::warn!("[IdMap] Walk stopped at depth {} ({})", depth, path);
        return;
    }
    match value {
        Value::Object(map) => {
            if map.contains_key("__typename") {
                if let Some(key) = identity(map) {
                    visit(path, map, key);
                }
            }
            for (field, child) in map {
                walk_entities(child, &join_path(path, field), depth + 1, identity, visit);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk_entities(child, &join_path(path, &index.to_string()), depth + 1, identity, visit);
            }
        }
        _ => {}
    }
}

/// Temporary identifiers in a response tree, keyed by structural path
///
/// Only entities whose cache key ends in a UUID are recorded. The result depends
/// only on the tree, so repeated calls agree.
pub fn extract_identifiers<F>(value: &Value, identity: &F) -> BTreeMap<String, String>
where
    F: Fn(&Map<String, Value>) -> Option<String>,
{
    let mut found = BTreeMap::new();
    walk_entities(value, "", 0, identity, &mut |path, _, key| {
        if let Some(id) = trailing_component(&key).filter(|id| is_temporary_id(id)) {
            found.insert(path.to_string(), id.to_string());
        }
    });
    found
}

/// Align two trees of identical shape and pair their identifiers by path
///
/// Returns `(old_id, new_id)` for every path present in both extractions where
/// the identifiers differ.
pub fn map_identifiers<F>(old: &Value, new: &Value, identity: &F) -> Vec<(String, String)>
where
    F: Fn(&Map<String, Value>) -> Option<String>,
{
    let old_ids = extract_identifiers(old, identity);
    let new_ids = extract_identifiers(new, identity);
    old_ids
        .into_iter()
        .filter_map(|(path, old_id)| {
            new_ids
                .get(&path)
                .filter(|new_id| **new_id != old_id)
                .map(|new_id| (old_id, new_id.clone()))
        })
        .collect()
}

fn resolve_node(value: &Value, map: &IdMap, depth: usize) -> Result<Value> {
    if depth > MAX_WALK_DEPTH {
        return Err(SyncError::patch(format!(
            "payload nested deeper than {} levels",
            MAX_WALK_DEPTH
        )));
    }
    Ok(match value {
        Value::String(s) => match map.get(s) {
            Some(server_id) => Value::String(server_id.to_string()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_node(item, map, depth + 1))
                .collect::<Result<_>>()?,
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, child)| Ok((key.clone(), resolve_node(child, map, depth + 1)?)))
                .collect::<Result<_>>()?,
        ),
        scalar => scalar.clone(),
    })
}

/// Copy of `value` with every mapped temporary identifier replaced
///
/// Only string nodes whose whole value equals a mapped identifier are
/// replaced; object keys and partial matches are left alone. The input is not
/// modified.
pub fn resolve_references(value: &Value, map: &IdMap) -> Result<Value> {
    resolve_node(value, map, 0)
}

fn mentions(value: &Value, needle: &str, depth: usize) -> bool {
    if depth > MAX_WALK_DEPTH {
        return false;
    }
    match value {
        Value::String(s) => s == needle,
        Value::Array(items) => items.iter().any(|item| mentions(item, needle, depth + 1)),
        Value::Object(fields) => fields.values().any(|child| mentions(child, needle, depth + 1)),
        _ => false,
    }
}

impl IdMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked temporary identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no identifiers are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Server identifier for a temporary identifier, if known
    pub fn get(&self, temp_id: &str) -> Option<&str> {
        self.entries.get(temp_id).and_then(|e| e.server_id.as_deref())
    }

    /// Entry for a temporary identifier
    pub fn entry(&self, temp_id: &str) -> Option<&TempIdEntry> {
        self.entries.get(temp_id)
    }

    /// All entries in temporary-identifier order
    pub fn entries(&self) -> impl Iterator<Item = &TempIdEntry> {
        self.entries.values()
    }

    /// Resolved `(temp_id, server_id)` pairs
    pub fn resolved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .filter_map(|e| e.server_id.as_deref().map(|s| (e.temp_id.as_str(), s)))
    }

    /// Record the temporary identifiers introduced by an effect's optimistic response
    ///
    /// Identifiers already tracked keep their original owner. Returns the number
    /// of new entries.
    pub fn register<F>(&mut self, effect_id: Uuid, optimistic: &Value, identity: &F) -> usize
    where
        F: Fn(&Map<String, Value>) -> Option<String>,
    {
        let mut added = 0;
        walk_entities(optimistic, "", 0, identity, &mut |path, entity, key| {
            let Some(id) = trailing_component(&key).filter(|id| is_temporary_id(id)) else {
                return;
            };
            if self.entries.contains_key(id) {
                return;
            }
            let typename = entity
                .get("__typename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.entries.insert(
                id.to_string(),
                TempIdEntry {
                    temp_id: id.to_string(),
                    typename,
                    path: path.to_string(),
                    effect_id,
                    server_id: None,
                },
            );
            added += 1;
        });
        added
    }

    /// Resolve the entries owned by a committed effect against its server response
    ///
    /// Returns the newly learned `(temp_id, server_id)` pairs. Entries whose path
    /// is missing from the response, or whose typename differs, stay unresolved.
    pub fn record_commit<F>(&mut self, effect_id: Uuid, server_data: &Value, identity: &F) -> Vec<(String, String)>
    where
        F: Fn(&Map<String, Value>) -> Option<String>,
    {
        let mut learned = Vec::new();
        for entry in self
            .entries
            .values_mut()
            .filter(|e| e.effect_id == effect_id && e.server_id.is_none())
        {
            let server_entity = node_at(server_data, &entry.path).and_then(Value::as_object);
            let Some(server_entity) = server_entity else {
                tracing::warn!(
                    "[IdMap] Server response has no entity at '{}' for {}",
                    entry.path,
                    entry.temp_id
                );
                continue;
            };
            let server_typename = server_entity.get("__typename").and_then(Value::as_str);
            if server_typename != Some(entry.typename.as_str()) {
                tracing::warn!(
                    "[IdMap] Typename mismatch at '{}': expected {}, got {:?}",
                    entry.path,
                    entry.typename,
                    server_typename
                );
                continue;
            }
            let server_id = identity(server_entity)
                .as_deref()
                .and_then(trailing_component)
                .map(str::to_string);
            if let Some(server_id) = server_id {
                tracing::debug!("[IdMap] {} -> {}", entry.temp_id, server_id);
                entry.server_id = Some(server_id.clone());
                learned.push((entry.temp_id.clone(), server_id));
            }
        }
        learned
    }

    /// Record an explicit mapping, creating the entry if needed
    pub fn insert(&mut self, temp_id: impl Into<String>, server_id: impl Into<String>, effect_id: Uuid) {
        let temp_id = temp_id.into();
        let entry = self.entries.entry(temp_id.clone()).or_insert_with(|| TempIdEntry {
            temp_id,
            typename: String::new(),
            path: String::new(),
            effect_id,
            server_id: None,
        });
        entry.server_id = Some(server_id.into());
    }

    /// Keep only entries still owned by a pending effect or mentioned in a pending payload
    pub fn prune<'a>(&mut self, pending: &HashSet<Uuid>, payloads: impl IntoIterator<Item = &'a Value>) {
        let payloads: Vec<&Value> = payloads.into_iter().collect();
        self.entries.retain(|temp_id, entry| {
            pending.contains(&entry.effect_id) || payloads.iter().any(|p| mentions(p, temp_id, 0))
        });
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
