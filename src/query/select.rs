//! Composition of several sub-path selections into one document.
//!
//! Every selection is resolved and rendered independently and concurrently.
//! The results are then merged one by one, most specific path first: each
//! selection gets a nested mapping per path segment it consumed and its
//! rendering is overlaid at the innermost one. A shallower selection that
//! lands on a key already written by a deeper one replaces it, which is safe
//! because the ancestor's rendering already contains the descendant.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Map, Value, json};

use super::RequestContext;
use crate::tree::StatusNode;
use crate::{Error, Result};

/// One resolved and rendered selection.
#[derive(Debug, Clone, PartialEq)]
struct Branch {
    keys: Vec<String>,
    value: Value,
}

/// Marker placed in the slot of a selection that does not address data.
pub fn not_available() -> Value {
    json!({ "error": "Not available" })
}

/// Split selections into segments and order them most specific first.
///
/// Surrounding separators are stripped; an empty selection addresses the
/// base node itself. Paths of equal depth keep their input order.
pub fn normalize(selections: &[String]) -> Vec<Vec<String>> {
    let mut paths: Vec<Vec<String>> = selections
        .iter()
        .map(|selection| {
            selection
                .trim_matches('/')
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        })
        .collect();
    paths.sort_by(|a: &Vec<String>, b: &Vec<String>| b.len().cmp(&a.len()));
    paths
}

/// Compose `selections` below `base` into one document.
pub async fn compose(
    base: &Arc<StatusNode>,
    selections: &[String],
    ctx: &RequestContext<'_>,
) -> Result<Value> {
    if selections.is_empty() {
        return base.render(ctx).await;
    }
    let paths = normalize(selections);
    let branches = try_join_all(paths.iter().map(|path| select_branch(base, path, ctx)))
        .await
        .map_err(|e| Error::aggregate("selection", e))?;

    let mut document = Value::Object(Map::new());
    for branch in branches {
        merge(&mut document, &branch.keys, branch.value);
    }
    Ok(document)
}

/// Walk one selection from `base`, recording the segments consumed.
///
/// Walking stops at a node that cannot be descended into. A segment that
/// addresses nothing still gets its key, holding the "not available" marker.
async fn select_branch(
    base: &Arc<StatusNode>,
    path: &[String],
    ctx: &RequestContext<'_>,
) -> Result<Branch> {
    let mut node = Arc::clone(base);
    let mut keys = Vec::with_capacity(path.len());

    for segment in path {
        if !node.is_descendable() {
            break;
        }
        keys.push(segment.clone());
        match node.child_for(segment, ctx).await {
            Ok(Some(child)) => node = child,
            Ok(None) => return Ok(unavailable(keys)),
            Err(e) if e.is_not_found() => return Ok(unavailable(keys)),
            Err(e) => return Err(e),
        }
    }

    if !node.is_data() {
        return Ok(unavailable(keys));
    }
    let value = node.render(ctx).await?;
    Ok(Branch { keys, value })
}

fn unavailable(keys: Vec<String>) -> Branch {
    tracing::debug!(path = %keys.join("/"), "selection not available");
    Branch {
        keys,
        value: not_available(),
    }
}

/// Overlay `value` at the nested mapping addressed by `keys`.
///
/// Mappings are overlaid key by key; any other value replaces the slot.
fn merge(document: &mut Value, keys: &[String], value: Value) {
    let mut slot = document;
    for key in keys {
        slot = child_slot(slot, key);
    }
    match (slot, value) {
        (Value::Object(existing), Value::Object(rendered)) => {
            for (key, value) in rendered {
                existing.insert(key, value);
            }
        }
        (slot, value) => *slot = value,
    }
}

fn child_slot<'a>(slot: &'a mut Value, key: &str) -> &'a mut Value {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        _ => unreachable!("slot was just made a mapping"),
    }
}
