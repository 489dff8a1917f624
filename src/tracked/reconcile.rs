use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::node::{Node, NodeKind};
use crate::runtime::ReactiveRuntime;
use crate::sync::{read, write};

/// How new data is merged into an existing tracked projection.
///
/// # Examples
///
/// ```
/// use tincan_bind::ReconcileOptions;
///
/// let options = ReconcileOptions::default().with_key("uuid").with_merge(true);
/// assert_eq!(options.key.as_deref(), Some("uuid"));
/// assert!(options.merge);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Field used to match array items across updates. Items with equal keys keep
    /// their identity even when they move.
    pub key: Option<String>,
    /// Reconcile unkeyed arrays index by index instead of replacing items that
    /// differ.
    pub merge: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            key: Some("id".to_string()),
            merge: false,
        }
    }
}

impl ReconcileOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn without_key(mut self) -> Self {
        self.key = None;
        self
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Nodes whose contents changed during one reconciliation, in visit order.
pub(crate) type Changed = Vec<usize>;

/// Merge `next` into `node`, recording every node whose observable value changed.
pub(crate) fn reconcile_node(
    runtime: &ReactiveRuntime,
    options: &ReconcileOptions,
    node: &Node,
    next: Value,
    changed: &mut Changed,
) {
    // Children still to visit; recursed into after this node's lock is released
    let pending = {
        let mut kind = write(&node.kind);
        match (&mut *kind, next) {
            (NodeKind::Leaf(current), next) if !is_container(&next) => {
                if *current != next {
                    *current = next;
                    changed.push(node.id);
                }
                Vec::new()
            }
            (NodeKind::Object(children), Value::Object(next)) => {
                let (pending, shape_changed) = reconcile_object(runtime, children, next);
                if shape_changed {
                    changed.push(node.id);
                }
                pending
            }
            (NodeKind::Array(children), Value::Array(next)) => {
                let (pending, shape_changed) = reconcile_array(runtime, options, children, next);
                if shape_changed {
                    changed.push(node.id);
                }
                pending
            }
            (current, next) => {
                *current = NodeKind::build(runtime, next);
                changed.push(node.id);
                Vec::new()
            }
        }
    };

    for (child, value) in pending {
        reconcile_node(runtime, options, &child, value, changed);
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

type Pending = Vec<(Arc<Node>, Value)>;

fn reconcile_object(
    runtime: &ReactiveRuntime,
    children: &mut BTreeMap<String, Arc<Node>>,
    next: Map<String, Value>,
) -> (Pending, bool) {
    let before = children.len();
    children.retain(|key, _| next.contains_key(key));
    let mut shape_changed = children.len() != before;

    let mut pending = Vec::new();
    for (key, value) in next {
        match children.get(&key) {
            Some(child) => pending.push((Arc::clone(child), value)),
            None => {
                children.insert(key, Node::build(runtime, value));
                shape_changed = true;
            }
        }
    }
    (pending, shape_changed)
}

fn reconcile_array(
    runtime: &ReactiveRuntime,
    options: &ReconcileOptions,
    children: &mut Vec<Arc<Node>>,
    next: Vec<Value>,
) -> (Pending, bool) {
    let key = options.key.as_deref();
    let first_is_keyed = match (key, children.first()) {
        (Some(key), Some(first)) => key_of_node(first, key).is_some(),
        _ => false,
    };

    if options.merge && !first_is_keyed {
        return merge_array(runtime, children, next);
    }

    let mut by_key: HashMap<String, usize> = HashMap::new();
    if let Some(key) = key {
        for (index, child) in children.iter().enumerate() {
            if let Some(item_key) = key_of_node(child, key) {
                by_key.entry(item_key).or_insert(index);
            }
        }
    }

    let mut used = vec![false; children.len()];
    let mut pending = Vec::new();
    let mut reordered = Vec::with_capacity(next.len());
    for (index, value) in next.into_iter().enumerate() {
        let keyed_match = key
            .and_then(|key| key_of_value(&value, key))
            .and_then(|item_key| by_key.get(&item_key).copied())
            .filter(|&old| !used[old]);
        let positional_match = || {
            (index < children.len() && !used[index] && children[index].value_untracked() == value)
                .then_some(index)
        };

        match keyed_match.or_else(positional_match) {
            Some(old) => {
                used[old] = true;
                let child = Arc::clone(&children[old]);
                reordered.push(Arc::clone(&child));
                pending.push((child, value));
            }
            None => reordered.push(Node::build(runtime, value)),
        }
    }

    let shape_changed = reordered.len() != children.len()
        || reordered
            .iter()
            .zip(children.iter())
            .any(|(new, old)| !Arc::ptr_eq(new, old));
    *children = reordered;
    (pending, shape_changed)
}

fn merge_array(
    runtime: &ReactiveRuntime,
    children: &mut Vec<Arc<Node>>,
    next: Vec<Value>,
) -> (Pending, bool) {
    let before = children.len();
    let len = next.len();
    let mut pending = Vec::new();
    for (index, value) in next.into_iter().enumerate() {
        if index < before {
            pending.push((Arc::clone(&children[index]), value));
        } else {
            children.push(Node::build(runtime, value));
        }
    }
    children.truncate(len);
    (pending, len != before)
}

fn key_of_value(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(key_string)
}

fn key_of_node(node: &Node, key: &str) -> Option<String> {
    let child = match &*read(&node.kind) {
        NodeKind::Object(children) => children.get(key).cloned()?,
        NodeKind::Leaf(_) | NodeKind::Array(_) => return None,
    };
    key_string(&child.value_untracked())
}

fn key_string(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| value.to_string())
}
