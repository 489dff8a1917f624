use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::runtime::ReactiveRuntime;
use crate::sync::read;

/// One position in a tracked projection.
///
/// A node keeps its identity for as long as reconciliation finds a matching
/// position for it; only its contents change. Its `id` is what observers depend on:
/// for a leaf it stands for the value, for a container for the set of children.
pub(crate) struct Node {
    pub(crate) id: usize,
    pub(crate) kind: RwLock<NodeKind>,
}

pub(crate) enum NodeKind {
    Leaf(Value),
    Object(BTreeMap<String, Arc<Node>>),
    Array(Vec<Arc<Node>>),
}

impl Node {
    pub(crate) fn build(runtime: &ReactiveRuntime, value: Value) -> Arc<Node> {
        Arc::new(Node {
            id: runtime.next_id(),
            kind: RwLock::new(NodeKind::build(runtime, value)),
        })
    }

    /// Deep copy of the node's value, tracking the node and every descendant.
    pub(crate) fn snapshot(&self, runtime: &ReactiveRuntime) -> Value {
        runtime.track_read(self.id);
        self.copy_value(Some(runtime))
    }

    /// Deep copy of the node's value without registering any dependency.
    pub(crate) fn value_untracked(&self) -> Value {
        self.copy_value(None)
    }

    fn copy_value(&self, runtime: Option<&ReactiveRuntime>) -> Value {
        let copy_child = |child: &Arc<Node>| match runtime {
            Some(runtime) => child.snapshot(runtime),
            None => child.value_untracked(),
        };
        let children = match &*read(&self.kind) {
            NodeKind::Leaf(value) => return value.clone(),
            NodeKind::Object(children) => Children::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), Arc::clone(child)))
                    .collect(),
            ),
            NodeKind::Array(children) => Children::Array(children.clone()),
        };
        match children {
            Children::Object(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(key, child)| (key, copy_child(&child)))
                    .collect::<Map<String, Value>>(),
            ),
            Children::Array(children) => Value::Array(children.iter().map(copy_child).collect()),
        }
    }

    /// Child at an object key or array index.
    pub(crate) fn child(&self, segment: &str) -> Option<Arc<Node>> {
        match &*read(&self.kind) {
            NodeKind::Leaf(_) => None,
            NodeKind::Object(children) => children.get(segment).cloned(),
            NodeKind::Array(children) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| children.get(index).cloned()),
        }
    }

    /// Number of children; zero for leaves.
    pub(crate) fn len(&self) -> usize {
        match &*read(&self.kind) {
            NodeKind::Leaf(_) => 0,
            NodeKind::Object(children) => children.len(),
            NodeKind::Array(children) => children.len(),
        }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        match &*read(&self.kind) {
            NodeKind::Object(children) => children.keys().cloned().collect(),
            NodeKind::Leaf(_) | NodeKind::Array(_) => Vec::new(),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(&*read(&self.kind), NodeKind::Leaf(_))
    }
}

enum Children {
    Object(Vec<(String, Arc<Node>)>),
    Array(Vec<Arc<Node>>),
}

impl NodeKind {
    pub(crate) fn build(runtime: &ReactiveRuntime, value: Value) -> Self {
        match value {
            Value::Object(map) => NodeKind::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Node::build(runtime, value)))
                    .collect(),
            ),
            Value::Array(items) => NodeKind::Array(
                items
                    .into_iter()
                    .map(|value| Node::build(runtime, value))
                    .collect(),
            ),
            leaf => NodeKind::Leaf(leaf),
        }
    }
}

/// Split a JSON pointer (`/a/0/b`) into unescaped segments.
///
/// Returns `None` for a non-empty pointer that does not start with `/`.
pub(crate) fn parse_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(
        rest.split('/')
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}
