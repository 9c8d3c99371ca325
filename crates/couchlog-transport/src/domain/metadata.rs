//! Log metadata values and cycle removal
//!
//! Metadata is an arbitrary structured value attached to a log event. Unlike
//! `serde_json::Value` it can alias nodes through [`SharedMetadata`], which
//! makes self-referencing structures expressible. [`Metadata::decycle`] turns
//! any such graph into a plain, acyclic JSON value before it is persisted.
//!
//! Repeated nodes are replaced by a reference object pointing at the path of
//! their first occurrence:
//!
//! ```text
//! root = { "name": "a", "self": <root> }
//!
//! decycle(root) == { "name": "a", "self": { "$ref": "$" } }
//! ```
//!
//! Paths start at `$` and append `["key"]` for object members and `[i]` for
//! array items.

use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Key of the reference object that replaces a repeated node.
pub const REF_KEY: &str = "$ref";

/// Path of the metadata root.
pub const ROOT_PATH: &str = "$";

/// Structured log metadata.
#[derive(Debug, Clone, Default)]
pub enum Metadata {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Metadata>),
    Object(BTreeMap<String, Metadata>),
    /// A node that may be referenced from several places, including itself.
    Shared(SharedMetadata),
}

/// An aliasable metadata node.
///
/// Clones share the same node. Cyclic graphs keep themselves alive; call
/// [`SharedMetadata::clear`] to release one when it is no longer needed.
#[derive(Clone, Default)]
pub struct SharedMetadata(Arc<RwLock<Metadata>>);

impl SharedMetadata {
    pub fn new(value: Metadata) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Replace the node's value.
    pub fn set(&self, value: Metadata) {
        *self.0.write() = value;
    }

    /// Insert a member, turning the node into an object if it is not one.
    pub fn insert(&self, key: impl Into<String>, value: Metadata) {
        let mut node = self.0.write();
        if !matches!(*node, Metadata::Object(_)) {
            *node = Metadata::Object(BTreeMap::new());
        }
        if let Metadata::Object(map) = &mut *node {
            map.insert(key.into(), value);
        }
    }

    /// Append an item, turning the node into an array if it is not one.
    pub fn push(&self, value: Metadata) {
        let mut node = self.0.write();
        if !matches!(*node, Metadata::Array(_)) {
            *node = Metadata::Array(Vec::new());
        }
        if let Metadata::Array(items) = &mut *node {
            items.push(value);
        }
    }

    /// Drop the node's contents, breaking any cycle through it.
    pub fn clear(&self) {
        self.set(Metadata::Null);
    }

    /// Identity of the node, shared by all clones.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &SharedMetadata) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedMetadata {
    // The node may contain itself, so only its identity is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedMetadata({:#x})", self.id())
    }
}

impl Metadata {
    /// An empty object.
    pub fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Build an object from key/value pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Metadata)>,
    {
        Self::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wrap the value in a shared node and return a handle to it.
    pub fn into_shared(self) -> SharedMetadata {
        SharedMetadata::new(self)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Produce an acyclic JSON snapshot of the value.
    pub fn decycle(&self) -> Value {
        let mut seen = HashMap::new();
        decycle_value(self, ROOT_PATH.to_string(), &mut seen)
    }
}

fn decycle_value(value: &Metadata, path: String, seen: &mut HashMap<usize, String>) -> Value {
    match value {
        Metadata::Null => Value::Null,
        Metadata::Bool(b) => Value::Bool(*b),
        Metadata::Number(n) => Value::Number(n.clone()),
        Metadata::String(s) => Value::String(s.clone()),
        Metadata::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decycle_value(item, format!("{path}[{i}]"), seen))
                .collect(),
        ),
        Metadata::Object(members) => {
            let mut map = Map::with_capacity(members.len());
            for (key, member) in members {
                let member_path = format!("{path}[{}]", Value::String(key.clone()));
                map.insert(key.clone(), decycle_value(member, member_path, seen));
            }
            Value::Object(map)
        }
        Metadata::Shared(node) => {
            // Checked before locking: a node on the current path is never
            // locked twice.
            if let Some(first) = seen.get(&node.id()) {
                let mut reference = Map::new();
                reference.insert(REF_KEY.to_string(), Value::String(first.clone()));
                return Value::Object(reference);
            }
            seen.insert(node.id(), path.clone());
            let inner = node.0.read();
            decycle_value(&inner, path, seen)
        }
    }
}

impl From<Value> for Metadata {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Metadata {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Metadata {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Metadata {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Metadata {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<SharedMetadata> for Metadata {
    fn from(node: SharedMetadata) -> Self {
        Self::Shared(node)
    }
}
