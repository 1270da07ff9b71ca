//! # State Nodes
//!
//! The state tree is built from `StateNode`s: one per module, nested
//! under their parent by path segment.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  root StateNode                                                         │
//! │  ├── fields:   nome = "Maria", sobrenome = "Silva"                      │
//! │  └── children:                                                          │
//! │      ├── carrinho   StateNode { fields: items = [] }                    │
//! │      └── parametros StateNode { fields: currencyCode = "BRL", ... }     │
//! │                                                                         │
//! │  Serialized (to_value):                                                 │
//! │  { "nome": "Maria", "sobrenome": "Silva",                               │
//! │    "carrinho": { "items": [] }, "parametros": { ... } }                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Discipline
//! Fields are writable through `&mut StateNode`, which only a mutation ever
//! receives. Child nodes belong to nested modules and are only mutably
//! reachable inside this crate, so a parent mutation cannot reach into a
//! child module's state.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::path::ModulePath;

/// One module's state: plain JSON fields plus nested module nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateNode {
    fields: Map<String, Value>,
    children: BTreeMap<String, StateNode>,
}

impl StateNode {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node from a JSON object.
    ///
    /// ## Returns
    /// - `Err(StoreError::InvalidState)` if `value` is not an object
    ///   (`null` is accepted as an empty node)
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            Value::Null => Ok(Self::new()),
            other => Err(StoreError::InvalidState(format!(
                "module state must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        StateNode {
            fields,
            children: BTreeMap::new(),
        }
    }

    // =========================================================================
    // Field Access
    // =========================================================================

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    /// Deserializes a field into `T`. `Ok(None)` if the field is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Number of plain fields (child modules not counted).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.children.is_empty()
    }

    // =========================================================================
    // Field Writes (reachable only through a mutation's `&mut StateNode`)
    // =========================================================================

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Mutable access to an array field, creating an empty array if the
    /// field is missing or holds something else.
    pub fn array_mut(&mut self, key: &str) -> &mut Vec<Value> {
        let slot = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items,
            _ => unreachable!("slot was just made an array"),
        }
    }

    /// Sets a field, returning the previous value.
    ///
    /// A key owned by a nested module is left untouched: child state only
    /// changes through the child's own mutations.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if self.children.contains_key(&key) {
            warn!(key = %key, "Ignoring write to a key owned by a nested module");
            return None;
        }
        self.fields.insert(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    // =========================================================================
    // Child Nodes
    // =========================================================================

    pub fn child(&self, name: &str) -> Option<&StateNode> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &StateNode)> {
        self.children.iter()
    }

    /// Walks down the tree following `path`.
    pub fn node_at(&self, path: &ModulePath) -> Option<&StateNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    pub(crate) fn node_at_mut(&mut self, path: &ModulePath) -> Option<&mut StateNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.children.get_mut(segment))
    }

    pub(crate) fn insert_child(&mut self, name: String, node: StateNode) -> Option<StateNode> {
        self.children.insert(name, node)
    }

    pub(crate) fn remove_child(&mut self, name: &str) -> Option<StateNode> {
        self.children.remove(name)
    }

    /// Replaces this node's fields, keeping its children. Fields named like
    /// a child module are dropped.
    pub(crate) fn replace_fields(&mut self, mut fields: Map<String, Value>) {
        let children = &self.children;
        fields.retain(|key, _| {
            let owned_by_child = children.contains_key(key);
            if owned_by_child {
                warn!(key = %key, "Dropping field that shadows a nested module");
            }
            !owned_by_child
        });
        self.fields = fields;
    }

    pub(crate) fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Clone of this node without its children (the part a mutation owns).
    pub(crate) fn local_snapshot(&self) -> StateNode {
        StateNode::from_map(self.fields.clone())
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Flattens the node and its children into one JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        for (name, child) in &self.children {
            map.insert(name.clone(), child.to_value());
        }
        Value::Object(map)
    }
}

impl From<Map<String, Value>> for StateNode {
    fn from(fields: Map<String, Value>) -> Self {
        StateNode::from_map(fields)
    }
}

impl Serialize for StateNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.children.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        for (name, child) in &self.children {
            map.serialize_entry(name, child)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StateNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(StateNode::from_map(fields))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
