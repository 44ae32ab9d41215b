//! Normalized JSON tree in which identified objects are lazy `Node`s.
//!
//! # Design
//! Responses are decoded into `serde_json::Value` first and then normalized
//! once: arrays element-wise, objects carrying an identifier into child
//! `Node`s, all other objects into plain `Value::Object`s. Nodes are held
//! behind `Arc`, so cloning a `Value` shares rather than copies them and a
//! refresh through any clone is visible through all of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::client::ClientRef;
use crate::error::ApiError;
use crate::node::Node;

/// Field name that identifies a remote resource.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Node(Arc<Node>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Arc<Node>> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Arc<Node>> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    /// Look up `key` in a plain object. Never touches the network; use
    /// `Node::get_field` for lazy lookups.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Element `index` of an array.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.as_array().and_then(|items| items.get(index))
    }

    /// Convert back to plain JSON. Nodes render as their currently known
    /// fields.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Node(node) => node.to_json(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Node(node) => node.serialize(serializer),
        }
    }
}

/// Identifier of a JSON object, if it has a usable one. Numeric ids are
/// rendered in decimal.
pub fn identifier(map: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    match map.get(ID_FIELD)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize decoded JSON, turning every identified object into a child
/// `Node` bound to `client`. Child nodes start out not fully fetched.
pub fn normalize(raw: serde_json::Value, client: &ClientRef) -> Result<Value, ApiError> {
    Ok(match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize(item, client))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            if identifier(&map).is_some() {
                Value::Node(Node::from_map(map, client.clone(), false)?)
            } else {
                Value::Object(normalize_map(map, client)?)
            }
        }
    })
}

pub(crate) fn normalize_map(
    map: serde_json::Map<String, serde_json::Value>,
    client: &ClientRef,
) -> Result<BTreeMap<String, Value>, ApiError> {
    map.into_iter()
        .map(|(k, v)| Ok((k, normalize(v, client)?)))
        .collect()
}
