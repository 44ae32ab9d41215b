//! Lazy-loading representation of one remote resource.
//!
//! # Design
//! A `Node` starts from whatever JSON the API happened to return for it: a
//! full object, or a summary embedded in a parent response. `get_field`
//! serves known fields directly. On the first miss of a not-yet-fetched node
//! it refreshes once through the client and retries; after that the node is
//! marked fetched and further misses fail immediately, even if the field
//! that prompted the refresh never appeared.
//!
//! The field map and the fetched flag live behind a per-node mutex, and the
//! miss-refresh-retry sequence runs while holding it, so two threads missing
//! on the same node issue a single refresh. The lock stays held for the
//! whole blocking round trip, so `peek`, `kind`, `Display` and post routing
//! on that node (and formatting of any parent) wait until the refresh ends.
//! A parent's lock may be held while a child's is taken. Nodes form a tree,
//! so the ordering is always parent before child.
//!
//! The node keeps only a weak `ClientRef`. Dropping the last `GraphClient`
//! does not invalidate nodes; it only makes further refreshes fail with
//! `ApiError::ClientGone`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::client::{ClientRef, GetRequest};
use crate::error::ApiError;
use crate::value::{identifier, normalize_map, Value};

/// Field naming the resource kind, used in diagnostics and to pick a
/// publish edge.
pub const TYPE_FIELD: &str = "type";

pub struct Node {
    id: String,
    client: ClientRef,
    state: Mutex<NodeState>,
}

struct NodeState {
    fields: BTreeMap<String, Value>,
    fetched: bool,
}

impl Node {
    /// Build a node from decoded JSON. Nested identified objects become child
    /// nodes sharing `client`.
    pub fn from_json(
        raw: serde_json::Value,
        client: ClientRef,
        fetched: bool,
    ) -> Result<Arc<Node>, ApiError> {
        match raw {
            serde_json::Value::Object(map) => Self::from_map(map, client, fetched),
            other => Err(ApiError::InvalidData(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Build a node from JSON text.
    pub fn from_json_str(text: &str, client: ClientRef, fetched: bool) -> Result<Arc<Node>, ApiError> {
        let raw = serde_json::from_str(text).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        Self::from_json(raw, client, fetched)
    }

    pub(crate) fn from_map(
        map: serde_json::Map<String, serde_json::Value>,
        client: ClientRef,
        fetched: bool,
    ) -> Result<Arc<Node>, ApiError> {
        let id = identifier(&map).ok_or_else(|| {
            ApiError::InvalidData(format!(
                "all nodes must have an id: {}",
                serde_json::Value::Object(map.clone())
            ))
        })?;
        let fields = normalize_map(map, &client)?;
        Ok(Arc::new(Node {
            id,
            client,
            state: Mutex::new(NodeState { fields, fetched }),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resource kind from the locally known `type` field.
    pub fn kind(&self) -> Option<String> {
        kind_of(&self.lock().fields)
    }

    pub fn is_fetched(&self) -> bool {
        self.lock().fetched
    }

    pub fn client(&self) -> &ClientRef {
        &self.client
    }

    /// Locally known value of `key`. Never refreshes.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.lock().fields.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().fields.contains_key(key)
    }

    /// Locally known field names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().fields.keys().cloned().collect()
    }

    /// Value of `key`, refreshing at most once if the node has not been
    /// fully fetched yet.
    ///
    /// A failed refresh leaves the node unfetched and returns the refresh
    /// error.
    pub fn get_field(&self, key: &str) -> Result<Value, ApiError> {
        let mut state = self.lock();
        if let Some(value) = state.fields.get(key) {
            return Ok(value.clone());
        }

        if !state.fetched {
            debug!(id = %self.id, key, "field miss on partial node, refreshing");
            state.fields = self.fetch_fields()?;
            state.fetched = true;
            if let Some(value) = state.fields.get(key) {
                return Ok(value.clone());
            }
        }

        Err(ApiError::MissingField {
            id: self.id.clone(),
            kind: kind_of(&state.fields),
            key: key.to_string(),
        })
    }

    /// Replace all fields with the complete remote representation.
    pub fn refresh(&self) -> Result<(), ApiError> {
        let fields = self.fetch_fields()?;
        let mut state = self.lock();
        state.fields = fields;
        state.fetched = true;
        Ok(())
    }

    /// Locally known fields as plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let state = self.lock();
        serde_json::Value::Object(
            state
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn fetch_fields(&self) -> Result<BTreeMap<String, Value>, ApiError> {
        let client = self.client.upgrade().ok_or_else(|| ApiError::ClientGone {
            id: self.id.clone(),
        })?;
        let full = client
            .get(GetRequest::node(&self.id))?
            .into_node()
            .ok_or_else(|| {
                ApiError::InvalidData(format!("refresh of node {} returned no id", self.id))
            })?;
        let fields = std::mem::take(&mut full.lock().fields);
        Ok(fields)
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn kind_of(fields: &BTreeMap<String, Value>) -> Option<String> {
    fields
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("fetched", &state.fetched)
            .field("fields", &state.fields)
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.lock();
        let mut map = serializer.serialize_map(Some(state.fields.len()))?;
        for (k, v) in &state.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
