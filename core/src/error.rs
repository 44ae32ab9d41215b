//! Error types for the graph API client.
//!
//! # Design
//! A single `ApiError` covers both local misuse (`InvalidRequest`,
//! `InvalidData`) and remote failures. `RemoteService` is reserved for
//! responses that carry the API's own `error` object, regardless of HTTP
//! status; any other non-2xx response lands in `HttpError` with the raw
//! status and body for debugging.

use thiserror::Error;

/// Errors returned by `GraphClient` operations and `Node` field access.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller supplied neither a node id nor a path.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Node data was not a JSON object or lacked an identifier.
    #[error("invalid node data: {0}")]
    InvalidData(String),

    /// The response carried an `error` object.
    #[error("remote service error: {message}")]
    RemoteService {
        message: String,
        kind: Option<String>,
        code: Option<i64>,
    },

    /// A field is absent after at most one refresh.
    #[error("node {id}{suffix} has no key '{key}'", suffix = kind_suffix(.kind))]
    MissingField {
        id: String,
        kind: Option<String>,
        key: String,
    },

    /// A refresh was required but the node is detached from any live client.
    #[error("node {id} has no live client to refresh through")]
    ClientGone { id: String },

    /// The injected transport could not complete the round trip.
    #[error("transport failed: {0}")]
    Transport(String),

    /// Non-2xx status without an `error` object in the body.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),
}

fn kind_suffix(kind: &Option<String>) -> String {
    kind.as_ref()
        .map(|k| format!(" of type '{k}'"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_kind_when_known() {
        let err = ApiError::MissingField {
            id: "42".to_string(),
            kind: Some("status".to_string()),
            key: "likes".to_string(),
        };
        assert_eq!(err.to_string(), "node 42 of type 'status' has no key 'likes'");
    }

    #[test]
    fn missing_field_without_kind() {
        let err = ApiError::MissingField {
            id: "42".to_string(),
            kind: None,
            key: "likes".to_string(),
        };
        assert_eq!(err.to_string(), "node 42 has no key 'likes'");
    }

    #[test]
    fn remote_service_message_is_verbatim() {
        let err = ApiError::RemoteService {
            message: "(#100) Invalid parameter".to_string(),
            kind: Some("OAuthException".to_string()),
            code: Some(100),
        };
        assert_eq!(err.to_string(), "remote service error: (#100) Invalid parameter");
    }
}
