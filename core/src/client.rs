//! Graph API client: request building, response parsing, and the round trip
//! through the injected transport.
//!
//! # Design
//! Each operation is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`; the
//! operation itself (`get`, `post`, `like`) only glues the two together with
//! one call to the `Transport`. The build/parse halves are pure and are what
//! the unit tests exercise.
//!
//! `GraphClient` is a cheap handle over shared state (config + transport).
//! Nodes keep a `ClientRef`, a weak handle to the same state, so they can
//! refresh themselves without keeping the client alive.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::config::{ClientConfig, ACCESS_TOKEN_PARAM};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::node::{Node, TYPE_FIELD};
use crate::value::{identifier, normalize, Value};

/// Request parameters as given by the caller, before sanitation.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Parameter restricting which fields the API returns.
pub const FIELDS_PARAM: &str = "fields";

/// Resource kinds that are commented on rather than posted to.
pub const CONTENT_KINDS: [&str; 3] = ["post", "status", "link"];

/// Target and parameters of a `GraphClient::get` call.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub id: Option<String>,
    /// Path below the base URL, or an absolute `http(s)://` URL such as a
    /// `paging.next` link. Takes precedence over `id`.
    pub path: Option<String>,
    pub params: Params,
}

impl GetRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Whether the caller restricted the returned fields, in which case the
    /// resulting node is only partially fetched.
    pub fn selects_fields(&self) -> bool {
        self.params
            .get(FIELDS_PARAM)
            .is_some_and(|fields| !fields.is_null())
    }
}

struct ClientInner {
    config: ClientConfig,
    transport: Box<dyn Transport>,
}

/// Synchronous client for a graph-structured JSON API.
#[derive(Clone)]
pub struct GraphClient {
    inner: Arc<ClientInner>,
}

/// Non-owning handle to a `GraphClient`, held by nodes.
#[derive(Clone, Default)]
pub struct ClientRef {
    inner: Weak<ClientInner>,
}

impl ClientRef {
    /// A handle bound to no client. Nodes holding it can never refresh.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<GraphClient> {
        self.inner.upgrade().map(|inner| GraphClient { inner })
    }

    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRef").field("live", &self.is_live()).finish()
    }
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.inner.config.base_url)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport: Box::new(transport),
            }),
        }
    }

    /// Client for the default endpoint over a `ureq` transport.
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self::new(ClientConfig::new(access_token), UreqTransport::new())
    }

    /// Client configured from `GRAPH_BASE_URL` / `GRAPH_ACCESS_TOKEN` over a
    /// `ureq` transport.
    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env(), UreqTransport::new())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn access_token(&self) -> &str {
        &self.inner.config.access_token
    }

    pub fn handle(&self) -> ClientRef {
        ClientRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Fetch a node or collection.
    ///
    /// Returns `Value::Node` when the response carries an `id`, otherwise
    /// the normalized response with any identified objects inside it turned
    /// into nodes.
    pub fn get(&self, request: GetRequest) -> Result<Value, ApiError> {
        let fetched = !request.selects_fields();
        let http = self.build_get(request)?;
        let response = self.round_trip(&http)?;
        self.parse_get(response, fetched)
    }

    /// Fetch a node by id and require the response to be a node.
    pub fn get_node(&self, id: &str) -> Result<Arc<Node>, ApiError> {
        self.get(GetRequest::node(id))?
            .into_node()
            .ok_or_else(|| ApiError::InvalidData(format!("response for {id} has no id")))
    }

    /// Publish against `node`: a comment on content kinds, a feed post on
    /// everything else.
    pub fn post(&self, node: &Node, params: Params) -> Result<Arc<Node>, ApiError> {
        let http = self.build_post(node, params)?;
        let response = self.round_trip(&http)?;
        self.parse_post(response)
    }

    /// Like `node`, or remove the like when `delete` is set.
    ///
    /// The API answers a successful (un)like with a bare `true`. Any other
    /// response is checked for an `error` object and otherwise returned
    /// unchanged, so only `true` confirms success.
    pub fn like(
        &self,
        node: &Node,
        params: Option<Params>,
        delete: bool,
    ) -> Result<serde_json::Value, ApiError> {
        let http = self.build_like(node, params, delete)?;
        let response = self.round_trip(&http)?;
        self.parse_like(response)
    }

    pub fn unlike(&self, node: &Node, params: Option<Params>) -> Result<serde_json::Value, ApiError> {
        self.like(node, params, true)
    }

    // -----------------------------------------------------------------------
    // Request building
    // -----------------------------------------------------------------------

    pub fn build_get(&self, request: GetRequest) -> Result<HttpRequest, ApiError> {
        let path = request.path.as_deref().filter(|p| !p.is_empty());
        let id = request.id.as_deref().filter(|i| !i.is_empty());
        let url = match (path, id) {
            (Some(path), _) => self.resolve_path(path),
            (None, Some(id)) => format!("{}/{id}", self.inner.config.endpoint()),
            (None, None) => {
                return Err(ApiError::InvalidRequest(
                    "either a node id or a path must be specified".to_string(),
                ))
            }
        };
        let mut http = HttpRequest::new(HttpMethod::Get, url);
        http.query = self.sanitize_params(request.params)?;
        Ok(http)
    }

    pub fn build_post(&self, node: &Node, params: Params) -> Result<HttpRequest, ApiError> {
        let edge = if is_content(node) { "comments" } else { "feed" };
        let url = format!("{}/{}/{edge}", self.inner.config.endpoint(), node.id());
        let mut http = HttpRequest::new(HttpMethod::Post, url);
        http.query = vec![(ACCESS_TOKEN_PARAM.to_string(), self.access_token().to_string())];
        http.form = self.sanitize_params(params)?;
        Ok(http)
    }

    /// DELETE carries no body, so an unlike sends its parameters in the
    /// query string instead of the form.
    pub fn build_like(
        &self,
        node: &Node,
        params: Option<Params>,
        delete: bool,
    ) -> Result<HttpRequest, ApiError> {
        let url = format!("{}/{}/likes", self.inner.config.endpoint(), node.id());
        let pairs = self.sanitize_params(params.unwrap_or_default())?;
        let http = if delete {
            let mut http = HttpRequest::new(HttpMethod::Delete, url);
            http.query = pairs;
            http
        } else {
            let mut http = HttpRequest::new(HttpMethod::Post, url);
            http.form = pairs;
            http
        };
        Ok(http)
    }

    /// Flatten parameters into wire pairs.
    ///
    /// Arrays and objects are sent as JSON text, strings as-is, numbers and
    /// booleans as their JSON literal; `null` entries are dropped. The access
    /// token is added unless the caller already supplied one.
    pub fn sanitize_params(&self, mut params: Params) -> Result<Vec<(String, String)>, ApiError> {
        if !params.contains_key(ACCESS_TOKEN_PARAM) {
            params.insert(
                ACCESS_TOKEN_PARAM.to_string(),
                serde_json::Value::String(self.access_token().to_string()),
            );
        }

        let mut pairs = Vec::with_capacity(params.len());
        for (key, value) in params {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                complex @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                    serde_json::to_string(&complex)
                        .map_err(|e| ApiError::SerializationError(e.to_string()))?
                }
            };
            pairs.push((key, text));
        }
        Ok(pairs)
    }

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.inner.config.endpoint(),
                path.trim_start_matches('/')
            )
        }
    }

    // -----------------------------------------------------------------------
    // Response parsing
    // -----------------------------------------------------------------------

    pub fn parse_get(&self, response: HttpResponse, fetched: bool) -> Result<Value, ApiError> {
        let data = decode(response)?;
        match data {
            serde_json::Value::Object(map) if identifier(&map).is_some() => {
                Ok(Value::Node(Node::from_map(map, self.handle(), fetched)?))
            }
            other => normalize(other, &self.handle()),
        }
    }

    pub fn parse_post(&self, response: HttpResponse) -> Result<Arc<Node>, ApiError> {
        let data = decode(response)?;
        Node::from_json(data, self.handle(), false)
    }

    pub fn parse_like(&self, response: HttpResponse) -> Result<serde_json::Value, ApiError> {
        let data = parse_body(&response)?;
        if data == serde_json::Value::Bool(true) {
            return Ok(data);
        }
        check_error(&data)?;
        check_status(&response)?;
        Ok(data)
    }

    fn round_trip(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = ?request.method, url = %request.url, "graph request");
        let response = self.inner.transport.execute(request)?;
        debug!(status = response.status, url = %request.url, "graph response");
        Ok(response)
    }
}

fn is_content(node: &Node) -> bool {
    node.peek(TYPE_FIELD)
        .as_ref()
        .and_then(Value::as_str)
        .is_some_and(|kind| CONTENT_KINDS.contains(&kind))
}

/// Decode a body, surfacing any `error` object before the status check.
fn decode(response: HttpResponse) -> Result<serde_json::Value, ApiError> {
    let data = parse_body(&response)?;
    check_error(&data)?;
    check_status(&response)?;
    Ok(data)
}

fn parse_body(response: &HttpResponse) -> Result<serde_json::Value, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| {
        if response.is_success() {
            ApiError::DeserializationError(e.to_string())
        } else {
            http_error(response)
        }
    })
}

fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(http_error(response))
    }
}

fn http_error(response: &HttpResponse) -> ApiError {
    ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    }
}

/// Fail with `RemoteService` if `data` carries an `error` object.
pub fn check_error(data: &serde_json::Value) -> Result<(), ApiError> {
    let Some(error) = data.get("error") else {
        return Ok(());
    };
    let message = match error.get("message") {
        Some(serde_json::Value::String(m)) => m.clone(),
        Some(other) => other.to_string(),
        None => error.as_str().map_or_else(|| error.to_string(), str::to_string),
    };
    let kind = error.get("type").and_then(serde_json::Value::as_str).map(str::to_string);
    let code = error.get("code").and_then(serde_json::Value::as_i64);
    warn!(?kind, ?code, %message, "graph API returned an error");
    Err(ApiError::RemoteService {
        message,
        kind,
        code,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const BASE_URL: &str = "http://localhost:3000";

    fn client() -> GraphClient {
        let transport = |_: &HttpRequest| -> Result<HttpResponse, ApiError> {
            Err(ApiError::Transport("offline".to_string()))
        };
        GraphClient::new(
            ClientConfig::new("access_token_blah").with_base_url(BASE_URL),
            transport,
        )
    }

    fn node(raw: serde_json::Value) -> Arc<Node> {
        Node::from_json(raw, ClientRef::detached(), true).unwrap()
    }

    fn params(raw: serde_json::Value) -> Params {
        match raw {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn build_get_requires_id_or_path() {
        let err = client().build_get(GetRequest::new()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let err = client()
            .build_get(GetRequest::new().param("bla", "bla"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn build_get_rejects_empty_id_and_path() {
        let err = client().build_get(GetRequest::node("")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let err = client().build_get(GetRequest::path("")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let req = client()
            .build_get(GetRequest::node("xyz").with_path(""))
            .unwrap();
        assert_eq!(req.url, "http://localhost:3000/xyz");
    }

    #[test]
    fn build_get_by_id() {
        let req = client().build_get(GetRequest::node("xyz").param("abc", "def")).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/xyz");
        assert_eq!(req.query_value("abc"), Some("def"));
        assert_eq!(req.query_value("access_token"), Some("access_token_blah"));
        assert!(req.form.is_empty());
    }

    #[test]
    fn absolute_url_wins_over_id() {
        let req = client()
            .build_get(GetRequest::node("12345").with_path("http://bleepbloop.com/xyz"))
            .unwrap();
        assert_eq!(req.url, "http://bleepbloop.com/xyz");
        assert_eq!(
            req.query,
            vec![("access_token".to_string(), "access_token_blah".to_string())]
        );
    }

    #[test]
    fn relative_path_joins_base_url() {
        let req = client().build_get(GetRequest::path("/me/home")).unwrap();
        assert_eq!(req.url, "http://localhost:3000/me/home");
    }

    #[test]
    fn fields_selector_marks_partial() {
        assert!(GetRequest::node("1").param("fields", "name").selects_fields());
        assert!(!GetRequest::node("1").selects_fields());
    }

    #[test]
    fn null_fields_selector_is_a_full_fetch() {
        let request = GetRequest::node("1").param("fields", serde_json::Value::Null);
        assert!(!request.selects_fields());

        let req = client().build_get(request).unwrap();
        assert_eq!(req.query_value("fields"), None);
    }

    #[test]
    fn sanitize_inserts_access_token() {
        let pairs = client().sanitize_params(Params::new()).unwrap();
        assert_eq!(
            pairs,
            vec![("access_token".to_string(), "access_token_blah".to_string())]
        );
    }

    #[test]
    fn sanitize_keeps_caller_token() {
        let pairs = client()
            .sanitize_params(params(json!({"access_token": "mine"})))
            .unwrap();
        assert_eq!(pairs, vec![("access_token".to_string(), "mine".to_string())]);
    }

    #[test]
    fn sanitize_only_jsonifies_arrays_and_objects() {
        let privacy = json!({"value": "CUSTOM", "networks": 1, "friends": "NO_FRIENDS"});
        let mut pairs = client()
            .sanitize_params(params(json!({
                "message": "abc",
                "privacy": privacy,
                "xyz": ["a", "b"],
                "limit": 25,
                "skip": null,
            })))
            .unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("access_token".to_string(), "access_token_blah".to_string()),
                ("limit".to_string(), "25".to_string()),
                ("message".to_string(), "abc".to_string()),
                ("privacy".to_string(), serde_json::to_string(&privacy).unwrap()),
                ("xyz".to_string(), r#"["a","b"]"#.to_string()),
            ]
        );
    }

    #[test]
    fn post_targets_feed_for_users() {
        let user = node(json!({"id": "1000", "name": "Someone"}));
        let req = client().build_post(&user, params(json!({"message": "hi"}))).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/1000/feed");
        assert_eq!(req.query_value("access_token"), Some("access_token_blah"));
        assert_eq!(req.form_value("message"), Some("hi"));
        assert_eq!(req.form_value("access_token"), Some("access_token_blah"));
    }

    #[test]
    fn post_targets_comments_for_content_kinds() {
        for kind in CONTENT_KINDS {
            let target = node(json!({"id": "55", "type": kind}));
            let req = client().build_post(&target, Params::new()).unwrap();
            assert_eq!(req.url, "http://localhost:3000/55/comments", "{kind}");
        }
    }

    #[test]
    fn post_targets_feed_for_other_kinds() {
        let page = node(json!({"id": "55", "type": "page"}));
        let req = client().build_post(&page, Params::new()).unwrap();
        assert_eq!(req.url, "http://localhost:3000/55/feed");
    }

    #[test]
    fn post_routing_does_not_refresh() {
        let partial = Node::from_json(json!({"id": "55"}), ClientRef::detached(), false).unwrap();
        let req = client().build_post(&partial, Params::new()).unwrap();
        assert_eq!(req.url, "http://localhost:3000/55/feed");
        assert!(!partial.is_fetched());
    }

    #[test]
    fn build_like_and_unlike() {
        let post = node(json!({"id": "77", "type": "post"}));
        let like = client().build_like(&post, None, false).unwrap();
        assert_eq!(like.method, HttpMethod::Post);
        assert_eq!(like.url, "http://localhost:3000/77/likes");
        assert_eq!(like.form_value("access_token"), Some("access_token_blah"));

        let unlike = client().build_like(&post, None, true).unwrap();
        assert_eq!(unlike.method, HttpMethod::Delete);
        assert_eq!(unlike.query_value("access_token"), Some("access_token_blah"));
        assert!(unlike.form.is_empty());
    }

    #[test]
    fn parse_get_wraps_identified_response() {
        let client = client();
        let value = client
            .parse_get(HttpResponse::new(200, r#"{"id":"1","name":"x"}"#), true)
            .unwrap();
        let node = value.as_node().unwrap();
        assert!(node.is_fetched());
        assert!(node.client().is_live());
    }

    #[test]
    fn parse_get_keeps_collections_as_containers() {
        let value = client()
            .parse_get(HttpResponse::new(200, r#"{"data":[{"id":"1"},{"id":"2"}]}"#), true)
            .unwrap();
        assert!(!value.is_node());
        assert!(value.get("data").unwrap().at(1).unwrap().is_node());
    }

    #[test]
    fn parse_get_surfaces_error_object_on_4xx() {
        let body = r#"{"error":{"message":"Unsupported get request.","type":"GraphMethodException","code":100}}"#;
        let err = client().parse_get(HttpResponse::new(400, body), true).unwrap_err();
        match err {
            ApiError::RemoteService { message, kind, code } => {
                assert_eq!(message, "Unsupported get request.");
                assert_eq!(kind.as_deref(), Some("GraphMethodException"));
                assert_eq!(code, Some(100));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_get_non_json_error_is_http_error() {
        let err = client()
            .parse_get(HttpResponse::new(502, "bad gateway"), true)
            .unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 502, .. }));
    }

    #[test]
    fn parse_get_bad_json() {
        let err = client()
            .parse_get(HttpResponse::new(200, "not json"), true)
            .unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_post_returns_partial_node() {
        let node = client()
            .parse_post(HttpResponse::new(200, r#"{"id":"1000_42"}"#))
            .unwrap();
        assert_eq!(node.id(), "1000_42");
        assert!(!node.is_fetched());
    }

    #[test]
    fn parse_like_true_is_success() {
        let value = client().parse_like(HttpResponse::new(200, "true")).unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn parse_like_passes_through_unrecognized_responses() {
        let value = client().parse_like(HttpResponse::new(200, "false")).unwrap();
        assert_eq!(value, json!(false));
        let value = client().parse_like(HttpResponse::new(200, "null")).unwrap();
        assert_eq!(value, json!(null));
    }

    #[test]
    fn parse_like_raises_error_object() {
        let err = client()
            .parse_like(HttpResponse::new(400, r#"{"error":{"message":"nope"}}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::RemoteService { ref message, .. } if message == "nope"));
    }

    #[test]
    fn check_error_accepts_bare_message_string() {
        let err = check_error(&json!({"error": "broken"})).unwrap_err();
        assert!(matches!(err, ApiError::RemoteService { ref message, .. } if message == "broken"));
        assert!(check_error(&json!({"id": "1"})).is_ok());
        assert!(check_error(&json!([1, 2])).is_ok());
    }

    #[test]
    fn handle_dies_with_client() {
        let client = client();
        let handle = client.handle();
        assert!(handle.is_live());
        drop(client);
        assert!(!handle.is_live());
        assert!(handle.upgrade().is_none());
    }
}
