use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// The user every access token acts as, also reachable as `me`.
pub const SEED_USER: &str = "1000";

const SEED_NODES: [&str; 5] = [
    include_str!("../../fixtures/1000.json"),
    include_str!("../../fixtures/2000.json"),
    include_str!("../../fixtures/status_fetched.json"),
    include_str!("../../fixtures/post_fetched.json"),
    include_str!("../../fixtures/link_fetched.json"),
];

type Params = HashMap<String, String>;

/// In-memory graph: nodes by id plus the edges the API exposes.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub nodes: HashMap<String, Value>,
    pub feeds: HashMap<String, Vec<String>>,
    pub comments: HashMap<String, Vec<String>>,
    pub likes: HashMap<String, BTreeSet<String>>,
}

impl Graph {
    /// Graph populated from the shared JSON fixtures. Every seeded node
    /// other than the two users is on the seed user's feed.
    pub fn seeded() -> Self {
        let mut graph = Graph::default();
        for raw in SEED_NODES {
            if let Ok(node) = serde_json::from_str::<Value>(raw) {
                graph.insert(node);
            }
        }
        let mut feed: Vec<String> = graph
            .nodes
            .keys()
            .filter(|id| id.starts_with(&format!("{SEED_USER}_")))
            .cloned()
            .collect();
        feed.sort();
        graph.feeds.insert(SEED_USER.to_string(), feed);
        graph
    }

    pub fn insert(&mut self, node: Value) {
        let Some(id) = node.get("id").and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        self.nodes.insert(id, node);
    }

    fn summaries(&self, ids: &[String]) -> Vec<Value> {
        ids.iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| select(node, &["message", "type"]))
            .collect()
    }
}

pub type Db = Arc<RwLock<Graph>>;

pub fn app() -> Router {
    app_with(Graph::seeded())
}

pub fn app_with(graph: Graph) -> Router {
    let db: Db = Arc::new(RwLock::new(graph));
    Router::new()
        .route("/{id}", get(get_node))
        .route(
            "/{id}/{edge}",
            get(list_edge).post(publish).delete(remove_like),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn graph_error(status: StatusCode, message: &str, kind: &str, code: u32) -> Response {
    let body = json!({"error": {"message": message, "type": kind, "code": code}});
    (status, Json(body)).into_response()
}

fn unauthorized() -> Response {
    graph_error(
        StatusCode::BAD_REQUEST,
        "An active access token must be used to query information about the current user.",
        "OAuthException",
        2500,
    )
}

fn not_found() -> Response {
    graph_error(
        StatusCode::NOT_FOUND,
        "Unsupported get request.",
        "GraphMethodException",
        100,
    )
}

fn unsupported() -> Response {
    graph_error(
        StatusCode::BAD_REQUEST,
        "Unsupported get request.",
        "GraphMethodException",
        100,
    )
}

fn has_token(sources: &[&Params]) -> bool {
    sources
        .iter()
        .any(|p| p.get("access_token").is_some_and(|t| !t.is_empty()))
}

fn resolve(id: &str) -> &str {
    if id == "me" {
        SEED_USER
    } else {
        id
    }
}

/// Copy of `node` keeping `id` and the requested `fields`.
fn select(node: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    if let Some(obj) = node.as_object() {
        for (key, value) in obj {
            if key == "id" || fields.contains(&key.as_str()) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

async fn get_node(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    if !has_token(&[&params]) {
        return unauthorized();
    }
    let id = resolve(&id);
    debug!(%id, "get node");
    let graph = db.read().await;
    let Some(node) = graph.nodes.get(id) else {
        return not_found();
    };
    match params.get("fields") {
        Some(fields) => {
            let fields: Vec<&str> = fields.split(',').map(str::trim).collect();
            Json(select(node, &fields)).into_response()
        }
        None => Json(node.clone()).into_response(),
    }
}

async fn list_edge(
    State(db): State<Db>,
    Path((id, edge)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Response {
    if !has_token(&[&params]) {
        return unauthorized();
    }
    let id = resolve(&id);
    let graph = db.read().await;
    if !graph.nodes.contains_key(id) {
        return not_found();
    }
    let empty = Vec::new();
    let data = match edge.as_str() {
        "feed" | "home" => graph.summaries(graph.feeds.get(id).unwrap_or(&empty)),
        "comments" => graph.summaries(graph.comments.get(id).unwrap_or(&empty)),
        "likes" => graph
            .likes
            .get(id)
            .map(|likers| likers.iter().map(|l| json!({"id": l})).collect())
            .unwrap_or_default(),
        _ => return unsupported(),
    };
    Json(json!({"data": data})).into_response()
}

async fn publish(
    State(db): State<Db>,
    Path((id, edge)): Path<(String, String)>,
    Query(query): Query<Params>,
    Form(form): Form<Params>,
) -> Response {
    if !has_token(&[&query, &form]) {
        return unauthorized();
    }
    let id = resolve(&id).to_string();
    let mut graph = db.write().await;
    if !graph.nodes.contains_key(&id) {
        return not_found();
    }

    let kind = match edge.as_str() {
        "likes" => {
            graph
                .likes
                .entry(id)
                .or_default()
                .insert(SEED_USER.to_string());
            return Json(true).into_response();
        }
        "feed" => "status",
        "comments" => "comment",
        _ => return unsupported(),
    };

    let new_id = format!("{id}_{}", Uuid::new_v4().simple());
    let mut node = Map::new();
    node.insert("id".to_string(), json!(new_id));
    node.insert("type".to_string(), json!(kind));
    node.insert("from".to_string(), json!({"id": SEED_USER}));
    for (key, value) in form {
        if key != "access_token" {
            node.insert(key, Value::String(value));
        }
    }
    debug!(%id, %new_id, kind, "published");
    graph.insert(Value::Object(node));
    let edge_list = if kind == "comment" {
        &mut graph.comments
    } else {
        &mut graph.feeds
    };
    edge_list.entry(id).or_default().push(new_id.clone());

    Json(json!({"id": new_id})).into_response()
}

async fn remove_like(
    State(db): State<Db>,
    Path((id, edge)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Response {
    if !has_token(&[&params]) {
        return unauthorized();
    }
    if edge != "likes" {
        return unsupported();
    }
    let id = resolve(&id);
    let mut graph = db.write().await;
    if !graph.nodes.contains_key(id) {
        return not_found();
    }
    if let Some(likers) = graph.likes.get_mut(id) {
        likers.remove(SEED_USER);
    }
    Json(true).into_response()
}
