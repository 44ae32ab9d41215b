//! Lazy-loading client for graph-structured JSON HTTP APIs.
//!
//! # Overview
//! Every resource in the remote graph has an id and lives at
//! `{base_url}/{id}`. `GraphClient` fetches resources and hands them back as
//! `Node`s; a node built from a partial payload (a summary inside a parent
//! response, or a `fields`-restricted fetch) loads its complete
//! representation the first time a caller asks for a field it lacks.
//!
//! # Design
//! - The network is an injected `Transport`. `UreqTransport` is provided;
//!   tests use closures that replay fixtures.
//! - `GraphClient` splits each operation into `build_*` (produces request)
//!   and `parse_*` (consumes response), so the I/O boundary is explicit.
//! - Decoded JSON is normalized into `Value`, a tagged tree whose identified
//!   objects are `Arc<Node>`s.
//! - Nodes hold a weak `ClientRef`, never the client itself.
//!
//! ```no_run
//! use lazygraph_core::{GetRequest, GraphClient};
//!
//! # fn main() -> Result<(), lazygraph_core::ApiError> {
//! let client = GraphClient::with_access_token("token");
//! let me = client.get_node("me")?;
//! let partner = me.get_field("significant_other")?;
//! if let Some(partner) = partner.as_node() {
//!     // `significant_other` arrived as a summary; this loads the rest.
//!     let _birthday = partner.get_field("birthday")?;
//! }
//! let _home = client.get(GetRequest::path("me/home"))?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod node;
pub mod value;

pub use client::{check_error, ClientRef, GetRequest, GraphClient, Params};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use node::Node;
pub use value::{normalize, Value};
