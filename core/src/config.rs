//! Client configuration.
//!
//! Defaults point at the public Graph API endpoint. `from_env` lets hosts
//! override both values without code changes.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// Query parameter carrying the credential on every request.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

pub const BASE_URL_ENV: &str = "GRAPH_BASE_URL";
pub const ACCESS_TOKEN_ENV: &str = "GRAPH_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl ClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            access_token: access_token.into(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Read `GRAPH_BASE_URL` and `GRAPH_ACCESS_TOKEN`, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| default_base_url());
        let access_token = std::env::var(ACCESS_TOKEN_ENV).unwrap_or_default();
        Self {
            base_url,
            access_token,
        }
    }

    /// Base URL without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}
