//! OAuth2 token payloads and form bodies.
//!
//! The provider's token endpoint serves both the gateway's one-time
//! authorization-code exchange and the worker's recurring refresh. Responses
//! are kept verbatim: fields this crate doesn't interpret (`user_id`,
//! `scope`, `token_type`, ...) ride along in the flattened `extra` map and
//! end up stored on the task record unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A token payload as returned by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// The payload as a patch for a task record: every field of the
    /// response, verbatim, ready for a shallow merge.
    pub fn as_patch(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct with named fields always serializes to an object.
            _ => Map::new(),
        }
    }
}

/// Form body for a refresh-token grant.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
    pub redirect_uri: &'a str,
    pub expires_in: u64,
}

impl<'a> RefreshRequest<'a> {
    pub fn new(refresh_token: &'a str, redirect_uri: &'a str, expires_in: u64) -> Self {
        RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            redirect_uri,
            expires_in,
        }
    }
}

/// Form body for the one-time authorization-code exchange.
#[derive(Debug, Serialize)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub expires_in: u64,
}

impl<'a> ExchangeRequest<'a> {
    pub fn new(
        code: &'a str,
        client_id: &'a str,
        redirect_uri: &'a str,
        state: &'a str,
        expires_in: u64,
    ) -> Self {
        ExchangeRequest {
            code,
            grant_type: "authorization_code",
            client_id,
            redirect_uri,
            state,
            expires_in,
        }
    }
}
