//! Hosted backend client (PostgREST dialect).
//!
//! Each call is one HTTP round trip against `/rest/v1/<table>`, authenticated
//! with the project's anon key plus the signed-in user's access token when a
//! session exists. The helpers at the bottom are shared with the auth and
//! object-storage clients.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{validate_column, Backend, Query, Table};
use crate::error::{PosError, PosResult};

/// Default timeout for backend requests (30 seconds).
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer token of the current session, shared between the auth client that
/// writes it and the table/storage clients that read it.
#[derive(Default)]
pub struct AccessToken {
    inner: RwLock<Option<Zeroizing<String>>>,
}

impl AccessToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = token.map(Zeroizing::new),
            Err(e) => warn!("access token lock poisoned: {e}"),
        }
    }

    pub fn get(&self) -> Option<Zeroizing<String>> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: Zeroizing<String>,
    token: Arc<AccessToken>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str, token: Arc<AccessToken>) -> PosResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: normalize_base_url(base_url),
            anon_key: Zeroizing::new(anon_key.trim().to_string()),
            token,
        })
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table.as_str());
        authorized(
            self.client.request(method, url),
            &self.anon_key,
            self.token.get().as_deref().map(String::as_str),
        )
    }

    async fn send(&self, req: RequestBuilder) -> PosResult<Value> {
        let resp = req
            .send()
            .await
            .map_err(|e| PosError::Http(friendly_error(&self.base_url, &e)))?;
        read_json_response(resp).await
    }
}

fn rows_of(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, table: Table, query: &Query) -> PosResult<Vec<Value>> {
        let params = query_params(query)?;
        debug!(table = table.as_str(), "rest select");
        let req = self.request(Method::GET, table).query(&params);
        Ok(rows_of(self.send(req).await?))
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> PosResult<Vec<Value>> {
        let req = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&Value::Array(rows));
        Ok(rows_of(self.send(req).await?))
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Value>,
        on_conflict: &str,
    ) -> PosResult<Vec<Value>> {
        validate_column(on_conflict)?;
        let req = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&Value::Array(rows));
        Ok(rows_of(self.send(req).await?))
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> PosResult<Vec<Value>> {
        let params = query_params(query)?;
        let req = self
            .request(Method::PATCH, table)
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&patch);
        Ok(rows_of(self.send(req).await?))
    }

    async fn delete(&self, table: Table, query: &Query) -> PosResult<usize> {
        let params = query_params(query)?;
        let req = self
            .request(Method::DELETE, table)
            .query(&params)
            .header("Prefer", "return=representation");
        Ok(rows_of(self.send(req).await?).len())
    }
}

// ---------------------------------------------------------------------------
// Query encoding
// ---------------------------------------------------------------------------

fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode a [`Query`] as PostgREST query-string pairs.
pub(crate) fn query_params(query: &Query) -> PosResult<Vec<(String, String)>> {
    query.validate()?;
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|f| {
            let op = if f.value.is_null() {
                "is.null".to_string()
            } else {
                format!("eq.{}", filter_literal(&f.value))
            };
            (f.column.clone(), op)
        })
        .collect();
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    Ok(params)
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

pub(crate) fn build_client() -> PosResult<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| PosError::Http(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn authorized(req: RequestBuilder, anon_key: &str, bearer: Option<&str>) -> RequestBuilder {
    req.header("apikey", anon_key)
        .header("Authorization", format!("Bearer {}", bearer.unwrap_or(anon_key)))
}

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Convert a `reqwest::Error` into a user-friendly message.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session is invalid or expired".to_string(),
        403 => "Not allowed to access this data".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Pick the backend's own message out of an error body, falling back to a
/// status-based description. Backend messages are surfaced verbatim.
pub(crate) fn backend_message(status: StatusCode, body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        for key in ["message", "error_description", "msg", "error"] {
            if let Some(msg) = json.get(key).and_then(Value::as_str) {
                let trimmed = msg.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }
    let trimmed = body_text.trim();
    if trimmed.is_empty() {
        status_error(status)
    } else {
        format!("{} (HTTP {}): {}", status_error(status), status.as_u16(), trimmed)
    }
}

/// Read a response as JSON, mapping non-success statuses to
/// [`PosError::Backend`] (or `NotAuthenticated` for 401).
pub(crate) async fn read_json_response(resp: Response) -> PosResult<Value> {
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let message = backend_message(status, &body_text);
        warn!(status = status.as_u16(), error = %message, "backend request failed");
        if status == StatusCode::UNAUTHORIZED && body_text.trim().is_empty() {
            return Err(PosError::NotAuthenticated);
        }
        return Err(PosError::Backend(message));
    }

    if body_text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body_text)
        .map_err(|e| PosError::Backend(format!("Invalid JSON from backend: {e}")))
}
