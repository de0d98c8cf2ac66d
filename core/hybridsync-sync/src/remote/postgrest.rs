//! PostgREST remote store client.
//!
//! Rows live at `{base_url}/rest/v1/{table}`. Every request carries the
//! `apikey` header and a bearer token with the same key. Errors are
//! classified from the JSON error body (`code`, `message`, `details`,
//! `hint`) and the HTTP status.

use super::RemoteClient;
use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use hybridsync_types::{Fields, Record, RecordId, Table};
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Rows fetched per page by `get_all`.
const PAGE_SIZE: usize = 1000;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl ErrorBody {
    fn describe(&self, status: StatusCode) -> String {
        let mut text = self
            .message
            .clone()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        if let Some(details) = &self.details {
            text.push_str(&format!(" ({details})"));
        }
        if let Some(hint) = &self.hint {
            text.push_str(&format!(" hint: {hint}"));
        }
        text
    }
}

/// Client for a PostgREST-compatible remote store.
pub struct PostgrestClient {
    config: RemoteConfig,
    client: Client,
}

impl PostgrestClient {
    /// Creates a client. Fails when the config is invalid.
    pub fn new(config: RemoteConfig) -> SyncResult<Self> {
        config.validate()?;
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| SyncError::Config(format!("invalid api key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| SyncError::Config(format!("invalid api key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.config.base_url.trim_end_matches('/'), table.name())
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    /// Reads the total from a `Content-Range` header such as `0-24/25` or `*/0`.
    fn parse_content_range(headers: &HeaderMap) -> Option<u64> {
        let raw = headers.get(CONTENT_RANGE)?.to_str().ok()?;
        raw.rsplit('/').next()?.trim().parse().ok()
    }
}

#[async_trait]
impl RemoteClient for PostgrestClient {
    fn provider_name(&self) -> &'static str {
        "postgrest"
    }

    async fn get_all(&self, table: Table) -> SyncResult<Vec<Record>> {
        let url = self.table_url(table);
        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut offset = 0usize;

        loop {
            let request = self.client.get(&url).query(&[
                ("select", "*".to_string()),
                ("order", "id.asc".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            let rows: Vec<Value> = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|e| SyncError::Remote {
                    status: 200,
                    message: format!("invalid {table} response: {e}"),
                })?;
            let page_len = rows.len();

            for row in rows {
                match Record::from_json(row) {
                    Some(record) => records.push(record),
                    None => skipped += 1,
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        if skipped > 0 {
            warn!("Skipped {} {} rows without an integer id", skipped, table);
        }
        debug!("Fetched {} {} rows from remote", records.len(), table);
        Ok(records)
    }

    async fn insert(&self, table: Table, fields: &Fields) -> SyncResult<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(fields);
        self.send(request).await?;
        Ok(())
    }

    async fn update(&self, table: Table, id: RecordId, fields: &Fields) -> SyncResult<()> {
        let mut body = fields.clone();
        body.remove("id");
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, id: RecordId) -> SyncResult<()> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))]);
        match self.send(request).await {
            Err(SyncError::Remote { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn count(&self, table: Table) -> SyncResult<u64> {
        let request = self
            .client
            .head(self.table_url(table))
            .query(&[("select", "id")])
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;
        match Self::parse_content_range(response.headers()) {
            Some(total) => Ok(total),
            None => {
                debug!("No exact count for {}, falling back to a full fetch", table);
                Ok(self.get_all(table).await?.len() as u64)
            }
        }
    }
}

// ── Error classification ─────────────────────────────────────────

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        SyncError::Connectivity(err.to_string())
    } else {
        SyncError::Remote {
            status: err.status().map_or(0, |s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

async fn error_from_response(response: Response) -> SyncError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = if body.message.is_none() && !text.trim().is_empty() {
        text
    } else {
        body.describe(status)
    };
    classify(status, body.code.as_deref(), message)
}

/// Maps a failed response onto the sync error taxonomy.
pub(crate) fn classify(status: StatusCode, code: Option<&str>, message: String) -> SyncError {
    match code {
        Some(UNIQUE_VIOLATION) => return SyncError::Duplicate(message),
        Some(FOREIGN_KEY_VIOLATION) => return SyncError::Referential(message),
        _ => {}
    }
    let lowered = message.to_lowercase();
    if lowered.contains("duplicate key") {
        return SyncError::Duplicate(message);
    }
    if lowered.contains("foreign key constraint") {
        return SyncError::Referential(message);
    }
    match status {
        StatusCode::CONFLICT => SyncError::Duplicate(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Auth(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            SyncError::Connectivity(message)
        }
        _ => SyncError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}
