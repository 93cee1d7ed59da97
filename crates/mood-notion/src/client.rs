//! Notion REST client
//!
//! Implements [`DocumentStore`] over the public Notion API:
//! - `POST /v1/databases/{id}/query` for progress records
//! - `GET /v1/blocks/{id}/children` for block listing, following cursors
//! - `PATCH /v1/blocks/{id}` for the image update

use crate::wire::{ErrorBody, ListResponse, QueryBody, RawBlock, RawPage, UpdateBody};
use async_trait::async_trait;
use mood_core::{Block, BlockId, BlockUpdate, DocumentStore, ProgressRecord, SourceId, StoreError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Public API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";

/// API version the wire shapes are written against
pub const NOTION_VERSION: &str = "2022-06-28";

/// Largest page size the API accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Client options
#[derive(Debug, Clone)]
pub struct NotionOptions {
    /// API root, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Page size for list endpoints
    pub page_size: u32,
}

impl Default for NotionOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl NotionOptions {
    /// With a different API root
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// With a different request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Notion-backed document store for one integration token
///
/// Safe to share between page tasks; `reqwest::Client` pools connections
/// internally.
#[derive(Debug, Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
    timeout: Duration,
}

impl NotionClient {
    /// Build a client for `api_key`
    ///
    /// # Errors
    /// `StoreError::Transport` if the key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(api_key: &str, options: NotionOptions) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| StoreError::Transport(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("notion-version", HeaderValue::from_static(NOTION_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .user_agent(concat!("budget-mood/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            page_size: options.page_size.clamp(1, MAX_PAGE_SIZE),
            timeout: options.timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response.json::<T>().await.map_err(|e| self.map_error(&e))
    }

    fn map_error(&self, error: &reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout {
                elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if error.is_decode() {
            StoreError::Decode(error.to_string())
        } else {
            StoreError::Transport(error.to_string())
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> StoreError {
    let (code, message) = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => (parsed.code, parsed.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("unknown").to_string(),
            body.to_string(),
        ),
    };
    StoreError::Status {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    async fn query_progress(
        &self,
        source: &SourceId,
        property: &str,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        tracing::debug!("Querying database {}", source);
        let request = self
            .http
            .post(self.url(&format!("databases/{source}/query")))
            .json(&QueryBody {
                page_size: self.page_size,
            });
        let list: ListResponse<RawPage> = self.send(request).await?;
        tracing::debug!("Database {} returned {} record(s)", source, list.results.len());

        Ok(list
            .results
            .into_iter()
            .map(|page| page.into_record(property))
            .collect())
    }

    async fn list_children(&self, parent: &BlockId) -> Result<Vec<Block>, StoreError> {
        let url = self.url(&format!("blocks/{parent}/children"));
        let page_size = self.page_size.to_string();
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("page_size", page_size.as_str())]);
            if let Some(cursor) = cursor.as_deref() {
                request = request.query(&[("start_cursor", cursor)]);
            }

            let list: ListResponse<RawBlock> = self.send(request).await?;
            blocks.extend(list.results.into_iter().map(Block::from));

            match (list.has_more, list.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                // Stopping here would hand back a truncated child set.
                (true, None) => {
                    return Err(StoreError::Decode(format!(
                        "children of block {parent} report more results but no next_cursor"
                    )));
                }
                (false, _) => break,
            }
        }

        tracing::debug!("Fetched {} children of block {}", blocks.len(), parent);
        Ok(blocks)
    }

    async fn update_block(&self, block: &BlockId, update: &BlockUpdate) -> Result<(), StoreError> {
        let request = self
            .http
            .patch(self.url(&format!("blocks/{block}")))
            .json(&UpdateBody::from(update));
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reads_notion_body() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"object":"error","status":400,"code":"validation_error","message":"body failed validation"}"#,
        );
        assert_eq!(
            err,
            StoreError::Status {
                status: 400,
                code: "validation_error".to_string(),
                message: "body failed validation".to_string(),
            }
        );
    }

    #[test]
    fn status_error_falls_back_to_raw_body() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            err,
            StoreError::Status {
                status: 502,
                code: "Bad Gateway".to_string(),
                message: "upstream down".to_string(),
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn options_trim_base_url() {
        let options = NotionOptions::default().with_base_url("http://localhost:9000/v1/");
        assert_eq!(options.base_url, "http://localhost:9000/v1");

        let client = NotionClient::new("secret_x", options).unwrap();
        assert_eq!(client.url("blocks/a"), "http://localhost:9000/v1/blocks/a");
    }

    #[test]
    fn rejects_unprintable_key() {
        let err = NotionClient::new("bad\nkey", NotionOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
