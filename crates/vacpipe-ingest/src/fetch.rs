//! Paginated retrieval over the search-and-scroll protocol
//!
//! The remote result set is too large for a single response, so the API hands
//! out an opaque scroll cursor: the initial search returns the first batch
//! plus a cursor, and each continuation call trades the cursor for the next
//! batch and a possibly refreshed cursor. The loop terminates when a batch
//! comes back empty.
//!
//! There is no retry here. A failed request fails the whole fetch and the
//! batches collected so far are discarded; retrying the run is the external
//! scheduler's job.

use crate::config::ApiConfig;
use crate::record::RawHit;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while paging through the remote result set
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or undecodable response body
    #[error("search API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status, including authentication failures
    #[error("search API returned {status} for {url}")]
    Status { url: String, status: StatusCode },

    /// The response carried hits but no cursor to continue with
    #[error("scroll cursor missing after {pages} page(s)")]
    MissingCursor { pages: usize },
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

/// Cursor-based fetcher for the full remote snapshot
pub struct ScrollFetcher {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    page_size: usize,
    scroll_ttl: String,
    max_pages: Option<usize>,
}

impl ScrollFetcher {
    /// Build a fetcher from the API configuration
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            page_size: config.page_size,
            scroll_ttl: config.scroll_ttl.clone(),
            max_pages: config.max_pages,
        })
    }

    /// Retrieve the full result set, batch by batch
    ///
    /// Pagination is strictly serial: each continuation depends on the cursor
    /// from the previous response. Termination is the empty batch; the
    /// optional page cap is a safety net only and logs a warning when it
    /// trips, because it truncates the snapshot.
    pub async fn fetch_all(&self) -> Result<Vec<RawHit>, FetchError> {
        let url = format!("{}/_search?scroll={}", self.base_url, self.scroll_ttl);
        let page = self
            .post_checked(&url, &json!({ "size": self.page_size }))
            .await?;

        let mut hits = page.hits.hits;
        let mut cursor = page.scroll_id;
        let mut pages = 1usize;
        let mut last_batch = hits.len();

        debug!(batch = last_batch, "initial search page received");

        let scroll_url = format!("{}/_search/scroll", self.base_url);

        while last_batch > 0 {
            if let Some(cap) = self.max_pages {
                if pages >= cap {
                    warn!(
                        pages,
                        cap,
                        "page cap reached before an empty batch; snapshot is truncated"
                    );
                    break;
                }
            }

            let scroll_id = cursor.take().ok_or(FetchError::MissingCursor { pages })?;
            let body = json!({ "scroll_id": scroll_id, "scroll": self.scroll_ttl });
            let page = self.post_checked(&scroll_url, &body).await?;

            last_batch = page.hits.hits.len();
            hits.extend(page.hits.hits);
            cursor = page.scroll_id;
            pages += 1;

            debug!(page = pages, batch = last_batch, total = hits.len(), "scroll page received");
        }

        info!(pages, hits = hits.len(), "fetch complete");
        Ok(hits)
    }

    async fn post_checked(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<ScrollResponse, FetchError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(response.json().await?)
    }
}
