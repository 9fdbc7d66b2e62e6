//! Zotero Web API v3 client.
//!
//! Loads every item of a user or group library by paging through
//! `/{users|groups}/{id}/items`. See <https://www.zotero.org/support/dev/web_api/v3/basics>.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use citecheck_shared::{CitecheckError, LibraryType, Result, ZoteroCredentials, ZoteroItem};

/// Public Zotero API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.zotero.org";

/// API version pinned in every request.
const API_VERSION: &str = "3";

/// Largest page size the API accepts.
const PAGE_LIMIT: usize = 100;

/// Attempts per page when the API asks us to back off.
const MAX_ATTEMPTS: u32 = 3;

/// Wait used when a 429/503 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("citecheck/", env!("CARGO_PKG_VERSION"));

/// Client for one Zotero library.
pub struct ZoteroClient {
    client: Client,
    base_url: Url,
    library_path: String,
    api_key: String,
}

impl ZoteroClient {
    /// Create a client for the library identified by `credentials`.
    pub fn new(
        credentials: &ZoteroCredentials,
        library_type: LibraryType,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CitecheckError::Network(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| CitecheckError::config(format!("invalid Zotero base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            library_path: format!(
                "{}/{}",
                library_type.path_segment(),
                credentials.user_id.trim()
            ),
            api_key: credentials.api_key.clone(),
        })
    }

    /// Point the client at a different API root (self-hosted mirrors, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| CitecheckError::config(format!("invalid Zotero base URL '{base_url}': {e}")))?;
        Ok(self)
    }

    /// Fetch every item in the library.
    #[instrument(skip_all, fields(library = %self.library_path))]
    pub async fn fetch_library(&self) -> Result<Vec<ZoteroItem>> {
        let mut items: Vec<ZoteroItem> = Vec::new();
        let mut total: Option<usize> = None;

        loop {
            let start = items.len();
            let response = self.get_page(start).await?;

            if total.is_none() {
                total = header_usize(&response, "Total-Results");
            }
            let backoff = header_usize(&response, "Backoff");

            let page: Vec<ZoteroItem> = response
                .json()
                .await
                .map_err(|e| CitecheckError::Zotero(format!("invalid items response: {e}")))?;

            let page_len = page.len();
            debug!(start, page_len, ?total, "fetched library page");
            items.extend(page);

            let exhausted = match total {
                Some(total) => items.len() >= total,
                None => page_len < PAGE_LIMIT,
            };
            if exhausted || page_len == 0 {
                break;
            }

            // Zotero asks for a pause before the next request while under load.
            if let Some(secs) = backoff {
                warn!(seconds = secs, "Zotero requested backoff, pausing");
                tokio::time::sleep(Duration::from_secs(secs as u64)).await;
            }
        }

        info!(count = items.len(), "loaded Zotero library");
        Ok(items)
    }

    /// GET one page of items, honoring `Retry-After` on 429/503.
    async fn get_page(&self, start: usize) -> Result<Response> {
        let url = self.items_url()?;
        let mut attempt = 1;

        loop {
            let response = self
                .client
                .get(url.clone())
                .query(&[
                    ("format", "json".to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                    ("start", start.to_string()),
                ])
                .header("Zotero-API-Key", &self.api_key)
                .header("Zotero-API-Version", API_VERSION)
                .send()
                .await
                .map_err(|e| CitecheckError::Network(format!("{url}: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retryable =
                matches!(status, StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE);
            if retryable && attempt < MAX_ATTEMPTS {
                let wait = header_usize(&response, "Retry-After")
                    .map(|s| s as u64)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(%status, attempt, wait_secs = wait, "Zotero throttled request, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(CitecheckError::Zotero(describe_failure(status, body.trim())));
        }
    }

    fn items_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("{}/items", self.library_path))
            .map_err(|e| CitecheckError::config(format!("invalid Zotero library path: {e}")))
    }
}

fn header_usize(response: &Response, name: &str) -> Option<usize> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let hint = match status {
        StatusCode::FORBIDDEN => " (check ZOTERO_API_KEY and its library permissions)",
        StatusCode::NOT_FOUND => " (check ZOTERO_USER_ID and zotero_library_type)",
        _ => "",
    };
    if body.is_empty() {
        format!("HTTP {status}{hint}")
    } else {
        format!("HTTP {status}{hint}: {body}")
    }
}
