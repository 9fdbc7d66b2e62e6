//! Bounded-concurrency page fetcher.
//!
//! Fetches every configured Wikiversity page, at most `concurrency` at a
//! time, and returns one [`FetchedPage`] per input URL in input order. A page
//! that fails to load is reported, not propagated: one dead link must not
//! sink the whole comparison.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use citecheck_shared::{CitecheckError, Result};

/// User-Agent string for page requests (Wikimedia asks bots to identify themselves).
const USER_AGENT: &str = concat!("citecheck/", env!("CARGO_PKG_VERSION"));

/// Outcome of fetching one page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL as configured.
    pub url: String,
    /// HTTP status, if a response arrived.
    pub status: Option<u16>,
    /// SHA-256 of the body.
    pub content_hash: Option<String>,
    /// Page body on success.
    pub body: Option<String>,
    /// Failure description.
    pub error: Option<String>,
}

impl FetchedPage {
    fn failed(url: &str, status: Option<u16>, error: String) -> Self {
        Self {
            url: url.to_string(),
            status,
            content_hash: None,
            body: None,
            error: Some(error),
        }
    }
}

/// Concurrent HTTP fetcher for Wikiversity pages.
pub struct PageFetcher {
    client: Client,
    concurrency: usize,
    /// Allow localhost/private IPs (for tests against local mock servers).
    allow_localhost: bool,
}

impl PageFetcher {
    /// Create a fetcher with the given concurrency limit and request timeout.
    pub fn new(concurrency: u32, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CitecheckError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            concurrency: concurrency.max(1) as usize,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for tests against local mock servers).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch all `urls`, returning results in the same order.
    #[instrument(skip_all, fields(pages = urls.len(), concurrency = self.concurrency))]
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<FetchedPage> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(urls.len());

        for raw in urls {
            let parsed = match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!(url = %raw, error = %e, "invalid URL, skipping");
                    handles.push(Err(FetchedPage::failed(raw, None, format!("invalid URL: {e}"))));
                    continue;
                }
            };

            if !self.allow_localhost && is_ssrf_target(&parsed) {
                warn!(url = %raw, "SSRF protection: blocked");
                handles.push(Err(FetchedPage::failed(
                    raw,
                    None,
                    "blocked: not a public http(s) URL".into(),
                )));
                continue;
            }

            let client = self.client.clone();
            let sem = semaphore.clone();
            let raw = raw.clone();

            handles.push(Ok(tokio::spawn(async move {
                // The semaphore is never closed while tasks are running.
                let _permit = sem.acquire_owned().await.ok();
                fetch_page(&client, &raw, &parsed).await
            })));
        }

        let mut pages = Vec::with_capacity(handles.len());
        for (handle, raw) in handles.into_iter().zip(urls) {
            let page = match handle {
                Ok(task) => match task.await {
                    Ok(page) => page,
                    Err(e) => FetchedPage::failed(raw, None, format!("fetch task failed: {e}")),
                },
                Err(page) => page,
            };
            pages.push(page);
        }

        let failed = pages.iter().filter(|p| p.error.is_some()).count();
        info!(fetched = pages.len() - failed, failed, "page fetch completed");
        pages
    }
}

/// Fetch a single page. Failures become a [`FetchedPage`] with `error` set.
async fn fetch_page(client: &Client, raw: &str, url: &Url) -> FetchedPage {
    debug!(%url, "fetching page");

    let response = match client.get(url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(%url, error = %e, "request failed");
            return FetchedPage::failed(raw, None, e.to_string());
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(%url, %status, "non-success status");
        return FetchedPage::failed(raw, Some(status.as_u16()), format!("HTTP {status}"));
    }

    match response.text().await {
        Ok(body) => FetchedPage {
            url: raw.to_string(),
            status: Some(status.as_u16()),
            content_hash: Some(compute_hash(&body)),
            body: Some(body),
            error: None,
        },
        Err(e) => {
            warn!(%url, error = %e, "body read failed");
            FetchedPage::failed(raw, Some(status.as_u16()), format!("body read failed: {e}"))
        }
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[test]
    fn test_compute_hash() {
        assert_eq!(
            compute_hash("hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_ssrf_blocks_private_and_local() {
        for raw in [
            "file:///etc/passwd",
            "http://192.168.1.1/admin",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://localhost:3000/api",
            "http://metadata.internal/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn test_ssrf_allows_public() {
        let url = Url::parse("https://en.wikiversity.org/wiki/Open_Science").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[tokio::test]
    async fn fetch_all_keeps_input_order_and_reports_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/wiki/A"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>A</html>"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/wiki/Missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/wiki/B"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>B</html>"))
            .mount(&server)
            .await;

        let urls = vec![
            format!("{}/wiki/A", server.uri()),
            format!("{}/wiki/Missing", server.uri()),
            "not a url".to_string(),
            format!("{}/wiki/B", server.uri()),
        ];

        let fetcher = PageFetcher::new(2, 5).unwrap().allow_localhost();
        let pages = fetcher.fetch_all(&urls).await;

        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0].body.as_deref(), Some("<html>A</html>"));
        assert_eq!(pages[0].status, Some(200));
        assert_eq!(pages[0].content_hash.as_ref().map(String::len), Some(64));

        assert_eq!(pages[1].status, Some(404));
        assert!(pages[1].body.is_none());
        assert!(pages[1].error.as_deref().unwrap().contains("404"));

        assert!(pages[2].error.as_deref().unwrap().contains("invalid URL"));
        assert_eq!(pages[3].body.as_deref(), Some("<html>B</html>"));
    }

    /// Records when each request reaches the server, then answers after `delay`.
    struct RecordArrivals {
        arrivals: Arc<Mutex<Vec<Instant>>>,
        delay: Duration,
    }

    impl Respond for RecordArrivals {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_string("<html>page</html>")
                .set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn fetch_all_never_exceeds_concurrency() {
        let server = MockServer::start().await;
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let delay = Duration::from_millis(200);

        Mock::given(method("GET"))
            .respond_with(RecordArrivals {
                arrivals: arrivals.clone(),
                delay,
            })
            .mount(&server)
            .await;

        let limit = 2;
        let urls: Vec<String> = (0..6).map(|i| format!("{}/wiki/P{i}", server.uri())).collect();
        let fetcher = PageFetcher::new(limit, 5).unwrap().allow_localhost();
        let pages = fetcher.fetch_all(&urls).await;
        assert!(pages.iter().all(|p| p.error.is_none()));

        // With at most `limit` requests open, request i + limit can only
        // arrive after request i has been answered.
        let mut arrivals = arrivals.lock().unwrap().clone();
        arrivals.sort();
        assert_eq!(arrivals.len(), 6);
        for window in arrivals.windows(limit as usize + 1) {
            let spread = window[limit as usize].duration_since(window[0]);
            assert!(spread >= delay, "{} requests in flight within {spread:?}", limit + 1);
        }
    }

    #[tokio::test]
    async fn fetch_all_blocks_localhost_by_default() {
        let server = MockServer::start().await;
        let fetcher = PageFetcher::new(1, 5).unwrap();
        let pages = fetcher.fetch_all(&[format!("{}/wiki/A", server.uri())]).await;
        assert!(pages[0].error.as_deref().unwrap().contains("blocked"));
    }
}
