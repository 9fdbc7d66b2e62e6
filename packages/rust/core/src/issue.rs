//! Missing-citation issue reconciliation.
//!
//! After a run that found missing citations, a single labeled GitHub issue
//! carries the latest report. The issue is located by label, not by a stored
//! number: the first open issue carrying [`ISSUE_LABEL`] is updated in place,
//! and a new one is opened only when none exists.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use citecheck_shared::{CitecheckError, Result};

/// Label the reconciliation searches by.
pub const ISSUE_LABEL: &str = "missing-citations";

/// Labels applied to a newly created issue.
pub const ISSUE_LABELS: [&str; 2] = [ISSUE_LABEL, "automated"];

/// Footer appended to every issue body.
pub const ISSUE_FOOTER: &str =
    "*This issue is updated automatically by the scheduled citation comparison workflow.*";

/// GitHub rejects issue bodies longer than this many characters.
const MAX_BODY_CHARS: usize = 65_536;

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("citecheck/", env!("CARGO_PKG_VERSION"));

/// An issue as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// What [`sync_issue`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing missing; no issue touched.
    NoAction,
    /// A new issue was opened.
    Created(u64),
    /// An existing labeled issue was rewritten.
    Updated(u64),
}

/// Issue operations needed by the reconciliation.
pub trait IssueTracker {
    /// Open issues carrying `label`, in the tracker's default order.
    fn find_open_issues(&self, label: &str) -> impl Future<Output = Result<Vec<Issue>>> + Send;

    /// Open a new issue.
    fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[&str],
    ) -> impl Future<Output = Result<Issue>> + Send;

    /// Replace an issue's title and body.
    fn update_issue(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<Issue>> + Send;
}

/// Issue title for a report with `missing_count` missing citations.
pub fn issue_title(missing_count: usize) -> String {
    let noun = if missing_count == 1 { "citation" } else { "citations" };
    format!("Missing citations report: {missing_count} Wikiversity {noun} not in Zotero")
}

/// Issue body: the full report followed by the attribution footer.
///
/// Reports too long for GitHub are cut at a line boundary with a note.
pub fn issue_body(report: &str) -> String {
    let footer = format!("\n\n---\n\n{ISSUE_FOOTER}\n");
    let notice = "\n\n_Report truncated; download the `citation-report` artifact for the full text._";
    let budget = MAX_BODY_CHARS - footer.chars().count();

    let report = report.trim_end();
    if report.chars().count() <= budget {
        return format!("{report}{footer}");
    }

    let keep = budget - notice.chars().count();
    let cut = report
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(report.len());
    let head = &report[..cut];
    let head = head.rfind('\n').map(|idx| &head[..idx]).unwrap_or(head);
    format!("{head}{notice}{footer}")
}

/// Create or update the labeled report issue.
///
/// If several open issues carry the label, only the first one returned is
/// updated; the rest are left alone.
#[instrument(skip(tracker, report))]
pub async fn sync_issue<T: IssueTracker>(
    tracker: &T,
    missing_count: usize,
    report: &str,
) -> Result<SyncOutcome> {
    if missing_count == 0 {
        info!("no missing citations, leaving issues untouched");
        return Ok(SyncOutcome::NoAction);
    }

    let title = issue_title(missing_count);
    let body = issue_body(report);

    let existing = tracker.find_open_issues(ISSUE_LABEL).await?;
    if existing.len() > 1 {
        warn!(count = existing.len(), "several open report issues found, updating the first");
    }

    match existing.first() {
        Some(issue) => {
            let updated = tracker.update_issue(issue.number, &title, &body).await?;
            info!(number = updated.number, "updated report issue");
            Ok(SyncOutcome::Updated(updated.number))
        }
        None => {
            let created = tracker.create_issue(&title, &body, &ISSUE_LABELS).await?;
            info!(number = created.number, "created report issue");
            Ok(SyncOutcome::Created(created.number))
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub REST implementation
// ---------------------------------------------------------------------------

/// [`IssueTracker`] backed by the GitHub REST API.
pub struct GitHubIssues {
    client: Client,
    api_url: Url,
    repository: String,
    token: String,
}

#[derive(Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    html_url: Option<String>,
    /// Present when the "issue" is a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            html_url: raw.html_url,
        }
    }
}

impl GitHubIssues {
    /// Create a client for `repository` (`owner/repo`).
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self> {
        if repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(CitecheckError::config(format!(
                "repository must be 'owner/repo', got '{repository}'"
            )));
        }
        if token.trim().is_empty() {
            return Err(CitecheckError::config("GitHub token is empty"));
        }

        // A trailing slash keeps `join` from replacing the last path segment
        // (GitHub Enterprise serves the API under `/api/v3`).
        let api_url = Url::parse(&format!("{}/", api_url.trim_end_matches('/')))
            .map_err(|e| CitecheckError::config(format!("invalid GitHub API URL: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CitecheckError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            repository: repository.to_string(),
            token: token.to_string(),
        })
    }

    /// Build from `GITHUB_TOKEN`, `GITHUB_REPOSITORY`, and `GITHUB_API_URL`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CitecheckError::config(format!("{name} is not set")))
        };
        let api_url = std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        Self::new(&api_url, &var("GITHUB_REPOSITORY")?, &var("GITHUB_TOKEN")?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(&format!("repos/{}/{path}", self.repository))
            .map_err(|e| CitecheckError::config(format!("invalid GitHub endpoint: {e}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| CitecheckError::Network(format!("GitHub request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CitecheckError::GitHub(format!("HTTP {status}: {}", body.trim())));
        }

        response
            .json()
            .await
            .map_err(|e| CitecheckError::GitHub(format!("invalid response body: {e}")))
    }
}

impl IssueTracker for GitHubIssues {
    async fn find_open_issues(&self, label: &str) -> Result<Vec<Issue>> {
        let mut url = self.endpoint("issues")?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("labels", label)
            .append_pair("per_page", "100");

        let raw: Vec<RawIssue> = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(raw
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(Issue::from)
            .collect())
    }

    async fn create_issue(&self, title: &str, body: &str, labels: &[&str]) -> Result<Issue> {
        let url = self.endpoint("issues")?;
        let payload = serde_json::json!({ "title": title, "body": body, "labels": labels });
        let raw: RawIssue = self
            .send(self.request(reqwest::Method::POST, url).json(&payload))
            .await?;
        Ok(raw.into())
    }

    async fn update_issue(&self, number: u64, title: &str, body: &str) -> Result<Issue> {
        let url = self.endpoint(&format!("issues/{number}"))?;
        let payload = serde_json::json!({ "title": title, "body": body });
        let raw: RawIssue = self
            .send(self.request(reqwest::Method::PATCH, url).json(&payload))
            .await?;
        Ok(raw.into())
    }
}
