//! End-to-end comparison run: config → Zotero library + page fetch →
//! extraction → matching → result files.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use citecheck_shared::{
    CitecheckError, ComparisonResults, Result, RunConfig, SourceReport, Summary, ZoteroCredentials,
};
use citecheck_wikiversity::{ExtractorRegistry, PageFetcher};
use citecheck_zotero::ZoteroClient;

use crate::matcher::{MatchSettings, compare_citations};
use crate::report;

/// Process-level options for a run (everything not in `config.yaml`).
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory the result files are written to.
    pub output_dir: PathBuf,
    /// Zotero API root override (mirrors, tests).
    pub zotero_base_url: Option<String>,
    /// Allow fetching pages from localhost/private IPs.
    pub allow_localhost: bool,
    /// CI step-output file (`$GITHUB_OUTPUT`) to append counts to.
    pub github_output: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            zotero_base_url: None,
            allow_localhost: false,
            github_output: None,
        }
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: ComparisonResults,
    /// Result files written, in format order.
    pub written: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

/// Run the full comparison.
///
/// 1. Load the Zotero library and fetch the Wikiversity pages (concurrently)
/// 2. Extract citations from every page that loaded
/// 3. Classify citations against the library
/// 4. Write the configured result files
/// 5. Publish counts to the CI step output, if requested
#[instrument(skip_all, fields(pages = config.wikiversity_urls.len()))]
pub async fn run_comparison(
    config: &RunConfig,
    credentials: &ZoteroCredentials,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let start = Instant::now();
    config.validate()?;

    if config.wikiversity_urls.is_empty() {
        return Err(CitecheckError::config(
            "no Wikiversity URLs configured (set wikiversity_urls or pass --urls)",
        ));
    }

    // --- Phase 1: Library + pages ---
    progress.phase("Loading Zotero library and Wikiversity pages");
    let mut zotero = ZoteroClient::new(
        credentials,
        config.zotero_library_type,
        config.request_timeout_secs,
    )?;
    if let Some(base) = &options.zotero_base_url {
        zotero = zotero.with_base_url(base)?;
    }

    let mut fetcher = PageFetcher::new(config.request_concurrency, config.request_timeout_secs)?;
    if options.allow_localhost {
        fetcher = fetcher.allow_localhost();
    }

    let (library, pages) = tokio::join!(
        zotero.fetch_library(),
        fetcher.fetch_all(&config.wikiversity_urls)
    );
    let library = library?;

    // --- Phase 2: Extraction ---
    progress.phase("Extracting citations");
    let registry = ExtractorRegistry::new();
    let mut citations = Vec::new();
    let mut sources = Vec::with_capacity(pages.len());

    for page in pages {
        let found = match &page.body {
            Some(body) => registry.extract(&page.url, body),
            None => Vec::new(),
        };
        info!(url = %page.url, citations = found.len(), "processed page");

        sources.push(SourceReport {
            url: page.url,
            status: page.status,
            content_hash: page.content_hash,
            citations: found.len(),
            error: page.error,
        });
        citations.extend(found);
    }

    if sources.iter().all(|s| s.error.is_some()) {
        return Err(CitecheckError::Network(
            "none of the configured Wikiversity pages could be fetched".into(),
        ));
    }

    // --- Phase 3: Matching ---
    progress.phase("Comparing citations");
    let mut results = compare_citations(citations, &library, &MatchSettings::from(config));
    results.sources = sources;

    // --- Phase 4: Reports ---
    progress.phase("Writing reports");
    let written = report::write_reports(&results, &config.output_formats, &options.output_dir)?;

    // --- Phase 5: CI outputs ---
    if let Some(path) = &options.github_output {
        write_step_outputs(path, &results.summary)?;
    }

    let summary = results.summary;
    info!(
        run_id = %results.run_id,
        total = summary.total_wikiversity_citations,
        found = summary.found_in_zotero,
        missing = summary.missing_from_zotero,
        potential = summary.potential_matches,
        "comparison complete"
    );

    let outcome = RunOutcome {
        results,
        written,
        elapsed: start.elapsed(),
    };
    progress.done(&outcome);
    Ok(outcome)
}

/// Append `missing_count` and `total_count` to a CI step-output file.
pub fn write_step_outputs(path: &Path, summary: &Summary) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CitecheckError::io(path, e))?;

    writeln!(file, "missing_count={}", summary.missing_from_zotero)
        .and_then(|_| writeln!(file, "total_count={}", summary.total_wikiversity_citations))
        .map_err(|e| CitecheckError::io(path, e))
}

/// Missing-citation count recorded in an existing `results.json`.
pub fn missing_count_from_results(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path).map_err(|e| CitecheckError::io(path, e))?;

    // Only the summary is needed; tolerate results written by older versions.
    #[derive(serde::Deserialize)]
    struct SummaryOnly {
        summary: Summary,
    }

    let parsed: SummaryOnly = serde_json::from_str(&content).map_err(|e| {
        CitecheckError::parse(format!("invalid results file {}: {e}", path.display()))
    })?;

    if parsed.summary.missing_from_zotero > parsed.summary.total_wikiversity_citations {
        warn!(path = %path.display(), "summary counts are inconsistent");
    }
    Ok(parsed.summary.missing_from_zotero)
}
