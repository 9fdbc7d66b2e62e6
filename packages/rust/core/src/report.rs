//! Result file writers: `results.json`, `report.md`, `missing_citations.csv`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use citecheck_shared::{CitecheckError, ComparisonResults, OutputFormat, Result};

/// Column order of `missing_citations.csv`.
const CSV_HEADER: [&str; 7] = ["title", "author", "url", "date", "journal", "source_url", "raw_text"];

/// Write every requested format into `output_dir`. Returns the written paths.
#[instrument(skip_all, fields(dir = %output_dir.display(), formats = formats.len()))]
pub fn write_reports(
    results: &ComparisonResults,
    formats: &[OutputFormat],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| CitecheckError::io(output_dir, e))?;

    let mut written = Vec::new();
    for format in [OutputFormat::Json, OutputFormat::Markdown, OutputFormat::Csv] {
        if !formats.contains(&format) {
            continue;
        }

        let path = output_dir.join(format.file_name());
        match format {
            OutputFormat::Json => write_json(&path, results)?,
            OutputFormat::Markdown => write_markdown(&path, results)?,
            OutputFormat::Csv => write_csv(&path, results)?,
        }
        info!(path = %path.display(), "wrote report");
        written.push(path);
    }

    Ok(written)
}

/// Write the full results as pretty JSON.
pub fn write_json(path: &Path, results: &ComparisonResults) -> Result<()> {
    let content = serde_json::to_string_pretty(results)
        .map_err(|e| CitecheckError::Report(format!("failed to serialize results: {e}")))?;
    std::fs::write(path, content).map_err(|e| CitecheckError::io(path, e))
}

/// Write the Markdown report.
pub fn write_markdown(path: &Path, results: &ComparisonResults) -> Result<()> {
    std::fs::write(path, render_markdown(results)).map_err(|e| CitecheckError::io(path, e))
}

/// Write one CSV row per missing citation.
pub fn write_csv(path: &Path, results: &ComparisonResults) -> Result<()> {
    let csv_error = |e: csv::Error| CitecheckError::Report(format!("{}: {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(CSV_HEADER).map_err(csv_error)?;

    for c in &results.missing_from_zotero {
        writer
            .write_record([
                c.title.as_str(),
                c.author.as_str(),
                c.url.as_str(),
                c.date.as_str(),
                c.journal.as_str(),
                c.source_url.as_deref().unwrap_or(""),
                c.raw_text.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush().map_err(|e| CitecheckError::io(path, e))
}

/// Render the human-readable Markdown report.
pub fn render_markdown(results: &ComparisonResults) -> String {
    let mut md = String::new();
    let summary = &results.summary;

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# Wikiversity-Zotero Citation Comparison Report\n");
    let _ = writeln!(
        md,
        "**Generated on:** {}\n",
        results.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let _ = writeln!(md, "## Summary\n");
    let _ = writeln!(md, "- **Total Wikiversity citations:** {}", summary.total_wikiversity_citations);
    let _ = writeln!(md, "- **Found in Zotero:** {}", summary.found_in_zotero);
    let _ = writeln!(md, "- **Missing from Zotero:** {}", summary.missing_from_zotero);
    let _ = writeln!(md, "- **Potential matches:** {}\n", summary.potential_matches);

    if !results.missing_from_zotero.is_empty() {
        let _ = writeln!(md, "## Citations Missing from Zotero\n");

        for (i, c) in results.missing_from_zotero.iter().enumerate() {
            let _ = writeln!(md, "### {}. {}\n", i + 1, c.display_title());
            for (label, value) in [
                ("Author", c.author.as_str()),
                ("URL", c.url.as_str()),
                ("Date", c.date.as_str()),
                ("Source Page", c.source_url.as_deref().unwrap_or("")),
            ] {
                if !value.is_empty() {
                    let _ = writeln!(md, "**{label}:** {value}\n");
                }
            }
            let _ = writeln!(md, "**Raw Citation:**\n```\n{}\n```\n", c.raw_text);
            let _ = writeln!(md, "---\n");
        }
    }

    if !results.potential_matches.is_empty() {
        let _ = writeln!(md, "## Potential Matches (Manual Review Needed)\n");

        for (i, p) in results.potential_matches.iter().enumerate() {
            let _ = writeln!(md, "### {}. {}\n", i + 1, p.wikiversity_citation.display_title());
            for m in &p.possible_matches {
                let title = if m.zotero_item.data.title.is_empty() {
                    "No title"
                } else {
                    m.zotero_item.data.title.as_str()
                };
                let _ = writeln!(
                    md,
                    "- {title} (`{}`, similarity: {:.2})",
                    m.zotero_item.key, m.title_similarity
                );
            }
            md.push('\n');
        }
    }

    let failed: Vec<_> = results.sources.iter().filter(|s| s.error.is_some()).collect();
    if !failed.is_empty() {
        let _ = writeln!(md, "## Pages That Could Not Be Read\n");
        for source in failed {
            let _ = writeln!(
                md,
                "- {}: {}",
                source.url,
                source.error.as_deref().unwrap_or("unknown error")
            );
        }
        md.push('\n');
    }

    md
}
