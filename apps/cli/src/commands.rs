//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use citecheck_core::issue::{GitHubIssues, SyncOutcome, sync_issue};
use citecheck_core::pipeline::{
    ProgressReporter, RunOptions, RunOutcome, missing_count_from_results, run_comparison,
};
use citecheck_shared::{
    DEFAULT_CONFIG_FILE, OverrideOutcome, apply_override, load_config, load_credentials,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// citecheck — find Wikiversity citations missing from your Zotero library.
#[derive(Parser)]
#[command(
    name = "citecheck",
    version,
    about = "Compare Wikiversity citations with a Zotero library and report what is missing.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the comparison and write the result files.
    Run {
        /// Path to the run configuration.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Comma-separated URLs replacing `wikiversity_urls` in the config file.
        #[arg(long, env = "CITECHECK_URLS")]
        urls: Option<String>,

        /// Directory for results.json, report.md, and missing_citations.csv.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Zotero API root (defaults to https://api.zotero.org).
        #[arg(long, env = "ZOTERO_API_URL", hide = true)]
        zotero_url: Option<String>,
    },

    /// Replace `wikiversity_urls` in the config file, leaving everything else as-is.
    Override {
        /// Comma-separated URL list. Blank entries are ignored.
        #[arg(long)]
        urls: String,

        /// Path to the run configuration.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Create or update the missing-citations GitHub issue from a report.
    SyncIssue {
        /// Markdown report used as the issue body.
        #[arg(long, default_value = "report.md")]
        report: PathBuf,

        /// Number of missing citations (read from --results when omitted).
        #[arg(long)]
        missing_count: Option<usize>,

        /// Results file to read the missing count from.
        #[arg(long, default_value = "results.json")]
        results: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved configuration (file values plus defaults).
    Show {
        /// Path to the run configuration.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "citecheck=info",
        1 => "citecheck=debug",
        _ => "citecheck=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            urls,
            out_dir,
            zotero_url,
        } => cmd_run(&config, urls.as_deref(), out_dir, zotero_url).await,
        Command::Override { urls, config } => cmd_override(&config, &urls),
        Command::SyncIssue {
            report,
            missing_count,
            results,
        } => cmd_sync_issue(&report, missing_count, &results).await,
        Command::Config { action } => match action {
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: &Path,
    urls: Option<&str>,
    out_dir: PathBuf,
    zotero_url: Option<String>,
) -> Result<()> {
    if let Some(urls) = urls {
        report_override(config_path, apply_override(config_path, urls)?);
    }

    let config = load_config(config_path)?;
    let credentials = load_credentials()?;

    let options = RunOptions {
        output_dir: out_dir,
        zotero_base_url: zotero_url,
        allow_localhost: false,
        github_output: std::env::var_os("GITHUB_OUTPUT").map(PathBuf::from),
    };

    info!(
        config = %config_path.display(),
        pages = config.wikiversity_urls.len(),
        threshold = config.similarity_threshold,
        "starting comparison"
    );

    let reporter = CliProgress::new();
    let outcome = run_comparison(&config, &credentials, &options, &reporter).await?;

    let summary = outcome.results.summary;
    println!();
    println!("  Comparison complete!");
    println!("  Total citations:   {}", summary.total_wikiversity_citations);
    println!("  Already in Zotero: {}", summary.found_in_zotero);
    println!("  Missing:           {}", summary.missing_from_zotero);
    println!("  Needs review:      {}", summary.potential_matches);
    for path in &outcome.written {
        println!("  Wrote:             {}", path.display());
    }
    println!("  Time:              {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_override(config_path: &Path, urls: &str) -> Result<()> {
    let outcome = apply_override(config_path, urls)?;
    report_override(config_path, outcome);
    Ok(())
}

fn report_override(config_path: &Path, outcome: OverrideOutcome) {
    match outcome {
        OverrideOutcome::Skipped => {
            println!("No URLs given; using {} as-is.", config_path.display());
        }
        OverrideOutcome::Applied { urls } => {
            println!("Updated {} with {} URL(s):", config_path.display(), urls.len());
            for url in urls {
                println!("  - {url}");
            }
        }
    }
}

async fn cmd_sync_issue(report: &Path, missing_count: Option<usize>, results: &Path) -> Result<()> {
    let missing_count = match missing_count {
        Some(count) => count,
        None => missing_count_from_results(results)?,
    };

    if missing_count == 0 {
        println!("No missing citations; nothing to report.");
        return Ok(());
    }

    let report_text = std::fs::read_to_string(report)
        .wrap_err_with(|| format!("cannot read report '{}'", report.display()))?;

    let github = GitHubIssues::from_env()?;
    match sync_issue(&github, missing_count, &report_text).await? {
        SyncOutcome::Created(number) => println!("Created issue #{number}."),
        SyncOutcome::Updated(number) => println!("Updated issue #{number}."),
        SyncOutcome::NoAction => println!("No missing citations; nothing to report."),
    }
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        return Err(eyre!("config file '{}' not found", config_path.display()));
    }
    let config = load_config(config_path)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_override() {
        let cli = Cli::try_parse_from([
            "citecheck",
            "run",
            "--urls",
            "https://a.org, https://b.org",
            "--out-dir",
            "out",
        ])
        .unwrap();
        match cli.command {
            Command::Run { urls, out_dir, config, .. } => {
                assert_eq!(urls.as_deref(), Some("https://a.org, https://b.org"));
                assert_eq!(out_dir, PathBuf::from("out"));
                assert_eq!(config, PathBuf::from("config.yaml"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parses_sync_issue_defaults() {
        let cli = Cli::try_parse_from(["citecheck", "sync-issue", "--missing-count", "3"]).unwrap();
        match cli.command {
            Command::SyncIssue {
                report,
                missing_count,
                results,
            } => {
                assert_eq!(report, PathBuf::from("report.md"));
                assert_eq!(missing_count, Some(3));
                assert_eq!(results, PathBuf::from("results.json"));
            }
            _ => panic!("expected sync-issue"),
        }
    }

    #[test]
    fn workflows_build_and_invoke_valid_commands() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let has_lockfile = root.join("Cargo.lock").exists();

        for name in ["compare-citations.yml", "scheduled-comparison.yml"] {
            let workflow =
                std::fs::read_to_string(root.join(".github/workflows").join(name)).unwrap();

            // `--locked` fails outright when no lockfile is committed.
            assert!(
                has_lockfile || !workflow.contains("--locked"),
                "{name} builds with --locked but Cargo.lock is absent"
            );

            for line in workflow.lines() {
                let Some(args) = line.trim().strip_prefix("run: ./target/release/citecheck") else {
                    continue;
                };
                let argv = std::iter::once("citecheck").chain(args.split_whitespace());
                assert!(Cli::try_parse_from(argv).is_ok(), "{name}: invalid invocation {line:?}");
            }
        }
    }

    #[test]
    fn override_command_rewrites_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "wikiversity_urls: []\noutput_formats: [json]\n").unwrap();

        cmd_override(&path, "https://a.org").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "wikiversity_urls:\n  - https://a.org\noutput_formats: [json]\n"
        );
    }
}
