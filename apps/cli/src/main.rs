//! citecheck CLI — find Wikiversity citations missing from a Zotero library.
//!
//! Compares the references on configured Wikiversity pages with a Zotero
//! library, writes JSON/Markdown/CSV reports, and keeps a GitHub issue
//! up to date with the findings.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
