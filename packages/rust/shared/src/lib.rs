//! Shared types, error model, and configuration for citecheck.
//!
//! This crate is the foundation depended on by all other citecheck crates.
//! It provides:
//! - [`CitecheckError`] — the unified error type
//! - Domain types ([`Citation`], [`ZoteroItem`], [`ComparisonResults`], [`RunId`])
//! - Configuration ([`RunConfig`], `config.yaml` loading, the URL override)

pub mod config;
pub mod error;
pub mod overrides;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    CREDENTIAL_API_KEY_ENV, CREDENTIAL_USER_ID_ENV, DEFAULT_CONFIG_FILE, LibraryType,
    OutputFormat, RunConfig, ZoteroCredentials, load_config, load_credentials, parse_config,
};
pub use error::{CitecheckError, Result};
pub use overrides::{OverrideOutcome, apply_override, override_urls, parse_url_list};
pub use types::{
    Citation, ComparisonResults, FoundCitation, PotentialMatch, RunId, SourceReport, Summary,
    ZoteroItem, ZoteroItemData, ZoteroMatch,
};
