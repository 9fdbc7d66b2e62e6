//! Run configuration for citecheck.
//!
//! The run is driven by `config.yaml` in the working directory. Zotero
//! credentials never live in the file; they come from the environment.
//! CLI flags override config file values, which override defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CitecheckError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Env var holding the Zotero user (or group) ID.
pub const CREDENTIAL_USER_ID_ENV: &str = "ZOTERO_USER_ID";

/// Env var holding the Zotero API key.
pub const CREDENTIAL_API_KEY_ENV: &str = "ZOTERO_API_KEY";

// ---------------------------------------------------------------------------
// Config structs (matching config.yaml schema)
// ---------------------------------------------------------------------------

/// Result file formats a run can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `results.json`
    Json,
    /// `report.md`
    Markdown,
    /// `missing_citations.csv`
    Csv,
}

impl OutputFormat {
    /// File name written for this format.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Json => "results.json",
            Self::Markdown => "report.md",
            Self::Csv => "missing_citations.csv",
        }
    }
}

/// Zotero library kind, which selects the `/users` or `/groups` API prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

impl LibraryType {
    /// Path segment used by the Zotero Web API.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Group => "groups",
        }
    }
}

/// Top-level run config, deserialized from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Wikiversity pages to analyze.
    #[serde(default)]
    pub wikiversity_urls: Vec<String>,

    /// Title similarity at or above which a Zotero item counts as a match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Lower bound for candidates reported as potential matches.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Which result files to write.
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,

    /// Zotero library kind.
    #[serde(default)]
    pub zotero_library_type: LibraryType,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_request_concurrency")]
    pub request_concurrency: u32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            wikiversity_urls: Vec::new(),
            similarity_threshold: default_similarity_threshold(),
            review_threshold: default_review_threshold(),
            output_formats: default_output_formats(),
            zotero_library_type: LibraryType::default(),
            request_concurrency: default_request_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.8
}
fn default_review_threshold() -> f64 {
    0.6
}
fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Json]
}
fn default_request_concurrency() -> u32 {
    4
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl RunConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("review_threshold", self.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CitecheckError::config(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }

        if self.request_concurrency == 0 {
            return Err(CitecheckError::config("request_concurrency must be at least 1"));
        }

        if self.request_timeout_secs == 0 {
            return Err(CitecheckError::config("request_timeout_secs must be at least 1"));
        }

        Ok(())
    }

    /// Whether the run should write the given format.
    pub fn emits(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<RunConfig> {
    // An empty file is a valid, all-defaults config.
    if content.trim().is_empty() {
        return Ok(RunConfig::default());
    }

    let config: RunConfig = serde_yaml::from_str(content)
        .map_err(|e| CitecheckError::config(format!("invalid config: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Load the run config from a file path.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CitecheckError::io(path, e))?;

    parse_config(&content).map_err(|e| match e {
        CitecheckError::Config { message } => {
            CitecheckError::config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Zotero credentials resolved from the environment.
#[derive(Clone)]
pub struct ZoteroCredentials {
    pub user_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for ZoteroCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroCredentials")
            .field("user_id", &self.user_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Read `ZOTERO_USER_ID` and `ZOTERO_API_KEY`; both must be set and non-empty.
pub fn load_credentials() -> Result<ZoteroCredentials> {
    credentials_from(|name| std::env::var(name).ok())
}

fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Result<ZoteroCredentials> {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    match (read(CREDENTIAL_USER_ID_ENV), read(CREDENTIAL_API_KEY_ENV)) {
        (Some(user_id), Some(api_key)) => Ok(ZoteroCredentials { user_id, api_key }),
        _ => Err(CitecheckError::config(format!(
            "missing Zotero credentials. Set the {CREDENTIAL_USER_ID_ENV} and \
             {CREDENTIAL_API_KEY_ENV} environment variables.\n\
             Get a key at https://www.zotero.org/settings/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = parse_config("wikiversity_urls:\n  - https://en.wikiversity.org/wiki/A\n")
            .expect("parse");
        assert_eq!(config.wikiversity_urls.len(), 1);
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.output_formats, vec![OutputFormat::Json]);
        assert_eq!(config.zotero_library_type, LibraryType::User);
        assert_eq!(config.request_concurrency, 4);
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
wikiversity_urls:
  - https://en.wikiversity.org/wiki/A
  - https://en.wikiversity.org/wiki/B
similarity_threshold: 0.75
output_formats: [json, markdown, csv]
zotero_library_type: group
notes: kept for humans
"#;
        let config = parse_config(yaml).expect("parse");
        assert_eq!(config.similarity_threshold, 0.75);
        assert!(config.emits(OutputFormat::Csv));
        assert!(config.emits(OutputFormat::Markdown));
        assert_eq!(config.zotero_library_type.path_segment(), "groups");
    }

    #[test]
    fn empty_document_is_default() {
        let config = parse_config("  \n").expect("parse");
        assert!(config.wikiversity_urls.is_empty());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = parse_config("similarity_threshold: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = parse_config("request_timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, CitecheckError::Config { .. }));
        assert!(err.to_string().contains("request_timeout_secs"));

        let config = parse_config("request_timeout_secs: 1\n").expect("parse");
        assert_eq!(config.request_timeout_secs, 1);
    }

    #[test]
    fn rejects_unknown_output_format() {
        let err = parse_config("output_formats: [pdf]\n").unwrap_err();
        assert!(matches!(err, CitecheckError::Config { .. }));
    }

    #[test]
    fn load_config_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "request_concurrency: 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn credentials_require_both_values() {
        let err = credentials_from(|name| {
            (name == CREDENTIAL_USER_ID_ENV).then(|| "12345".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("ZOTERO_API_KEY"));

        let blank = credentials_from(|_| Some("  ".to_string()));
        assert!(blank.is_err());

        let ok = credentials_from(|name| Some(format!("{name}-value"))).expect("credentials");
        assert_eq!(ok.user_id, "ZOTERO_USER_ID-value");
        assert!(!format!("{ok:?}").contains("ZOTERO_API_KEY-value"));
    }
}
