//! Core domain types shared by extraction, comparison, and reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one comparison run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Citation
// ---------------------------------------------------------------------------

/// A citation extracted from a Wikiversity page.
///
/// String fields are empty when the extractor could not determine them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Template kind (`web`, `journal`, ...) for `{{cite ...}}` citations.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub journal: String,
    /// The text the citation was parsed from.
    pub raw_text: String,
    /// Page the citation was found on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Citation {
    /// Title for display, falling back to a placeholder.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "No title"
        } else {
            &self.title
        }
    }
}

// ---------------------------------------------------------------------------
// Zotero items
// ---------------------------------------------------------------------------

/// An item from the Zotero Web API (`format=json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoteroItem {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub data: ZoteroItemData,
}

/// The `data` object of a Zotero item. Fields we do not use are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoteroItemData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "itemType", default)]
    pub item_type: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Comparison results
// ---------------------------------------------------------------------------

/// A Zotero item judged similar to a citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoteroMatch {
    pub zotero_item: ZoteroItem,
    /// Ratcliff/Obershelp ratio of the normalized titles.
    pub title_similarity: f64,
    pub url_match: bool,
}

/// A citation that is already in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundCitation {
    pub wikiversity_citation: Citation,
    pub zotero_match: ZoteroMatch,
}

/// A citation with close-but-not-sufficient candidates; needs manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialMatch {
    pub wikiversity_citation: Citation,
    pub possible_matches: Vec<ZoteroMatch>,
}

/// Counts over the classified citations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_wikiversity_citations: usize,
    pub found_in_zotero: usize,
    pub missing_from_zotero: usize,
    pub potential_matches: usize,
}

/// Fetch outcome for one configured page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub url: String,
    /// HTTP status, absent when the request never got a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// SHA-256 of the page body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub citations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full `results.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResults {
    pub missing_from_zotero: Vec<Citation>,
    pub found_in_zotero: Vec<FoundCitation>,
    pub potential_matches: Vec<PotentialMatch>,
    pub summary: Summary,
    #[serde(default)]
    pub sources: Vec<SourceReport>,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
}

impl ComparisonResults {
    /// Build results from classified lists, deriving the summary from their lengths.
    pub fn new(
        missing_from_zotero: Vec<Citation>,
        found_in_zotero: Vec<FoundCitation>,
        potential_matches: Vec<PotentialMatch>,
    ) -> Self {
        let summary = Summary {
            total_wikiversity_citations: missing_from_zotero.len()
                + found_in_zotero.len()
                + potential_matches.len(),
            found_in_zotero: found_in_zotero.len(),
            missing_from_zotero: missing_from_zotero.len(),
            potential_matches: potential_matches.len(),
        };

        Self {
            missing_from_zotero,
            found_in_zotero,
            potential_matches,
            summary,
            sources: Vec::new(),
            run_id: RunId::new(),
            generated_at: Utc::now(),
        }
    }
}
