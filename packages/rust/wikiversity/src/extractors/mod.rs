//! Citation extractor trait and the built-in extractors.
//!
//! Each extractor looks at a page in one way (rendered reference lists, raw
//! `{{cite}}` templates). The registry runs all of them and concatenates
//! their output in registration order.

mod references;
mod templates;

use citecheck_shared::Citation;
use scraper::Html;
use tracing::debug;

pub use references::{ReferenceListExtractor, parse_citation_text};
pub use templates::{CiteTemplateExtractor, parse_cite_template};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A fetched page as seen by the extractors.
pub struct PageSource<'a> {
    /// The page URL, recorded as each citation's `source_url`.
    pub url: &'a str,
    /// Raw page body.
    pub html: &'a str,
    /// Parsed document.
    pub doc: &'a Html,
}

/// Trait for one way of finding citations in a page.
pub trait CitationExtractor: Send + Sync {
    /// Extract citations, in document order.
    fn extract(&self, page: &PageSource<'_>) -> Vec<Citation>;

    /// Human-readable extractor name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered extractors in run order.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn CitationExtractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with all built-in extractors (reference lists first).
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(ReferenceListExtractor),
                Box::new(CiteTemplateExtractor),
            ],
        }
    }

    /// Parse `html` and run every extractor over it.
    pub fn extract(&self, url: &str, html: &str) -> Vec<Citation> {
        let doc = Html::parse_document(html);
        let page = PageSource {
            url,
            html,
            doc: &doc,
        };

        let mut citations = Vec::new();
        for extractor in &self.extractors {
            let found = extractor.extract(&page);
            debug!(url, extractor = extractor.name(), count = found.len(), "extracted citations");
            citations.extend(found);
        }
        citations
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
