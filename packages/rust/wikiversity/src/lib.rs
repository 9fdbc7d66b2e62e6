//! Wikiversity page fetching and citation extraction.
//!
//! This crate provides:
//! - [`fetcher`] — bounded-concurrency page fetcher with SSRF protection
//! - [`extractors`] — citation extractors (reference lists, `{{cite}}` templates)
//! - [`ExtractorRegistry`] — runs every extractor over a page, in order

pub mod extractors;
pub mod fetcher;

pub use extractors::{
    CitationExtractor, CiteTemplateExtractor, ExtractorRegistry, PageSource,
    ReferenceListExtractor, parse_citation_text, parse_cite_template,
};
pub use fetcher::{FetchedPage, PageFetcher};
