//! Core comparison logic and orchestration for citecheck.
//!
//! This crate ties together page extraction, the Zotero library, matching,
//! and reporting into an end-to-end run, and keeps the report issue in sync.

pub mod issue;
pub mod matcher;
pub mod pipeline;
pub mod report;
