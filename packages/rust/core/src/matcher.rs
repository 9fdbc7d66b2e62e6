//! Citation-to-library matching.
//!
//! Titles are normalized and compared with the Ratcliff/Obershelp ratio
//! (`2·M / T`, where `M` is the number of characters in matching blocks and
//! `T` the combined length). URLs count as a match when equal or nearly so.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

use citecheck_shared::{
    Citation, ComparisonResults, FoundCitation, PotentialMatch, RunConfig, ZoteroItem, ZoteroMatch,
};

/// URL similarity above which two URLs are treated as the same resource.
const URL_SIMILARITY: f64 = 0.9;

/// Candidates kept on a potential match.
const MAX_POTENTIAL_CANDIDATES: usize = 3;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Thresholds used for one comparison.
#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    /// Title similarity at or above which a candidate is a match.
    pub similarity_threshold: f64,
    /// Lowest title similarity kept as a candidate.
    pub review_threshold: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for MatchSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            review_threshold: config.review_threshold,
        }
    }
}

impl MatchSettings {
    fn candidate_floor(&self) -> f64 {
        self.review_threshold.min(self.similarity_threshold)
    }
}

// ---------------------------------------------------------------------------
// String similarity
// ---------------------------------------------------------------------------

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ratcliff/Obershelp similarity in `[0, 1]`. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Total size of the matching blocks found by recursive longest-match splitting.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` / `b[blo..bhi]`; earliest in `a` wins ties.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    // j2len[j] = length of the match ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next.insert(j, k);
                if k > best_len {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_len = k;
                }
            }
        }
        j2len = next;
    }

    (best_i, best_j, best_len)
}

// ---------------------------------------------------------------------------
// Candidate search
// ---------------------------------------------------------------------------

/// A library item with its normalized title computed once.
struct LibraryEntry<'a> {
    item: &'a ZoteroItem,
    title: String,
}

/// Zotero library prepared for repeated candidate searches.
pub struct PreparedLibrary<'a> {
    entries: Vec<LibraryEntry<'a>>,
}

impl<'a> PreparedLibrary<'a> {
    /// Normalize every item title; untitled items (notes, attachments) are dropped.
    pub fn new(items: &'a [ZoteroItem]) -> Self {
        let entries = items
            .iter()
            .filter_map(|item| {
                let title = normalize_title(&item.data.title);
                (!title.is_empty()).then_some(LibraryEntry { item, title })
            })
            .collect();
        Self { entries }
    }

    /// Number of titled items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no titled items exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates for `citation`, best title similarity first.
    pub fn candidates(&self, citation: &Citation, settings: &MatchSettings) -> Vec<ZoteroMatch> {
        let wiki_title = normalize_title(&citation.title);
        if wiki_title.is_empty() {
            return Vec::new();
        }

        let floor = settings.candidate_floor();
        let mut matches: Vec<ZoteroMatch> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let title_similarity = similarity(&wiki_title, &entry.title);
                let url_match = urls_match(&citation.url, &entry.item.data.url);

                (title_similarity >= floor || url_match).then(|| ZoteroMatch {
                    zotero_item: entry.item.clone(),
                    title_similarity,
                    url_match,
                })
            })
            .collect();

        // Stable: equal scores keep library order.
        matches.sort_by(|a, b| b.title_similarity.total_cmp(&a.title_similarity));
        matches
    }
}

fn urls_match(wiki_url: &str, zotero_url: &str) -> bool {
    if wiki_url.is_empty() || zotero_url.is_empty() {
        return false;
    }
    wiki_url == zotero_url || similarity(wiki_url, zotero_url) > URL_SIMILARITY
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify every citation as found, missing, or needing review.
#[instrument(skip_all, fields(citations = citations.len(), library = items.len()))]
pub fn compare_citations(
    citations: Vec<Citation>,
    items: &[ZoteroItem],
    settings: &MatchSettings,
) -> ComparisonResults {
    let library = PreparedLibrary::new(items);
    if library.is_empty() {
        warn!("Zotero library has no titled items; every citation will be reported missing");
    }

    let mut missing = Vec::new();
    let mut found = Vec::new();
    let mut potential = Vec::new();

    for citation in citations {
        let mut candidates = library.candidates(&citation, settings);

        let Some(best) = candidates.first() else {
            missing.push(citation);
            continue;
        };

        // A URL match further down the list still identifies the item.
        let hit = if best.title_similarity >= settings.similarity_threshold {
            Some(0)
        } else {
            candidates.iter().position(|m| m.url_match)
        };

        if let Some(idx) = hit {
            let zotero_match = candidates.swap_remove(idx);
            debug!(
                title = %citation.title,
                score = zotero_match.title_similarity,
                url_match = zotero_match.url_match,
                "found in library"
            );
            found.push(FoundCitation {
                wikiversity_citation: citation,
                zotero_match,
            });
        } else {
            candidates.truncate(MAX_POTENTIAL_CANDIDATES);
            potential.push(PotentialMatch {
                wikiversity_citation: citation,
                possible_matches: candidates,
            });
        }
    }

    ComparisonResults::new(missing, found, potential)
}
