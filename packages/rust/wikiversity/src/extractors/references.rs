//! Rendered reference-list extractor.
//!
//! MediaWiki renders footnotes into `<ol class="references">` inside a
//! `mw-references-wrap` div; hand-written pages often use a "Bibliography"
//! section instead. Both are treated as reference containers and each list
//! item is parsed as free-form citation text.

use std::collections::HashSet;
use std::sync::LazyLock;

use citecheck_shared::Citation;
use regex::Regex;
use scraper::{ElementRef, Selector};

use super::{CitationExtractor, PageSource};

/// Entries this short are footnote markers or "ibid."-style stubs.
const MIN_CITATION_CHARS: usize = 20;

/// Titles this short are usually an author initial or abbreviation.
const MIN_TITLE_CHARS: usize = 10;

static CONTAINER_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"references|bibliography").expect("valid regex"));

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("valid regex")
});

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

/// Extracts citations from rendered reference lists and bibliography sections.
pub struct ReferenceListExtractor;

impl CitationExtractor for ReferenceListExtractor {
    fn extract(&self, page: &PageSource<'_>) -> Vec<Citation> {
        let container_sel = Selector::parse("div, section, references, ol.references").unwrap();
        let item_sel = Selector::parse("li, cite, ref").unwrap();

        let mut seen = HashSet::new();
        let mut citations = Vec::new();

        for container in page.doc.select(&container_sel) {
            if !is_reference_container(&container) {
                continue;
            }

            for item in container.select(&item_sel) {
                // Nested containers would otherwise yield the same item twice.
                if !seen.insert(item.id()) {
                    continue;
                }
                if item.value().name() != "li" && inside_list_item(&item, &container) {
                    continue;
                }

                let text = collapse_whitespace(item.text());
                if text.chars().count() <= MIN_CITATION_CHARS {
                    continue;
                }

                citations.push(parse_citation_text(&text, page.url));
            }
        }

        citations
    }

    fn name(&self) -> &str {
        "reference-list"
    }
}

fn is_reference_container(el: &ElementRef<'_>) -> bool {
    match el.value().name() {
        "references" | "ol" => true,
        _ => el.value().classes().any(|c| CONTAINER_CLASS.is_match(c)),
    }
}

/// Whether `item` sits inside an `<li>` below `container`.
fn inside_list_item(item: &ElementRef<'_>, container: &ElementRef<'_>) -> bool {
    for node in item.ancestors() {
        if node.id() == container.id() {
            return false;
        }
        if node.value().as_element().is_some_and(|el| el.name() == "li") {
            return true;
        }
    }
    false
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined: String = parts.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse free-form citation text into a [`Citation`].
///
/// Heuristic: the first URL and the first 19xx/20xx year are picked out, and
/// the text before the first period is taken as the title when it is long
/// enough to be one.
pub fn parse_citation_text(text: &str, source_url: &str) -> Citation {
    let url = URL_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let date = YEAR_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let title = if text.contains('.') {
        let candidate = text.split('.').next().unwrap_or("").trim();
        if candidate.chars().count() > MIN_TITLE_CHARS {
            candidate.to_string()
        } else {
            String::new()
        }
    } else {
        String::new()
    };

    Citation {
        kind: None,
        title,
        author: String::new(),
        url,
        date,
        journal: String::new(),
        raw_text: text.to_string(),
        source_url: Some(source_url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const SOURCE: &str = "https://en.wikiversity.org/wiki/Test";

    fn extract(html: &str) -> Vec<Citation> {
        let doc = Html::parse_document(html);
        let page = PageSource {
            url: SOURCE,
            html,
            doc: &doc,
        };
        ReferenceListExtractor.extract(&page)
    }

    #[test]
    fn parses_url_year_and_title() {
        let c = parse_citation_text(
            "Learning Theories Explained. Published 2015 at https://example.org/theories (accessed 2021).",
            SOURCE,
        );
        assert_eq!(c.title, "Learning Theories Explained");
        assert_eq!(c.date, "2015");
        assert_eq!(c.url, "https://example.org/theories");
        assert_eq!(c.source_url.as_deref(), Some(SOURCE));
    }

    #[test]
    fn short_leading_segment_is_not_a_title() {
        let c = parse_citation_text("Doe, J. An essay on learning without a year", SOURCE);
        assert_eq!(c.title, "");
        assert_eq!(c.date, "");
        assert_eq!(c.url, "");
    }

    #[test]
    fn year_must_be_whole_word() {
        let c = parse_citation_text("Catalogue number 120199 of the archive collection.", SOURCE);
        assert_eq!(c.date, "");
    }

    #[test]
    fn bibliography_section_is_a_container() {
        let html = r#"<html><body>
            <section class="bibliography">
              <ul>
                <li>Freire, Paulo. Pedagogy of the Oppressed. Continuum, 1970.</li>
              </ul>
            </section>
            <ul><li>Not a reference: some navigation entry that is long.</li></ul>
        </body></html>"#;
        let citations = extract(html);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].date, "1970");
    }

    #[test]
    fn nested_containers_do_not_duplicate() {
        let html = r#"<html><body>
            <div class="reflist">
              <div class="mw-references-wrap">
                <ol class="references">
                  <li><cite class="citation">Illich, Ivan. Deschooling Society. 1971.</cite></li>
                  <li>Dewey, John. Democracy and Education. Macmillan, 1916.</li>
                </ol>
              </div>
            </div>
        </body></html>"#;
        let citations = extract(html);
        assert_eq!(citations.len(), 2);
        assert!(citations[0].raw_text.starts_with("Illich, Ivan"));
        assert!(citations[1].raw_text.starts_with("Dewey, John"));
    }

    #[test]
    fn standalone_cite_outside_list_is_taken() {
        let html = r#"<html><body>
            <div class="references-small">
              <p><cite>Vygotsky, Lev. Mind in Society. Harvard University Press, 1978.</cite></p>
            </div>
        </body></html>"#;
        let citations = extract(html);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].date, "1978");
    }

    #[test]
    fn whitespace_is_collapsed() {
        let html = "<html><body><ol class=\"references\"><li>Piaget,\n   Jean.   <i>The Origins\n of Intelligence</i>. 1952.</li></ol></body></html>";
        let citations = extract(html);
        assert_eq!(citations[0].raw_text, "Piaget, Jean. The Origins of Intelligence. 1952.");
    }
}
