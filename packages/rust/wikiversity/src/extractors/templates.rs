//! MediaWiki `{{cite ...}}` template extractor.

use std::sync::LazyLock;

use citecheck_shared::Citation;
use regex::Regex;

use super::{CitationExtractor, PageSource};

static CITE_TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\{\{cite[^}]+\}\}").expect("valid regex"));

/// Finds `{{cite web}}`, `{{cite journal}}`, ... templates left in the page source.
pub struct CiteTemplateExtractor;

impl CitationExtractor for CiteTemplateExtractor {
    fn extract(&self, page: &PageSource<'_>) -> Vec<Citation> {
        CITE_TEMPLATE
            .find_iter(page.html)
            .filter_map(|m| parse_cite_template(m.as_str()))
            .map(|mut citation| {
                citation.source_url = Some(page.url.to_string());
                citation
            })
            .collect()
    }

    fn name(&self) -> &str {
        "cite-template"
    }
}

/// Parse one `{{cite ...}}` template. Returns `None` when it has no title.
pub fn parse_cite_template(template: &str) -> Option<Citation> {
    let inner = template.trim_matches(|c| c == '{' || c == '}');
    let mut parts = inner.split('|');

    let head = parts.next()?.trim();
    let kind = head
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("cite"))
        .map(|_| head[4..].trim().to_string())
        .unwrap_or_else(|| head.to_string());

    let mut citation = Citation {
        kind: Some(kind),
        raw_text: inner.to_string(),
        ..Default::default()
    };

    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "title" => citation.title = value.to_string(),
            "author" | "last" | "first" => {
                if !citation.author.is_empty() {
                    citation.author.push(' ');
                }
                citation.author.push_str(value);
            }
            "url" => citation.url = value.to_string(),
            "date" | "year" => citation.date = value.to_string(),
            "journal" | "website" => citation.journal = value.to_string(),
            _ => {}
        }
    }

    (!citation.title.is_empty()).then_some(citation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn parses_web_template() {
        let c = parse_cite_template(
            "{{cite web |url=https://example.org/a |title=Example Page |website=Example |date=2020-05-01}}",
        )
        .expect("citation");
        assert_eq!(c.kind.as_deref(), Some("web"));
        assert_eq!(c.title, "Example Page");
        assert_eq!(c.url, "https://example.org/a");
        assert_eq!(c.journal, "Example");
        assert_eq!(c.date, "2020-05-01");
        assert!(c.raw_text.starts_with("cite web"));
    }

    #[test]
    fn template_without_title_is_dropped() {
        assert!(parse_cite_template("{{cite book |last=Doe |year=2001}}").is_none());
    }

    #[test]
    fn value_may_contain_equals_sign() {
        let c = parse_cite_template("{{Cite web|title=Query|url=https://example.org/?q=a}}")
            .expect("citation");
        assert_eq!(c.kind.as_deref(), Some("web"));
        assert_eq!(c.url, "https://example.org/?q=a");
    }

    #[test]
    fn finds_templates_case_insensitively_across_lines() {
        let html = "<pre>{{CITE journal\n |title=Open Access\n |journal=Nature}}</pre>\
                    <pre>{{cite web |url=https://x.org}}</pre>";
        let doc = Html::parse_document(html);
        let page = PageSource {
            url: "https://en.wikiversity.org/wiki/T",
            html,
            doc: &doc,
        };
        let found = CiteTemplateExtractor.extract(&page);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Open Access");
        assert_eq!(found[0].journal, "Nature");
    }
}
