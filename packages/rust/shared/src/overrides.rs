//! Manual URL override for `config.yaml`.
//!
//! A comma-separated URL list (e.g. from a manual CI dispatch) replaces the
//! `wikiversity_urls` value of the config document. The rewrite is a textual
//! splice so that comments, key order, and formatting of every other key stay
//! byte-for-byte identical.

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::{info, instrument};

use crate::error::{CitecheckError, Result};

/// The config key replaced by the override.
pub const URLS_KEY: &str = "wikiversity_urls";

/// What [`apply_override`] did to the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// Input held no URLs; the file was not touched.
    Skipped,
    /// The file was rewritten with these URLs.
    Applied { urls: Vec<String> },
}

/// Split a comma-separated list into trimmed, non-empty entries, keeping order.
pub fn parse_url_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Replace the top-level `wikiversity_urls` value in `document` with `urls`.
///
/// The key is appended when absent. Everything outside the replaced value is
/// returned unchanged.
pub fn override_urls(document: &str, urls: &[String]) -> Result<String> {
    let before = ensure_mapping(document)?;

    let lines: Vec<&str> = document.split_inclusive('\n').collect();
    let replacement_for = |newline: &str| render_block(urls, newline);

    let output = match find_key_span(&lines) {
        Some((start, end)) => {
            let newline = if lines[start].ends_with("\r\n") { "\r\n" } else { "\n" };
            let mut out = String::with_capacity(document.len());
            out.extend(lines[..start].iter().copied());
            out.push_str(&replacement_for(newline)?);
            out.extend(lines[end..].iter().copied());
            out
        }
        None => {
            let newline = if document.contains("\r\n") { "\r\n" } else { "\n" };
            let mut out = document.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push_str(newline);
            }
            out.push_str(&replacement_for(newline)?);
            out
        }
    };

    verify_splice(&output, &before, urls)?;
    Ok(output)
}

/// Apply a comma-separated override to the config file at `path`.
///
/// Input that yields no URLs leaves the file untouched.
#[instrument(skip(input), fields(path = %path.display()))]
pub fn apply_override(path: &Path, input: &str) -> Result<OverrideOutcome> {
    let urls = parse_url_list(input);
    if urls.is_empty() {
        info!("no override URLs given, using config as-is");
        return Ok(OverrideOutcome::Skipped);
    }

    let document = std::fs::read_to_string(path).map_err(|e| CitecheckError::io(path, e))?;
    let updated = override_urls(&document, &urls)?;
    std::fs::write(path, updated).map_err(|e| CitecheckError::io(path, e))?;

    info!(count = urls.len(), "overrode {URLS_KEY}");
    Ok(OverrideOutcome::Applied { urls })
}

// ---------------------------------------------------------------------------
// Splice helpers
// ---------------------------------------------------------------------------

/// The document must be empty or a mapping for the key to make sense.
fn ensure_mapping(document: &str) -> Result<Mapping> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| CitecheckError::parse(format!("config is not valid YAML: {e}")))?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(CitecheckError::parse("config root must be a mapping")),
    }
}

/// Line range `[start, end)` holding the key and its value.
fn find_key_span(lines: &[&str]) -> Option<(usize, usize)> {
    let start = lines.iter().position(|line| key_rest(line).is_some())?;
    let rest = key_rest(lines[start]).unwrap_or("");
    let rest = strip_comment(rest);

    // Inline value: scalar or flow sequence, possibly spanning lines.
    if !rest.is_empty() {
        let mut depth = bracket_delta(rest);
        let mut end = start + 1;
        while depth > 0 && end < lines.len() {
            depth += bracket_delta(strip_comment(lines[end]));
            end += 1;
        }
        return Some((start, end));
    }

    // Block value: indented lines, or `-` items at column zero.
    let mut end = start + 1;
    let mut last_content = start + 1;
    while end < lines.len() {
        let line = lines[end];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            end += 1;
            continue;
        }
        let dash_item = line.starts_with('-') && !line.starts_with("---");
        if line.starts_with(' ') || line.starts_with('\t') || dash_item {
            end += 1;
            last_content = end;
            continue;
        }
        break;
    }

    // Trailing blanks and comments belong to whatever follows.
    Some((start, last_content))
}

/// If `line` declares the top-level key, return the text after its colon.
fn key_rest(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    for quoted in [URLS_KEY.to_string(), format!("\"{URLS_KEY}\""), format!("'{URLS_KEY}'")] {
        if let Some(after) = line.strip_prefix(quoted.as_str()) {
            if let Some(rest) = after.trim_start().strip_prefix(':') {
                return Some(rest);
            }
        }
    }
    None
}

/// `text` without a trailing `# comment`. A `#` inside quotes, or not
/// preceded by whitespace, is part of the value.
fn strip_comment(text: &str) -> &str {
    let trimmed = text.trim();
    let cut = unquoted_chars(trimmed)
        .find(|&(idx, c, prev)| c == '#' && (idx == 0 || prev.is_some_and(char::is_whitespace)))
        .map(|(idx, _, _)| idx);

    match cut {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed,
    }
}

/// Net `[`/`]` nesting change, ignoring brackets inside quotes.
fn bracket_delta(text: &str) -> i32 {
    unquoted_chars(text).fold(0, |depth, (_, c, _)| match c {
        '[' => depth + 1,
        ']' => depth - 1,
        _ => depth,
    })
}

/// Characters outside quoted scalars, as `(byte index, char, previous char)`.
///
/// A quote only opens at the start of a token (after whitespace or a flow
/// indicator), so apostrophes inside plain scalars are not mistaken for one.
fn unquoted_chars(text: &str) -> impl Iterator<Item = (usize, char, Option<char>)> + '_ {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    text.char_indices().filter_map(move |(idx, c)| {
        let before = prev.replace(c);
        match quote {
            Some(q) => {
                let escaped = q == '"' && before == Some('\\');
                if c == q && !escaped {
                    quote = None;
                }
                None
            }
            None => {
                let token_start = before.is_none_or(|p| p.is_whitespace() || "[{,:".contains(p));
                if matches!(c, '"' | '\'') && token_start {
                    quote = Some(c);
                    None
                } else {
                    Some((idx, c, before))
                }
            }
        }
    })
}

fn render_block(urls: &[String], newline: &str) -> Result<String> {
    if urls.is_empty() {
        return Ok(format!("{URLS_KEY}: []{newline}"));
    }

    let mut block = format!("{URLS_KEY}:{newline}");
    for url in urls {
        // serde_yaml quotes the scalar only when plain style would be ambiguous.
        let scalar = serde_yaml::to_string(url)
            .map_err(|e| CitecheckError::parse(format!("cannot encode URL {url:?}: {e}")))?;
        block.push_str("  - ");
        block.push_str(scalar.trim_end());
        block.push_str(newline);
    }
    Ok(block)
}

/// The spliced document must hold exactly `urls` under the key and every
/// other top-level key unchanged from `before`.
fn verify_splice(document: &str, before: &Mapping, urls: &[String]) -> Result<()> {
    let after = match serde_yaml::from_str::<Value>(document) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(_) => return Err(CitecheckError::validation("override produced a non-mapping document")),
        Err(e) => {
            return Err(CitecheckError::parse(format!("override produced invalid YAML: {e}")));
        }
    };

    let read_back: Option<Vec<String>> = after
        .get(URLS_KEY)
        .and_then(|v| serde_yaml::from_value(v.clone()).ok());
    if read_back.as_deref() != Some(urls) {
        return Err(CitecheckError::validation(format!(
            "override of {URLS_KEY} did not read back as written"
        )));
    }

    let is_urls_key = |key: &Value| key.as_str() == Some(URLS_KEY);
    let siblings_before = before.iter().filter(|&(k, _)| !is_urls_key(k));
    let siblings_after = after.iter().filter(|&(k, _)| !is_urls_key(k));
    if !siblings_before.eq(siblings_after) {
        return Err(CitecheckError::validation(format!(
            "override of {URLS_KEY} would change other config keys"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_trims_and_drops_blanks() {
        assert_eq!(
            parse_url_list("https://a.org , ,https://b.org"),
            urls(&["https://a.org", "https://b.org"])
        );
        assert!(parse_url_list("").is_empty());
        assert!(parse_url_list(" , ,, ").is_empty());
    }

    #[test]
    fn parse_keeps_order_and_duplicates() {
        assert_eq!(
            parse_url_list("c, a, b, a"),
            urls(&["c", "a", "b", "a"])
        );
    }

    #[test]
    fn replaces_block_sequence_only() {
        let doc = "# Citation comparison settings\n\
                   wikiversity_urls:\n  - https://old.org/1\n  - https://old.org/2\n\n\
                   # matching\nsimilarity_threshold: 0.8   # tuned\n\
                   output_formats:\n  - json\n  - csv\n";
        let out = override_urls(doc, &urls(&["https://a.org", "https://b.org"])).expect("splice");

        assert!(out.starts_with("# Citation comparison settings\nwikiversity_urls:\n"));
        assert!(out.contains("  - https://a.org\n  - https://b.org\n"));
        assert!(!out.contains("old.org"));
        assert!(out.ends_with(
            "\n# matching\nsimilarity_threshold: 0.8   # tuned\noutput_formats:\n  - json\n  - csv\n"
        ));
    }

    #[test]
    fn replaces_unindented_sequence() {
        let doc = "wikiversity_urls:\n- https://old.org\n- https://old2.org\noutput_formats: [json]\n";
        let out = override_urls(doc, &urls(&["https://new.org"])).expect("splice");
        assert_eq!(out, "wikiversity_urls:\n  - https://new.org\noutput_formats: [json]\n");
    }

    #[test]
    fn replaces_multiline_flow_sequence() {
        let doc = "a: 1\nwikiversity_urls: [\n  \"https://x.org\",\n  \"https://y.org\"\n]\nb: 2\n";
        let out = override_urls(doc, &urls(&["https://z.org"])).expect("splice");
        assert_eq!(out, "a: 1\nwikiversity_urls:\n  - https://z.org\nb: 2\n");
    }

    #[test]
    fn hash_inside_quoted_flow_entry_is_not_a_comment() {
        let doc = "wikiversity_urls: [\"https://a.org/x #y\"]\nkeep: 1\n";
        let out = override_urls(doc, &urls(&["https://n.org"])).expect("splice");
        assert_eq!(out, "wikiversity_urls:\n  - https://n.org\nkeep: 1\n");
    }

    #[test]
    fn comment_after_multiline_flow_sequence_is_stripped() {
        let doc = "wikiversity_urls: [ # pages to check\n  'https://it''s.org/#a',\n  \"https://x.org/\\\"#b\"\n] # end\nkeep: 1\n";
        let out = override_urls(doc, &urls(&["https://n.org"])).expect("splice");
        assert_eq!(out, "wikiversity_urls:\n  - https://n.org\nkeep: 1\n");
    }

    #[test]
    fn strip_comment_respects_quotes() {
        assert_eq!(strip_comment("[\"a #b\"]  # note"), "[\"a #b\"]");
        assert_eq!(strip_comment("[a#b] # note"), "[a#b]");
        assert_eq!(strip_comment("# only a comment"), "");
        assert_eq!(bracket_delta("[\"]\", '[x'"), 1);
    }

    #[test]
    fn verification_rejects_changed_siblings() {
        let before = ensure_mapping("wikiversity_urls: []\nkeep: 1\n").expect("mapping");
        let err = verify_splice(
            "wikiversity_urls:\n  - https://n.org\n",
            &before,
            &urls(&["https://n.org"]),
        )
        .unwrap_err();
        assert!(matches!(err, CitecheckError::Validation { .. }));

        verify_splice(
            "wikiversity_urls:\n  - https://n.org\nkeep: 1\n",
            &before,
            &urls(&["https://n.org"]),
        )
        .expect("siblings intact");
    }

    #[test]
    fn appends_missing_key() {
        let doc = "similarity_threshold: 0.9";
        let out = override_urls(doc, &urls(&["https://a.org"])).expect("splice");
        assert_eq!(out, "similarity_threshold: 0.9\nwikiversity_urls:\n  - https://a.org\n");
    }

    #[test]
    fn quotes_urls_that_need_it() {
        let doc = "wikiversity_urls: []\n";
        let odd = urls(&["https://a.org/page#section: two"]);
        let out = override_urls(doc, &odd).expect("splice");
        let value: serde_yaml::Value = serde_yaml::from_str(&out).expect("yaml");
        assert_eq!(value[URLS_KEY][0].as_str(), Some("https://a.org/page#section: two"));
    }

    #[test]
    fn preserves_crlf_line_endings() {
        let doc = "wikiversity_urls:\r\n  - https://old.org\r\nkeep: yes\r\n";
        let out = override_urls(doc, &urls(&["https://a.org"])).expect("splice");
        assert_eq!(out, "wikiversity_urls:\r\n  - https://a.org\r\nkeep: yes\r\n");
    }

    #[test]
    fn nested_key_with_same_name_is_not_replaced() {
        let doc = "profile:\n  wikiversity_urls: [https://keep.org]\n";
        let out = override_urls(doc, &urls(&["https://a.org"])).expect("splice");
        assert!(out.starts_with(doc));
        assert!(out.ends_with("wikiversity_urls:\n  - https://a.org\n"));
    }

    #[test]
    fn rejects_non_mapping_root() {
        let err = override_urls("- just\n- a list\n", &urls(&["https://a.org"])).unwrap_err();
        assert!(matches!(err, CitecheckError::Parse { .. }));
    }

    #[test]
    fn apply_skips_empty_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        let original = "wikiversity_urls:\n  - https://old.org\n# trailing comment\n";
        std::fs::write(&path, original).expect("write");

        for input in ["", "  ", " , , "] {
            assert_eq!(apply_override(&path, input).expect("apply"), OverrideOutcome::Skipped);
        }
        assert_eq!(std::fs::read_to_string(&path).expect("read"), original);
    }

    #[test]
    fn apply_rewrites_file_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "wikiversity_urls: []\nsimilarity_threshold: 0.7\n").expect("write");

        let outcome = apply_override(&path, "https://a.org, https://b.org").expect("apply");
        assert_eq!(
            outcome,
            OverrideOutcome::Applied {
                urls: urls(&["https://a.org", "https://b.org"])
            }
        );

        let config = crate::load_config(&path).expect("reload");
        assert_eq!(config.wikiversity_urls, urls(&["https://a.org", "https://b.org"]));
        assert_eq!(config.similarity_threshold, 0.7);
    }
}
