//! Preview extraction for collapsed documentation blocks
//!
//! Each syntax family knows how to strip its own markers. Everything after
//! marker stripping (markup handling, first-line selection, truncation and
//! fallback) is shared.

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_MAX_PREVIEW_LENGTH: usize = 60;
pub const ELLIPSIS: &str = "...";

static TRIPLE_QUOTE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*[rRuUbBfF]{0,2}("""|''')"#).expect("valid triple-quote open regex"));
static TRIPLE_QUOTE_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""""|'''"#).expect("valid triple-quote regex"));
static SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<summary>(.*?)</summary>").expect("valid summary regex"));
static MARKUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid markup tag regex"));

/// Marker stripping for one comment-syntax family
pub trait PreviewExtractor: Send + Sync {
    /// Returns the block's lines with comment markers removed
    fn strip_markers(&self, raw: &str) -> Vec<String>;

    /// Label used when the stripped block has no text
    fn fallback_label(&self) -> &'static str;

    /// Whether XML-like markup (`<summary>`, `<para>`, ...) is interpreted
    fn interprets_markup(&self) -> bool {
        true
    }
}

pub struct TripleQuoteExtractor;

impl PreviewExtractor for TripleQuoteExtractor {
    fn strip_markers(&self, raw: &str) -> Vec<String> {
        let mut lines = raw.lines();
        let Some(first) = lines.next() else {
            return Vec::new();
        };

        // The opener fixes which delimiter closes the block
        let (opening, delimiter) = match TRIPLE_QUOTE_OPEN.captures(first) {
            Some(caps) => {
                let opener_end = caps.get(0).map_or(0, |m| m.end());
                let delimiter = caps.get(1).map(|m| m.as_str());
                (cut_at_close(&first[opener_end..], delimiter), delimiter)
            }
            None => (cut_at_close(first, None), None),
        };

        std::iter::once(opening)
            .chain(lines.map(|line| cut_at_close(line, delimiter)))
            .collect()
    }

    fn fallback_label(&self) -> &'static str {
        "Docstring"
    }

    fn interprets_markup(&self) -> bool {
        false
    }
}

/// Text before the first closing triple quote, or the whole line
fn cut_at_close(line: &str, delimiter: Option<&str>) -> String {
    let end = match delimiter {
        Some(delimiter) => line.find(delimiter),
        None => TRIPLE_QUOTE_MARK.find(line).map(|m| m.start()),
    };
    line[..end.unwrap_or(line.len())].to_string()
}

pub struct BlockCommentExtractor;

impl PreviewExtractor for BlockCommentExtractor {
    fn strip_markers(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .map(|line| {
                let mut text = line.trim_start();
                let opening = text.strip_prefix("/**");
                if let Some(rest) = opening {
                    text = rest;
                }
                // Anything after the close is code, not documentation
                if let Some(end) = text.find("*/") {
                    text = text[..end].trim_end_matches('*');
                }
                if opening.is_some() {
                    text = text.trim_start_matches('*');
                }
                let trimmed = text.trim_start();
                match trimmed.strip_prefix('*') {
                    Some(rest) => rest.to_string(),
                    None => text.to_string(),
                }
            })
            .collect()
    }

    fn fallback_label(&self) -> &'static str {
        "Documentation"
    }
}

pub struct LinePrefixExtractor;

impl PreviewExtractor for LinePrefixExtractor {
    fn strip_markers(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .map(|line| {
                let text = line.trim_start();
                text.strip_prefix("///")
                    .or_else(|| text.strip_prefix("//!"))
                    .unwrap_or(text)
                    .to_string()
            })
            .collect()
    }

    fn fallback_label(&self) -> &'static str {
        "Documentation"
    }
}

/// Block text with markers removed and surrounding blank lines dropped
///
/// Used for hover content, where the whole block is shown.
pub fn strip_content(extractor: &dyn PreviewExtractor, raw: &str) -> String {
    let lines = extractor.strip_markers(raw);
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());

    match (first, last) {
        (Some(first), Some(last)) => {
            let body = &lines[first..=last];
            let indent = body
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.len() - l.trim_start().len())
                .min()
                .unwrap_or(0);
            body.iter()
                .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()).trim_end())
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => String::new(),
    }
}

/// Derives the one-line preview for a block
pub fn extract_preview(extractor: &dyn PreviewExtractor, raw: &str, max_length: usize) -> String {
    let text = extractor.strip_markers(raw).join("\n");

    let body = if extractor.interprets_markup() {
        let inner = SUMMARY
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or(text);
        MARKUP_TAG.replace_all(&inner, "").into_owned()
    } else {
        text
    };

    let first_line = body.lines().map(str::trim).find(|line| !line.is_empty());

    match first_line {
        Some(line) => truncate_preview(line, max_length),
        None => truncate_preview(extractor.fallback_label(), max_length),
    }
}

/// Truncates to `max_length` characters, ending in `...` when cut
pub fn truncate_preview(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    if max_length < ELLIPSIS.len() {
        return text.chars().take(max_length).collect();
    }

    let mut truncated: String = text.chars().take(max_length - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_quote_single_line() {
        let preview = extract_preview(&TripleQuoteExtractor, r#"    """Hello world""""#, 60);
        assert_eq!(preview, "Hello world");
    }

    #[test]
    fn test_triple_quote_skips_blank_opening_line() {
        let raw = "    '''\n    Compute the thing.\n\n    More detail.\n    '''";
        assert_eq!(extract_preview(&TripleQuoteExtractor, raw, 60), "Compute the thing.");
    }

    #[test]
    fn test_raw_string_prefix_stripped() {
        let preview = extract_preview(&TripleQuoteExtractor, r#"    r"""Regex \d helper""""#, 60);
        assert_eq!(preview, r"Regex \d helper");
    }

    #[test]
    fn test_triple_quote_keeps_angle_brackets() {
        let preview = extract_preview(&TripleQuoteExtractor, r#""""Returns <b>bold</b>""""#, 60);
        assert_eq!(preview, "Returns <b>bold</b>");
    }

    #[test]
    fn test_empty_docstring_falls_back() {
        assert_eq!(extract_preview(&TripleQuoteExtractor, r#""""""""#, 60), "Docstring");
        assert_eq!(extract_preview(&BlockCommentExtractor, "/**\n */", 60), "Documentation");
    }

    #[test]
    fn test_block_comment_first_line() {
        let raw = "/**\n * First line\n * more\n */";
        assert_eq!(extract_preview(&BlockCommentExtractor, raw, 60), "First line");
    }

    #[test]
    fn test_block_comment_inline_text() {
        assert_eq!(extract_preview(&BlockCommentExtractor, "/** Inline doc */", 60), "Inline doc");
        assert_eq!(extract_preview(&BlockCommentExtractor, "/**Tight*/", 60), "Tight");
    }

    #[test]
    fn test_block_comment_drops_code_after_close() {
        assert_eq!(extract_preview(&BlockCommentExtractor, "/** Inline doc */ int x;", 60), "Inline doc");
        assert_eq!(extract_preview(&BlockCommentExtractor, "/*** Stars ***/", 60), "Stars");

        let raw = "/**\n * Body\n */ public void run() {}";
        assert_eq!(strip_content(&BlockCommentExtractor, raw), "Body");
    }

    #[test]
    fn test_triple_quote_drops_code_after_close() {
        let preview = extract_preview(&TripleQuoteExtractor, r#"    """Doc""" # trailing"#, 60);
        assert_eq!(preview, "Doc");

        let raw = "    '''\n    Summary.\n    ''' ; x = 1";
        assert_eq!(strip_content(&TripleQuoteExtractor, raw), "Summary.");
    }

    #[test]
    fn test_triple_quote_other_delimiter_is_text() {
        let raw = "    \"\"\"Use ''' for raw blocks.\n    \"\"\"";
        assert_eq!(extract_preview(&TripleQuoteExtractor, raw, 60), "Use ''' for raw blocks.");
    }

    #[test]
    fn test_block_comment_strips_html_tags() {
        let raw = "/**\n * <p>Creates a <code>Widget</code>.\n */";
        assert_eq!(extract_preview(&BlockCommentExtractor, raw, 60), "Creates a Widget.");
    }

    #[test]
    fn test_summary_preferred() {
        let raw = "/// <remarks>ignored</remarks>\n/// <summary>\n/// Gets the name.\n/// </summary>";
        assert_eq!(extract_preview(&LinePrefixExtractor, raw, 60), "Gets the name.");
    }

    #[test]
    fn test_summary_on_one_line() {
        let raw = "/// <summary>Adds two numbers.</summary>\n/// <param name=\"a\">First</param>";
        assert_eq!(extract_preview(&LinePrefixExtractor, raw, 60), "Adds two numbers.");
    }

    #[test]
    fn test_inner_doc_prefix() {
        assert_eq!(extract_preview(&LinePrefixExtractor, "//! Crate docs", 60), "Crate docs");
    }

    #[test]
    fn test_truncation_exact_length() {
        let long = "x".repeat(80);
        let preview = truncate_preview(&long, 60);
        assert_eq!(preview.chars().count(), 60);
        assert!(preview.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let text = "é".repeat(10);
        assert_eq!(truncate_preview(&text, 10), text);
        let cut = truncate_preview(&text, 5);
        assert_eq!(cut, "éé...");
    }

    #[test]
    fn test_tiny_limit_never_exceeded() {
        assert_eq!(truncate_preview("abcdef", 2), "ab");
        assert_eq!(extract_preview(&LinePrefixExtractor, "///", 4), "D...");
    }

    #[test]
    fn test_strip_content_dedents() {
        let raw = "    \"\"\"\n    Summary.\n\n        indented\n    \"\"\"";
        assert_eq!(strip_content(&TripleQuoteExtractor, raw), "Summary.\n\n    indented");
    }
}
