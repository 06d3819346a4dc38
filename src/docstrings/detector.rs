//! Line-scanning docstring detection
//!
//! Runs every pattern registered for a language over the document's lines,
//! concatenates the hits in registration order, drops exact-position
//! duplicates and builds [`DocumentationBlock`]s with their previews.
//!
//! # Scanning
//!
//! Multiline patterns open on a `start` hit and close on the first line
//! (from the opening line, inclusive) matching `end`. On the opening line the
//! end marker is only searched after the start marker, so `"""` cannot close
//! itself. A block with no closing line before EOF is dropped and scanning
//! resumes on the next line. Per-line patterns collect a run of consecutive
//! lines that each match `start`.
//!
//! Once a scan has proven that no line after some index matches `end`, later
//! candidates only check their own opening line, keeping a pattern's scan
//! linear in the number of lines.

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use super::block::DocumentationBlock;
use super::cancellation::CancellationToken;
use super::pattern::DetectionPattern;
use super::pattern_registry::PatternRegistry;
use super::preview::{DEFAULT_MAX_PREVIEW_LENGTH, extract_preview};

/// Boundaries of a candidate block before preview extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start_line: usize,
    start_column: usize,
    end_line: usize,
    end_column: usize,
}

impl Span {
    fn key(&self) -> (usize, usize, usize, usize) {
        (self.start_line, self.start_column, self.end_line, self.end_column)
    }
}

/// Outcome of one detection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub blocks: Vec<DocumentationBlock>,
    /// True if cancellation was observed before every pattern ran
    pub cancelled: bool,
}

/// Detection engine bound to one registry snapshot
#[derive(Debug, Clone)]
pub struct DocstringDetector {
    registry: Arc<PatternRegistry>,
    max_preview_length: usize,
}

impl DocstringDetector {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            max_preview_length: DEFAULT_MAX_PREVIEW_LENGTH,
        }
    }

    pub fn with_max_preview_length(mut self, max_preview_length: usize) -> Self {
        self.max_preview_length = max_preview_length;
        self
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn max_preview_length(&self) -> usize {
        self.max_preview_length
    }

    /// Detects documentation blocks, returning only the blocks
    pub fn detect(&self, text: &str, language: &str, cancel: &CancellationToken) -> Vec<DocumentationBlock> {
        self.run(text, language, cancel).blocks
    }

    /// Detects documentation blocks and reports whether the pass was cut short
    pub fn run(&self, text: &str, language: &str, cancel: &CancellationToken) -> Detection {
        let patterns = self.registry.lookup(language);
        if patterns.is_empty() {
            trace!("No patterns registered for '{}'", language);
            return Detection::default();
        }

        let lines: Vec<&str> = text.lines().collect();
        let mut candidates: Vec<(Span, &DetectionPattern)> = Vec::new();
        let mut cancelled = false;

        for pattern in patterns {
            if cancel.is_cancelled() {
                debug!(
                    "Detection for '{}' cancelled before pattern '{}'",
                    language, pattern.name
                );
                cancelled = true;
                break;
            }

            match catch_unwind(AssertUnwindSafe(|| scan_pattern(pattern, &lines))) {
                Ok(spans) => {
                    trace!("Pattern '{}' found {} blocks", pattern.name, spans.len());
                    candidates.extend(spans.into_iter().map(|span| (span, pattern.as_ref())));
                }
                Err(_) => {
                    warn!(
                        "Pattern '{}' for '{}' failed during scanning; its results are skipped",
                        pattern.name, language
                    );
                }
            }
        }

        let initial_count = candidates.len();
        let blocks: Vec<DocumentationBlock> = deduplicate(candidates)
            .into_iter()
            .map(|(span, pattern)| self.build_block(&lines, span, pattern, language))
            .collect();

        debug!(
            "Detected {} documentation blocks for '{}' ({} lines, deduplicated from {})",
            blocks.len(),
            language,
            lines.len(),
            initial_count
        );

        Detection { blocks, cancelled }
    }

    fn build_block(
        &self,
        lines: &[&str],
        span: Span,
        pattern: &DetectionPattern,
        language: &str,
    ) -> DocumentationBlock {
        let raw_content = lines[span.start_line..=span.end_line].join("\n");
        let preview = extract_preview(pattern.family.extractor(), &raw_content, self.max_preview_length);

        DocumentationBlock {
            start_line: span.start_line,
            start_column: span.start_column,
            end_line: span.end_line,
            end_column: span.end_column,
            raw_content,
            preview,
            language: language.to_string(),
            is_single_line: span.start_line == span.end_line,
        }
    }
}

/// Keeps the first candidate for every position tuple
fn deduplicate<'p>(candidates: Vec<(Span, &'p DetectionPattern)>) -> Vec<(Span, &'p DetectionPattern)> {
    let mut seen = FxHashSet::default();
    candidates
        .into_iter()
        .filter(|(span, _)| {
            let fresh = seen.insert(span.key());
            if !fresh {
                trace!("Skipping duplicate block at lines {}-{}", span.start_line, span.end_line);
            }
            fresh
        })
        .collect()
}

fn scan_pattern(pattern: &DetectionPattern, lines: &[&str]) -> Vec<Span> {
    if pattern.multiline {
        scan_multiline(pattern, lines)
    } else {
        scan_per_line(pattern, lines)
    }
}

fn scan_multiline(pattern: &DetectionPattern, lines: &[&str]) -> Vec<Span> {
    let mut spans = Vec::new();
    // No line at or after this index matches `end`
    let mut end_free_from = lines.len();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let Some(start) = pattern.start.find(line) else {
            i += 1;
            continue;
        };
        let start_column = marker_column(line, start.start);

        if let Some(single) = &pattern.single_line {
            if let Some(m) = single.find(line) {
                spans.push(Span {
                    start_line: i,
                    start_column,
                    end_line: i,
                    end_column: char_column(line, trimmed_end(line, m)),
                });
                i += 1;
                continue;
            }
        }

        let remainder = &line[start.end..];
        let closing = match pattern.end.find(remainder) {
            Some(m) => Some((i, start.end + m.end)),
            None => {
                let search_to = end_free_from.max(i + 1);
                (i + 1..search_to)
                    .find_map(|j| pattern.end.find(lines[j]).map(|m| (j, m.end)))
            }
        };

        match closing {
            Some((j, end_byte)) => {
                spans.push(Span {
                    start_line: i,
                    start_column,
                    end_line: j,
                    end_column: char_column(lines[j], end_byte),
                });
                i = j + 1;
            }
            None => {
                trace!(
                    "Unterminated '{}' block at line {}; skipping",
                    pattern.name, i
                );
                end_free_from = end_free_from.min(i + 1);
                i += 1;
            }
        }
    }

    spans
}

fn scan_per_line(pattern: &DetectionPattern, lines: &[&str]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let Some(start) = pattern.start.find(line) else {
            i += 1;
            continue;
        };

        let mut j = i;
        while j + 1 < lines.len() && pattern.start.is_match(lines[j + 1]) {
            j += 1;
        }

        spans.push(Span {
            start_line: i,
            start_column: marker_column(line, start.start),
            end_line: j,
            end_column: lines[j].trim_end().chars().count(),
        });
        i = j + 1;
    }

    spans
}

/// Column of the first non-whitespace character at or after `byte`
fn marker_column(line: &str, byte: usize) -> usize {
    let rest = &line[byte..];
    let skipped = rest.len() - rest.trim_start().len();
    char_column(line, byte + skipped)
}

fn char_column(line: &str, byte: usize) -> usize {
    line[..byte].chars().count()
}

fn trimmed_end(line: &str, m: Range<usize>) -> usize {
    m.start + line[m].trim_end().len()
}
