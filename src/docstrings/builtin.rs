//! Built-in detection patterns
//!
//! Compiled once per process and shared through `Arc`s by every registry
//! created with [`PatternRegistry::with_builtins`](super::PatternRegistry::with_builtins).

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::pattern::{DetectionPattern, SyntaxFamily};

/// Languages using `/** ... */` doc comments
pub const BLOCK_COMMENT_LANGUAGES: &[&str] = &[
    "javascript",
    "javascriptreact",
    "typescript",
    "typescriptreact",
    "java",
    "kotlin",
    "scala",
    "php",
    "c",
    "cpp",
    "objective-c",
    "groovy",
];

/// Languages using consecutive `///` doc lines
pub const LINE_PREFIX_LANGUAGES: &[&str] = &["rust", "csharp", "fsharp", "swift", "dart"];

/// Languages using triple-quoted docstrings
pub const TRIPLE_QUOTE_LANGUAGES: &[&str] = &["python"];

static BUILTIN_PATTERNS: Lazy<Vec<Arc<DetectionPattern>>> = Lazy::new(build_builtin_patterns);

pub fn builtin_patterns() -> &'static [Arc<DetectionPattern>] {
    &BUILTIN_PATTERNS
}

fn build_builtin_patterns() -> Vec<Arc<DetectionPattern>> {
    let mut patterns = Vec::new();

    for &language in TRIPLE_QUOTE_LANGUAGES {
        patterns.push(
            DetectionPattern::block(
                language,
                SyntaxFamily::TripleQuote,
                r#"^\s*[rRuUbB]?""""#,
                r#"""""#,
                Some(r#"^\s*[rRuUbB]?""".*"""\s*$"#),
            )
            .expect("built-in triple-double-quote pattern")
            .named(format!("{language}-triple-double")),
        );
        patterns.push(
            DetectionPattern::block(
                language,
                SyntaxFamily::TripleQuote,
                r"^\s*[rRuUbB]?'''",
                r"'''",
                Some(r"^\s*[rRuUbB]?'''.*'''\s*$"),
            )
            .expect("built-in triple-single-quote pattern")
            .named(format!("{language}-triple-single")),
        );
    }

    let block_comment = DetectionPattern::block(
        BLOCK_COMMENT_LANGUAGES[0],
        SyntaxFamily::BlockComment,
        r"^\s*/\*\*([^/*]|$)",
        r"\*/",
        Some(r"^\s*/\*\*.*\*/"),
    )
    .expect("built-in block comment pattern");
    for &language in BLOCK_COMMENT_LANGUAGES {
        patterns.push(
            block_comment
                .for_language(language)
                .named(format!("{language}-block-comment")),
        );
    }

    let triple_slash = DetectionPattern::per_line(
        LINE_PREFIX_LANGUAGES[0],
        SyntaxFamily::LinePrefix,
        r"^\s*///([^/]|$)",
    )
    .expect("built-in triple-slash pattern");
    for &language in LINE_PREFIX_LANGUAGES {
        patterns.push(
            triple_slash
                .for_language(language)
                .named(format!("{language}-triple-slash")),
        );
    }

    patterns.push(
        DetectionPattern::per_line("rust", SyntaxFamily::LinePrefix, r"^\s*//!")
            .expect("built-in inner doc pattern")
            .named("rust-inner-doc"),
    );

    patterns.into_iter().map(Arc::new).collect()
}
