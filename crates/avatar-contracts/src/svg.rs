use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const EXTRACTION_FAILED_MESSAGE: &str = "Failed to extract valid SVG from response";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to extract valid SVG from response")]
pub struct ExtractionError;

fn svg_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Tag names fold ASCII case only; Unicode folding would accept `ſ` for `s`.
    // `.` crosses newlines and `*?` stops at the first closing tag.
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?i-u:svg).*?</(?i-u:svg)>").expect("static svg pattern")
    })
}

/// Returns the first `<svg …>…</svg>` span of `text`, unmodified.
///
/// Nothing inside the span is validated; malformed markup between the tags is
/// passed through as-is.
pub fn extract_svg(text: &str) -> Result<&str, ExtractionError> {
    svg_pattern()
        .find(text)
        .map(|found| found.as_str())
        .ok_or(ExtractionError)
}
