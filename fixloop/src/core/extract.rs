//! Structured diagnostic extraction from raw lint output.
//!
//! The scanner walks the text line by line looking for diagnostic blocks:
//!
//! ```text
//! error[E0308]: mismatched types        <- header (coded)
//!  --> src/main.rs:3:5                  <- location, must follow the header
//! 3 |     let x: i32 = "a";             <- body: excerpt lines (`N |`, `  |`)
//!   |                  ^^^ expected i32
//!   = note: ...                         <- body: annotation lines (`=`)
//! ```
//!
//! Body lines are consumed greedily until the first line that is neither an
//! excerpt nor an annotation line.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::DiagnosticRecord;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"error\[(?P<code>E\d+)\]: (?P<title>.*)$").expect("header regex is valid")
});
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-->\s.*:\d+:\d+\s*$").expect("location regex is valid")
});
static EXCERPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d*\s*\|").expect("excerpt regex is valid"));
static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*=").expect("annotation regex is valid"));

/// Extract coded diagnostics from raw lint output, in report order.
///
/// Extraction is fail-soft: text that does not fit the block grammar is
/// skipped, never reported as an error. In particular:
///
/// - headers without a category code (`error: unclosed delimiter`,
///   `warning: unused variable`) contribute nothing, even when followed by a
///   well-formed location and body;
/// - a header not immediately followed by a location line is skipped;
/// - a block whose title or body is empty is dropped.
///
/// Under-reporting a cycle's diagnostics is preferred over aborting the
/// repair loop on unexpected tool output. The function is pure: the same
/// input always yields the same records in the same order.
pub fn extract(raw_text: &str) -> Vec<DiagnosticRecord> {
    let lines: Vec<&str> = raw_text.lines().collect();
    let mut records = Vec::new();
    let mut cursor = 0;
    while cursor < lines.len() {
        match match_block(&lines, cursor) {
            Some((record, next)) => {
                records.push(record);
                cursor = next;
            }
            None => cursor += 1,
        }
    }
    records
}

/// Try to match a block whose header sits at `start`.
///
/// Returns the record and the index of the first line after the block.
fn match_block(lines: &[&str], start: usize) -> Option<(DiagnosticRecord, usize)> {
    let header = HEADER_RE.captures(lines[start])?;
    let location = lines
        .get(start + 1)
        .copied()
        .filter(|line| LOCATION_RE.is_match(line))?;

    let body_start = start + 2;
    let body_end = lines[body_start..]
        .iter()
        .position(|line| !is_body_line(line))
        .map_or(lines.len(), |offset| body_start + offset);

    let title = header["title"].trim();
    let context = lines[body_start..body_end].join("\n");
    let context = context.trim();
    if title.is_empty() || context.is_empty() {
        return None;
    }

    let record = DiagnosticRecord {
        code: header["code"].to_string(),
        title: title.to_string(),
        location: location.trim().to_string(),
        context: context.to_string(),
        help: None,
    };
    Some((record, body_end))
}

fn is_body_line(line: &str) -> bool {
    EXCERPT_RE.is_match(line) || ANNOTATION_RE.is_match(line)
}
