//! Shared deterministic types for the repair loop core.
//!
//! These types define stable contracts between the extractor, the controller
//! and the collaborators. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One coded diagnostic reported by the lint tool.
///
/// `code`, `title`, `location` and `context` are always non-empty for records
/// produced by [`crate::core::extract::extract`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Category code, e.g. `E0308`.
    pub code: String,
    /// One-line summary from the header.
    pub title: String,
    /// Location line as printed by the tool (e.g. `--> src/main.rs:3:5`).
    pub location: String,
    /// Source excerpt, pointer lines and `=` notes, verbatim.
    pub context: String,
    /// Supplementary guidance. Not extracted yet.
    pub help: Option<String>,
}

/// Renders the record in the same layout the extractor reads.
///
/// Re-extracting the rendering yields an equal record (minus `help`).
impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error[{}]: {}", self.code, self.title)?;
        writeln!(f, " {}", self.location)?;
        writeln!(f, "{}", self.context)?;
        if let Some(help) = &self.help {
            writeln!(f, "help: {help}")?;
        }
        Ok(())
    }
}

/// Render a record sequence as diagnostic text, blocks separated by blank lines.
pub fn render_diagnostics(records: &[DiagnosticRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Long-form explanation of a diagnostic code (`rustc --explain E0308`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeExplanation {
    pub code: String,
    pub text: String,
}

/// A numbered snapshot of the project source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVersion {
    /// 0 for the source found on disk at start, incremented per repair.
    pub version: u32,
    pub text: String,
}

impl SourceVersion {
    pub fn initial(text: String) -> Self {
        Self { version: 0, text }
    }

    /// Next version carrying `text`.
    pub fn succeed(&self, text: String) -> Self {
        Self {
            version: self.version + 1,
            text,
        }
    }
}

/// Loop-scoped state for a single lint iteration.
///
/// Built after each lint pass and dropped once the iteration ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairCycleState {
    /// Iteration number (1-indexed).
    pub iter: u32,
    /// Diagnostics extracted from the latest lint output, in report order.
    pub diagnostics: Vec<DiagnosticRecord>,
    /// Source the diagnostics were reported against.
    pub source: SourceVersion,
}

impl RepairCycleState {
    pub fn is_converged(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str) -> DiagnosticRecord {
        DiagnosticRecord {
            code: code.to_string(),
            title: "mismatched types".to_string(),
            location: "--> src/main.rs:3:5".to_string(),
            context: "3 |     let x: i32 = \"a\";\n  |                  ^^^ expected i32".to_string(),
            help: None,
        }
    }

    #[test]
    fn display_uses_rustc_layout() {
        let text = record("E0308").to_string();
        assert_eq!(
            text,
            "error[E0308]: mismatched types\n --> src/main.rs:3:5\n3 |     let x: i32 = \"a\";\n  |                  ^^^ expected i32\n"
        );
    }

    #[test]
    fn render_separates_blocks_with_blank_line() {
        let text = render_diagnostics(&[record("E0308"), record("E0425")]);
        assert!(text.contains("expected i32\n\nerror[E0425]"));
    }

    #[test]
    fn source_versions_increment() {
        let v0 = SourceVersion::initial("fn main() {}\n".to_string());
        let v1 = v0.succeed("fn main() { }\n".to_string());
        assert_eq!(v0.version, 0);
        assert_eq!(v1.version, 1);
    }

    #[test]
    fn cycle_state_converges_without_diagnostics() {
        let state = RepairCycleState {
            iter: 1,
            diagnostics: Vec::new(),
            source: SourceVersion::initial(String::new()),
        };
        assert!(state.is_converged());
    }
}
