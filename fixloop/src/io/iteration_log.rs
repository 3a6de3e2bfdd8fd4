//! Per-iteration artifacts under `.fixloop/iterations/`.
//!
//! Write-only operator output; nothing here is read back by the loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::core::types::DiagnosticRecord;
use crate::io::agent::RepairResponse;
use crate::io::lint::LintOutput;

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta {
    pub run_id: String,
    pub iter: u32,
    /// Version of the source the lint ran against.
    pub source_version: u32,
    pub lint_success: bool,
    pub diagnostics: usize,
    pub repaired: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub lint_log_path: PathBuf,
    pub diagnostics_path: PathBuf,
    pub response_path: PathBuf,
    pub candidate_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iterations_dir: &Path, run_id: &str, iter: u32) -> Self {
        let dir = iterations_dir.join(run_id).join(iter.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            lint_log_path: dir.join("lint.log"),
            diagnostics_path: dir.join("diagnostics.json"),
            response_path: dir.join("response.md"),
            candidate_path: dir.join("candidate.rs"),
            dir,
        }
    }
}

pub struct IterationWriteRequest<'a> {
    pub iterations_dir: &'a Path,
    pub meta: &'a IterationMeta,
    pub lint: &'a LintOutput,
    pub diagnostics: &'a [DiagnosticRecord],
    pub response: Option<&'a RepairResponse>,
}

/// UTC timestamp, to the millisecond, identifying one `fixloop run`.
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

pub fn write_iteration(request: &IterationWriteRequest<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(
        request.iterations_dir,
        &request.meta.run_id,
        request.meta.iter,
    );
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_text(&paths.lint_log_path, &render_lint_log(request.lint))?;
    write_json(&paths.diagnostics_path, &request.diagnostics)?;
    if let Some(response) = request.response {
        write_text(&paths.response_path, &response.raw)?;
        write_text(&paths.candidate_path, &response.source)?;
    }

    Ok(paths)
}

fn render_lint_log(lint: &LintOutput) -> String {
    format!(
        "=== stdout ===\n{}\n=== stderr ===\n{}",
        lint.stdout, lint.stderr
    )
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
