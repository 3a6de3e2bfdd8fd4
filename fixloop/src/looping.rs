//! Lint → extract → repair loop for `fixloop run`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::extract::extract;
use crate::core::types::{
    CodeExplanation, DiagnosticRecord, RepairCycleState, SourceVersion, render_diagnostics,
};
use crate::io::agent::{RepairAgent, RepairRequest, RepairResponse};
use crate::io::config::FixConfig;
use crate::io::init::FixPaths;
use crate::io::iteration_log::{IterationMeta, IterationWriteRequest, new_run_id, write_iteration};
use crate::io::lint::{CommandRequest, LintOutput, LintRunner};
use crate::io::source_store::SourceStore;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The latest lint pass reported no diagnostics.
    Converged {
        /// Lint passes run, including the clean one.
        iterations: u32,
    },
    /// `max_iterations` repairs ran and diagnostics remain.
    MaxIterationsExceeded {
        max_iterations: u32,
        /// Diagnostics reported by the final lint pass.
        remaining: usize,
    },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub repairs_executed: u32,
    pub stop: LoopStop,
}

/// Progress of one cycle.
///
/// Every lint pass is reported once with `response: None` as soon as its
/// diagnostics are known. A pass that triggers a repair is reported a second
/// time with the agent's response once the candidate has been written.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport<'a> {
    pub iter: u32,
    pub source_version: u32,
    pub diagnostics: &'a [DiagnosticRecord],
    pub response: Option<&'a RepairResponse>,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub workdir: PathBuf,
    pub max_iterations: u32,
    pub lint_timeout: Duration,
    pub output_limit_bytes: usize,
    /// Write per-iteration artifacts here when set.
    pub iterations_dir: Option<PathBuf>,
}

impl LoopConfig {
    pub fn from_config(root: &Path, cfg: &FixConfig) -> Self {
        Self {
            workdir: root.to_path_buf(),
            max_iterations: cfg.max_iterations,
            lint_timeout: cfg.lint_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            iterations_dir: cfg
                .log_iterations
                .then(|| FixPaths::new(root).iterations_dir),
        }
    }

    fn command_request(&self) -> CommandRequest {
        CommandRequest {
            workdir: self.workdir.clone(),
            timeout: self.lint_timeout,
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Lint, extract, and repair until a lint pass comes back clean or
/// `max_iterations` repairs have been spent.
///
/// The source read at start is the committed version. A repaired candidate is
/// committed only once the following lint pass completes; if that pass fails,
/// the committed source is written back before the error is returned.
/// Any collaborator failure stops the loop immediately.
#[instrument(skip_all, fields(max_iterations = config.max_iterations, source = %store.describe()))]
pub fn run_loop<L, A, S, F>(
    lint_runner: &L,
    agent: &A,
    store: &S,
    config: &LoopConfig,
    mut on_cycle: F,
) -> Result<LoopOutcome>
where
    L: LintRunner,
    A: RepairAgent,
    S: SourceStore,
    F: FnMut(&CycleReport<'_>),
{
    let run_id = new_run_id();
    let request = config.command_request();
    let source_path = store.describe();

    let mut committed = SourceVersion::initial(store.read().context("read source")?);
    let mut candidate: Option<SourceVersion> = None;
    let mut repairs_executed = 0u32;
    let mut iter = 0u32;
    let mut explained: HashMap<String, Option<String>> = HashMap::new();

    loop {
        iter += 1;
        let started = Instant::now();

        let lint = match lint_runner.lint(&request) {
            Ok(lint) => lint,
            Err(err) => {
                if candidate.is_some() {
                    warn!(version = committed.version, "lint failed after repair; restoring committed source");
                    store
                        .write(&committed.text)
                        .context("restore committed source")?;
                }
                return Err(err.context("run lint command"));
            }
        };
        if let Some(next) = candidate.take() {
            committed = next;
        }

        let state = RepairCycleState {
            iter,
            diagnostics: extract(&lint.stderr),
            source: committed.clone(),
        };
        info!(
            iter,
            source_version = state.source.version,
            diagnostics = state.diagnostics.len(),
            "lint pass"
        );

        if state.is_converged() {
            if !lint.success {
                warn!(iter, "lint failed without coded diagnostics; treating as converged");
            }
            record_cycle(config, &run_id, &state, &lint, None, started);
            on_cycle(&CycleReport {
                iter,
                source_version: state.source.version,
                diagnostics: &state.diagnostics,
                response: None,
            });
            if let Err(err) = lint_runner.format(&request) {
                warn!(error = %format!("{err:#}"), "format pass failed");
            }
            return Ok(LoopOutcome {
                run_id,
                repairs_executed,
                stop: LoopStop::Converged { iterations: iter },
            });
        }

        debug!(diagnostics = %render_diagnostics(&state.diagnostics), "extracted diagnostics");
        on_cycle(&CycleReport {
            iter,
            source_version: state.source.version,
            diagnostics: &state.diagnostics,
            response: None,
        });

        if repairs_executed >= config.max_iterations {
            record_cycle(config, &run_id, &state, &lint, None, started);
            return Ok(LoopOutcome {
                run_id,
                repairs_executed,
                stop: LoopStop::MaxIterationsExceeded {
                    max_iterations: config.max_iterations,
                    remaining: state.diagnostics.len(),
                },
            });
        }

        let explanations =
            explain_codes(lint_runner, &request, &state.diagnostics, &mut explained);
        let response = agent
            .repair(&RepairRequest {
                path: &source_path,
                source: &state.source.text,
                diagnostics: &state.diagnostics,
                explanations: &explanations,
            })
            .context("request repair")?;
        debug!(response = %response.raw, "agent response");

        store
            .write(&response.source)
            .context("write candidate source")?;
        candidate = Some(committed.succeed(response.source.clone()));
        repairs_executed += 1;

        record_cycle(config, &run_id, &state, &lint, Some(&response), started);
        on_cycle(&CycleReport {
            iter,
            source_version: state.source.version,
            diagnostics: &state.diagnostics,
            response: Some(&response),
        });
    }
}

/// Explanations for the distinct codes in `diagnostics`, in first-seen order.
///
/// Lookups are cached in `explained` for the whole run. Failures are logged and
/// leave the code unexplained.
fn explain_codes<L: LintRunner>(
    lint_runner: &L,
    request: &CommandRequest,
    diagnostics: &[DiagnosticRecord],
    explained: &mut HashMap<String, Option<String>>,
) -> Vec<CodeExplanation> {
    let mut explanations: Vec<CodeExplanation> = Vec::new();
    for diagnostic in diagnostics {
        let code = diagnostic.code.as_str();
        if explanations.iter().any(|explanation| explanation.code == code) {
            continue;
        }
        let text = explained
            .entry(code.to_string())
            .or_insert_with(|| match lint_runner.explain(code, request) {
                Ok(text) => text,
                Err(err) => {
                    warn!(code, error = %format!("{err:#}"), "explain failed");
                    None
                }
            });
        if let Some(text) = text {
            explanations.push(CodeExplanation {
                code: code.to_string(),
                text: text.clone(),
            });
        }
    }
    explanations
}

fn record_cycle(
    config: &LoopConfig,
    run_id: &str,
    state: &RepairCycleState,
    lint: &LintOutput,
    response: Option<&RepairResponse>,
    started: Instant,
) {
    let Some(iterations_dir) = config.iterations_dir.as_deref() else {
        return;
    };
    let meta = IterationMeta {
        run_id: run_id.to_string(),
        iter: state.iter,
        source_version: state.source.version,
        lint_success: lint.success,
        diagnostics: state.diagnostics.len(),
        repaired: response.is_some(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    let written = write_iteration(&IterationWriteRequest {
        iterations_dir,
        meta: &meta,
        lint,
        diagnostics: &state.diagnostics,
        response,
    });
    if let Err(err) = written {
        warn!(iter = state.iter, error = %format!("{err:#}"), "failed to write iteration log");
    }
}
