//! Lint/format runner adapter (`cargo clippy` / `cargo fmt` by default).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::io::config::FixConfig;
use crate::io::process::run_command;

/// Where and how long to run a toolchain command.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured lint output. `stderr` carries the diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status of the lint command. A failing lint is not an error.
    pub success: bool,
}

pub trait LintRunner {
    /// Run the lint command. Errors only when the command cannot be run to
    /// completion (spawn failure, timeout).
    fn lint(&self, request: &CommandRequest) -> Result<LintOutput>;

    /// Run the formatter over the project.
    fn format(&self, request: &CommandRequest) -> Result<()>;

    /// Long-form explanation of a diagnostic code, `None` when the toolchain
    /// has none to offer.
    fn explain(&self, code: &str, request: &CommandRequest) -> Result<Option<String>>;
}

/// Runs configured external commands.
#[derive(Debug, Clone)]
pub struct CommandLintRunner {
    lint_command: Vec<String>,
    format_command: Vec<String>,
    explain_command: Vec<String>,
}

impl CommandLintRunner {
    pub fn new(lint_command: Vec<String>, format_command: Vec<String>) -> Self {
        Self {
            lint_command,
            format_command,
            explain_command: Vec::new(),
        }
    }

    pub fn with_explain_command(mut self, explain_command: Vec<String>) -> Self {
        self.explain_command = explain_command;
        self
    }

    pub fn from_config(cfg: &FixConfig) -> Self {
        Self::new(cfg.lint.command.clone(), cfg.format.command.clone())
            .with_explain_command(cfg.lint.explain_command.clone())
    }
}

impl LintRunner for CommandLintRunner {
    #[instrument(skip_all, fields(command = %self.lint_command.join(" ")))]
    fn lint(&self, request: &CommandRequest) -> Result<LintOutput> {
        let output = run_command(
            &self.lint_command,
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )?;
        if output.timed_out {
            bail!(
                "`{}` timed out after {:?}",
                self.lint_command.join(" "),
                request.timeout
            );
        }
        debug!(exit_code = ?output.status.code(), stderr_bytes = output.stderr.len(), "lint finished");
        Ok(LintOutput {
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            success: output.status.success(),
        })
    }

    #[instrument(skip_all, fields(command = %self.format_command.join(" ")))]
    fn format(&self, request: &CommandRequest) -> Result<()> {
        let output = run_command(
            &self.format_command,
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )?;
        if output.timed_out {
            bail!(
                "`{}` timed out after {:?}",
                self.format_command.join(" "),
                request.timeout
            );
        }
        if !output.status.success() {
            bail!(
                "`{}` failed with status {:?}: {}",
                self.format_command.join(" "),
                output.status.code(),
                output.stderr_text().trim()
            );
        }
        Ok(())
    }

    #[instrument(skip_all, fields(code))]
    fn explain(&self, code: &str, request: &CommandRequest) -> Result<Option<String>> {
        if self.explain_command.is_empty() {
            return Ok(None);
        }
        let mut argv = self.explain_command.clone();
        argv.push(code.to_string());
        let output = run_command(
            &argv,
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )?;
        if output.timed_out {
            bail!("`{}` timed out after {:?}", argv.join(" "), request.timeout);
        }
        if !output.status.success() {
            debug!(exit_code = ?output.status.code(), "no explanation available");
            return Ok(None);
        }
        let text = output.stdout_text().trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn request(workdir: &std::path::Path, timeout: Duration) -> CommandRequest {
        CommandRequest {
            workdir: workdir.to_path_buf(),
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn failing_lint_returns_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandLintRunner::new(
            sh("echo 'error[E0308]: mismatched types' >&2; exit 101"),
            sh("true"),
        );
        let output = runner
            .lint(&request(temp.path(), Duration::from_secs(10)))
            .expect("lint");
        assert!(!output.success);
        assert_eq!(output.stderr, "error[E0308]: mismatched types\n");
    }

    #[test]
    fn lint_timeout_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandLintRunner::new(sh("exec sleep 5"), sh("true"));
        let err = runner
            .lint(&request(temp.path(), Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn format_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandLintRunner::new(sh("true"), sh("echo bad >&2; exit 1"));
        let err = runner
            .format(&request(temp.path(), Duration::from_secs(10)))
            .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn explain_appends_the_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandLintRunner::new(sh("true"), sh("true"))
            .with_explain_command(vec!["echo".to_string(), "explaining".to_string()]);
        let text = runner
            .explain("E0308", &request(temp.path(), Duration::from_secs(10)))
            .expect("explain");
        assert_eq!(text.as_deref(), Some("explaining E0308"));
    }

    #[test]
    fn explain_failure_or_disabled_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), Duration::from_secs(10));
        let failing = CommandLintRunner::new(sh("true"), sh("true")).with_explain_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "exit 1".to_string(),
        ]);
        assert_eq!(failing.explain("E9999", &req).expect("explain"), None);

        let disabled = CommandLintRunner::new(sh("true"), sh("true"));
        assert_eq!(disabled.explain("E0308", &req).expect("explain"), None);
    }

    #[test]
    fn lint_runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker"), "").expect("marker");
        let runner = CommandLintRunner::new(sh("ls >&2"), sh("true"));
        let output = runner
            .lint(&request(temp.path(), Duration::from_secs(10)))
            .expect("lint");
        assert!(output.stderr.contains("marker"));
    }
}
