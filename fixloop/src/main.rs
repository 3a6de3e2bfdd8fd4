//! `fixloop`: drive a single-file project to a clean lint through an LLM.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fixloop::core::extract::extract;
use fixloop::core::types::render_diagnostics;
use fixloop::error::ConfigError;
use fixloop::exit_codes;
use fixloop::io::agent::{AgentConfig, Backend, HttpRepairAgent, resolve_api_key};
use fixloop::io::config::{AgentSettings, FixConfig, load_config};
use fixloop::io::init::{FixPaths, InitOptions, init_project};
use fixloop::io::lint::CommandLintRunner;
use fixloop::io::source_store::FileSourceStore;
use fixloop::logging;
use fixloop::looping::{CycleReport, LoopConfig, LoopStop, run_loop};

/// Environment override for the agent endpoint (proxies, gateways).
const BASE_URL_VAR: &str = "FIXLOOP_BASE_URL";

#[derive(Parser)]
#[command(
    name = "fixloop",
    version,
    about = "Lint, extract diagnostics, ask an LLM for a fix, repeat"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.fixloop/config.toml` in the current directory.
    Init {
        /// Repair attempts before giving up.
        #[arg(long)]
        max_iterations: u32,
        /// Timeout for each lint/format command.
        #[arg(long)]
        lint_timeout_secs: u64,
        /// Timeout for each agent request.
        #[arg(long)]
        agent_timeout_secs: u64,
        #[arg(long, value_enum)]
        backend: Backend,
        #[arg(long)]
        model: String,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the repair loop until the lint is clean or the cap is reached.
    Run {
        /// Project root containing `.fixloop/config.toml`.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Print diagnostics extracted from FILE (or stdin) as JSON.
    Extract { file: Option<PathBuf> },
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                exit_codes::CONFIG
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init {
            max_iterations,
            lint_timeout_secs,
            agent_timeout_secs,
            backend,
            model,
            force,
        } => {
            let cfg = FixConfig::new(
                max_iterations,
                lint_timeout_secs,
                agent_timeout_secs,
                AgentSettings {
                    backend,
                    model,
                    max_tokens: FixConfig::DEFAULT_MAX_TOKENS,
                },
            );
            cfg.validate()?;
            let paths = init_project(Path::new("."), &cfg, &InitOptions { force })?;
            println!("wrote {}", paths.config_path.display());
            Ok(exit_codes::OK)
        }
        Command::Run { project } => cmd_run(&project),
        Command::Extract { file } => cmd_extract(file.as_deref()),
    }
}

fn cmd_run(root: &Path) -> Result<i32> {
    let paths = FixPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let api_key = resolve_api_key(cfg.agent.backend, |var| std::env::var(var).ok())?;
    let agent = HttpRepairAgent::new(AgentConfig {
        backend: cfg.agent.backend,
        model: cfg.agent.model.clone(),
        api_key,
        max_tokens: cfg.agent.max_tokens,
        timeout: cfg.agent_timeout(),
        base_url: std::env::var(BASE_URL_VAR).ok(),
    })?;
    let lint_runner = CommandLintRunner::from_config(&cfg);
    let store = FileSourceStore::new(root, cfg.source_path.clone());
    let loop_config = LoopConfig::from_config(root, &cfg);

    let outcome = run_loop(&lint_runner, &agent, &store, &loop_config, print_cycle)?;

    match outcome.stop {
        LoopStop::Converged { iterations } => {
            println!(
                "converged after {} repair(s) ({iterations} lint pass(es)); run {}",
                outcome.repairs_executed, outcome.run_id
            );
            Ok(exit_codes::OK)
        }
        LoopStop::MaxIterationsExceeded {
            max_iterations,
            remaining,
        } => {
            println!(
                "gave up after {max_iterations} repair(s) with {remaining} diagnostic(s) remaining; run {}",
                outcome.run_id
            );
            Ok(exit_codes::NOT_CONVERGED)
        }
    }
}

fn print_cycle(report: &CycleReport<'_>) {
    if let Some(response) = report.response {
        println!(
            "--- agent response (iteration {}) ---\n{}",
            report.iter,
            response.raw.trim_end()
        );
        return;
    }
    println!(
        "iteration {}: {} diagnostic(s)",
        report.iter,
        report.diagnostics.len()
    );
    if !report.diagnostics.is_empty() {
        println!("{}", render_diagnostics(report.diagnostics));
    }
}

fn cmd_extract(file: Option<&Path>) -> Result<i32> {
    let raw = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            buf
        }
    };
    let records = extract(&raw);
    println!(
        "{}",
        serde_json::to_string_pretty(&records).context("serialize diagnostics")?
    );
    Ok(exit_codes::OK)
}
