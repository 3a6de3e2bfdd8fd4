//! Prompt rendering for the repair agent.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{CodeExplanation, DiagnosticRecord};

const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// All inputs needed to build a repair prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    /// Project-relative path of the source file, for the agent's reference.
    pub path: &'a str,
    /// Current source text.
    pub source: &'a str,
    /// Diagnostics reported against `source`, in report order.
    pub diagnostics: &'a [DiagnosticRecord],
    pub explanations: &'a [CodeExplanation],
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("repair", REPAIR_TEMPLATE)
            .context("load repair template")?;
        Ok(Self { env })
    }

    /// Render the repair prompt.
    pub fn build(&self, input: &PromptInputs<'_>) -> Result<String> {
        let diagnostics: Vec<String> = input
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect();
        let template = self.env.get_template("repair")?;
        let rendered = template
            .render(context! {
                path => input.path,
                source => input.source,
                diagnostics => diagnostics,
                explanations => input.explanations,
            })
            .context("render repair prompt")?;
        debug!(bytes = rendered.len(), diagnostics = diagnostics.len(), "rendered repair prompt");
        Ok(rendered)
    }
}
