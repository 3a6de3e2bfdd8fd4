//! Startup configuration errors.
//!
//! Everything else propagates as `anyhow::Error`; this type exists so the CLI
//! can tell a bad setup apart from a collaborator failure mid-run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing config {} (run `fixloop init`)", .0.display())]
    Missing(PathBuf),

    #[error("parse config {}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing API key: set {0} in the environment or .env")]
    MissingApiKey(&'static str),
}
