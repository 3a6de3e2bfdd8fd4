//! Canonical `.fixloop/` paths and scaffolding for `fixloop init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{FixConfig, write_config};

const FIXLOOP_GITIGNORE: &str = "iterations/\n";

/// All canonical paths within `.fixloop/` for a project root.
#[derive(Debug, Clone)]
pub struct FixPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub iterations_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl FixPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".fixloop");
        Self {
            config_path: state_dir.join("config.toml"),
            iterations_dir: state_dir.join("iterations"),
            gitignore_path: state_dir.join(".gitignore"),
            state_dir,
            root,
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

/// Create `.fixloop/` with `cfg` as its config.
///
/// Fails if a config already exists unless `options.force` is set.
pub fn init_project(root: &Path, cfg: &FixConfig, options: &InitOptions) -> Result<FixPaths> {
    let paths = FixPaths::new(root);
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!("fixloop init: .fixloop exists but is not a directory"));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "fixloop init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create directory {}", paths.state_dir.display()))?;
    write_config(&paths.config_path, cfg)?;
    fs::write(&paths.gitignore_path, FIXLOOP_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;

    Ok(paths)
}
