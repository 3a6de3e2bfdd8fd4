//! Read/write access to the single source file under repair.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::config::write_atomic;

/// Storage for the project's source file.
pub trait SourceStore {
    fn read(&self) -> Result<String>;
    fn write(&self, source: &str) -> Result<()>;
    /// Human-readable location, shown to the agent and in logs.
    fn describe(&self) -> String;
}

/// Source file at a fixed path relative to the project root.
#[derive(Debug, Clone)]
pub struct FileSourceStore {
    relative: PathBuf,
    path: PathBuf,
}

impl FileSourceStore {
    pub fn new(root: &Path, relative: impl Into<PathBuf>) -> Self {
        let relative = relative.into();
        Self {
            path: root.join(&relative),
            relative,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceStore for FileSourceStore {
    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path.display()))
    }

    fn write(&self, source: &str) -> Result<()> {
        debug!(path = %self.path.display(), bytes = source.len(), "writing source");
        write_atomic(&self.path, source)
    }

    fn describe(&self) -> String {
        self.relative.display().to_string()
    }
}
