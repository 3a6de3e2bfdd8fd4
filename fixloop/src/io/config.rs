//! Loop configuration stored under `.fixloop/config.toml`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::io::agent::Backend;

/// Loop configuration (TOML).
///
/// The iteration cap and both timeouts have no defaults: a config that omits
/// them fails to load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixConfig {
    /// Maximum number of repair attempts before giving up.
    pub max_iterations: u32,

    /// Wall-clock limit for each lint or format command, in seconds.
    pub lint_timeout_secs: u64,

    /// Wall-clock limit for each repair agent request, in seconds.
    pub agent_timeout_secs: u64,

    /// Keep at most this many bytes of lint stdout/stderr per stream.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,

    /// Project-relative path of the file the agent repairs.
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,

    /// Write per-iteration artifacts under `.fixloop/iterations/`.
    #[serde(default = "default_log_iterations")]
    pub log_iterations: bool,

    #[serde(default)]
    pub lint: LintConfig,

    #[serde(default)]
    pub format: FormatConfig,

    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LintConfig {
    /// Command whose stderr carries the diagnostics (e.g. `["cargo","clippy"]`).
    pub command: Vec<String>,
    /// Command printing a code's explanation when the code is appended.
    /// Empty disables explanations.
    pub explain_command: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "clippy".to_string()],
            explain_command: vec!["rustc".to_string(), "--explain".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatConfig {
    /// Command run once after convergence. Failures are ignored.
    pub command: Vec<String>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "fmt".to_string()],
        }
    }
}

/// Backend selection for the repair agent. The API key is not stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSettings {
    pub backend: Backend,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_output_limit_bytes() -> usize {
    1_000_000
}

fn default_source_path() -> PathBuf {
    PathBuf::from("src/main.rs")
}

fn default_log_iterations() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    FixConfig::DEFAULT_MAX_TOKENS
}

impl FixConfig {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    /// Build a config with the required values and defaults for the rest.
    pub fn new(
        max_iterations: u32,
        lint_timeout_secs: u64,
        agent_timeout_secs: u64,
        agent: AgentSettings,
    ) -> Self {
        Self {
            max_iterations,
            lint_timeout_secs,
            agent_timeout_secs,
            output_limit_bytes: default_output_limit_bytes(),
            source_path: default_source_path(),
            log_iterations: default_log_iterations(),
            lint: LintConfig::default(),
            format: FormatConfig::default(),
            agent,
        }
    }

    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };
        if self.max_iterations == 0 {
            return invalid("max_iterations must be > 0");
        }
        if self.lint_timeout_secs == 0 {
            return invalid("lint_timeout_secs must be > 0");
        }
        if self.agent_timeout_secs == 0 {
            return invalid("agent_timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        if self.source_path.as_os_str().is_empty()
            || self.source_path.is_absolute()
            || self
                .source_path
                .components()
                .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return invalid("source_path must be a non-empty path inside the project");
        }
        if !is_command(&self.lint.command) {
            return invalid("lint.command must be a non-empty array");
        }
        if !is_command(&self.format.command) {
            return invalid("format.command must be a non-empty array");
        }
        if self.agent.model.trim().is_empty() {
            return invalid("agent.model must not be empty");
        }
        if self.agent.max_tokens == 0 {
            return invalid("agent.max_tokens must be > 0");
        }
        Ok(())
    }
}

fn is_command(argv: &[String]) -> bool {
    argv.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<FixConfig> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.to_path_buf()).into());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    debug!(path = %path.display(), max_iterations = cfg.max_iterations, "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename over it.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FixConfig {
        FixConfig::new(
            5,
            300,
            120,
            AgentSettings {
                backend: Backend::Anthropic,
                model: "claude-3-5-sonnet-20241022".to_string(),
                max_tokens: 4096,
            },
        )
    }

    #[test]
    fn load_missing_is_a_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        write_config(&path, &sample()).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, sample());
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
max_iterations = 3
lint_timeout_secs = 60
agent_timeout_secs = 30

[agent]
backend = "openai"
model = "gpt-4-turbo-preview"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent.backend, Backend::OpenAi);
        assert_eq!(cfg.source_path, PathBuf::from("src/main.rs"));
        assert_eq!(cfg.lint.command, vec!["cargo", "clippy"]);
        assert_eq!(cfg.lint.explain_command, vec!["rustc", "--explain"]);
        assert_eq!(cfg.format.command, vec!["cargo", "fmt"]);
        assert_eq!(cfg.agent.max_tokens, 4096);
        assert!(cfg.log_iterations);
    }

    #[test]
    fn missing_iteration_cap_fails_to_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "lint_timeout_secs = 60\nagent_timeout_secs = 30\n[agent]\nbackend = \"openai\"\nmodel = \"m\"\n",
        )
        .expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unsupported_backend_fails_to_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_iterations = 1\nlint_timeout_secs = 60\nagent_timeout_secs = 30\n[agent]\nbackend = \"mistral\"\nmodel = \"m\"\n",
        )
        .expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("mistral"));
    }

    #[test]
    fn validate_rejects_zero_values_and_absolute_paths() {
        let mut cfg = sample();
        cfg.max_iterations = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.agent_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.source_path = PathBuf::from("/etc/passwd");
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.lint.command = vec![" ".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_keeps_source_path_inside_the_project() {
        for escaping in ["../elsewhere.rs", "src/../../main.rs"] {
            let mut cfg = sample();
            cfg.source_path = PathBuf::from(escaping);
            assert!(
                matches!(cfg.validate(), Err(ConfigError::Invalid(_))),
                "{escaping} accepted"
            );
        }

        let mut cfg = sample();
        cfg.source_path = PathBuf::from("./src/lib.rs");
        assert!(cfg.validate().is_ok());
    }
}
