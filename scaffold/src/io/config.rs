//! Scaffold configuration stored in `scaffold.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::commands::shell::DEFAULT_TIMEOUT;

pub const DEFAULT_CONFIG_PATH: &str = "scaffold.toml";

/// Scaffold configuration (TOML).
///
/// Missing fields default to the values a stock run uses. API keys are never
/// stored here; backends read them from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaffoldConfig {
    /// Maximum number of assistant turns before the run stops.
    pub message_cap: u32,

    /// Wall-clock limit for each `<bash>` invocation, in seconds.
    pub bash_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Append the worked demonstration to the system prompt.
    pub show_demonstration: bool,

    /// Where `<submit>` writes the final answer.
    pub submission_path: PathBuf,

    /// Where the conversation is dumped at the end of the run.
    pub history_path: PathBuf,

    /// Human-readable transcript of every message.
    pub transcript_path: PathBuf,

    /// Working directory for shell commands (defaults to the scaffold's cwd).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    pub completion: CompletionConfig,

    pub browse: BrowseConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// External program: history JSON on stdin, reply on stdout.
    Command,
    /// OpenAI-compatible `/chat/completions`.
    Openai,
    /// Anthropic `/v1/messages`.
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    pub backend: Backend,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Program and arguments for the `command` backend.
    pub command: Vec<String>,

    pub model: String,

    /// Override the backend's default endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Override the environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,

    /// Retries for transport errors and retryable HTTP statuses.
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Openai,
            timeout_secs: 60,
            command: Vec::new(),
            model: "gpt-4o-mini".to_string(),
            endpoint: None,
            api_key_env: None,
            temperature: 1.0,
            top_p: 1.0,
            max_tokens: 1024,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowseConfig {
    /// Register `<browse>` and launch the helper at setup.
    pub enabled: bool,

    /// Helper launched once, detached, before the first turn.
    pub start_command: Vec<String>,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_command: vec!["browse-start".to_string()],
        }
    }
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            message_cap: 30,
            bash_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            output_limit_bytes: 100_000,
            show_demonstration: true,
            submission_path: PathBuf::from("/home/agent/submission.txt"),
            history_path: PathBuf::from("history.json"),
            transcript_path: PathBuf::from("history.log"),
            workdir: None,
            completion: CompletionConfig::default(),
            browse: BrowseConfig::default(),
        }
    }
}

impl ScaffoldConfig {
    pub fn validate(&self) -> Result<()> {
        if self.message_cap == 0 {
            return Err(anyhow!("message_cap must be > 0"));
        }
        if self.bash_timeout_secs == 0 {
            return Err(anyhow!("bash_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.submission_path.as_os_str().is_empty() {
            return Err(anyhow!("submission_path must not be empty"));
        }
        if self.completion.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.completion.backend == Backend::Command
            && (self.completion.command.is_empty() || self.completion.command[0].trim().is_empty())
        {
            return Err(anyhow!(
                "completion.command must be a non-empty array for the command backend"
            ));
        }
        if self.completion.backend != Backend::Command && self.completion.model.trim().is_empty() {
            return Err(anyhow!("completion.model must not be empty"));
        }
        if self.browse.enabled
            && (self.browse.start_command.is_empty()
                || self.browse.start_command[0].trim().is_empty())
        {
            return Err(anyhow!("browse.start_command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn bash_timeout(&self) -> Duration {
        Duration::from_secs(self.bash_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ScaffoldConfig::default()`. The result is
/// not validated; callers apply their overrides first and then call
/// [`ScaffoldConfig::validate`].
pub fn load_config(path: &Path) -> Result<ScaffoldConfig> {
    if !path.exists() {
        return Ok(ScaffoldConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ScaffoldConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ScaffoldConfig::default());
        assert_eq!(cfg.message_cap, 30);
        assert_eq!(cfg.bash_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scaffold.toml");
        let cfg = ScaffoldConfig {
            workdir: Some(PathBuf::from("/tmp/work")),
            completion: CompletionConfig {
                backend: Backend::Command,
                command: vec!["./model.sh".to_string(), "--fast".to_string()],
                ..CompletionConfig::default()
            },
            ..ScaffoldConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scaffold.toml");
        fs::write(
            &path,
            concat!(
                "message_cap = 5\n\n[completion]\n",
                "backend = \"anthropic\"\nmodel = \"claude-3-5-sonnet-20240620\"\n",
            ),
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.message_cap, 5);
        assert_eq!(cfg.completion.backend, Backend::Anthropic);
        assert_eq!(cfg.completion.max_tokens, 1024);
        assert!(!cfg.browse.enabled);
    }

    #[test]
    fn load_leaves_validation_to_the_caller() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scaffold.toml");
        fs::write(&path, "message_cap = 0\n").expect("write");
        let mut cfg = load_config(&path).expect("load");
        assert!(cfg.validate().is_err());
        cfg.message_cap = 5;
        cfg.validate().expect("valid after override");
    }

    #[test]
    fn command_backend_requires_argv() {
        let cfg = ScaffoldConfig {
            completion: CompletionConfig {
                backend: Backend::Command,
                ..CompletionConfig::default()
            },
            ..ScaffoldConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("completion.command"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let cfg = ScaffoldConfig {
            message_cap: 0,
            ..ScaffoldConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = ScaffoldConfig {
            bash_timeout_secs: 0,
            ..ScaffoldConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
