//! `<bash>`: run one shell command with a wall-clock timeout.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use super::Execution;
use crate::core::blocklist::should_block;
use crate::core::protocol::{
    SHELL_BLOCKED, SHELL_NO_OUTPUT, SHELL_STDERR_LABEL, SHELL_STDOUT_LABEL, SHELL_TIMED_OUT,
};
use crate::io::process::{CommandOutput, run_command_with_timeout};

pub const TAG: &str = "bash";

pub const DESCRIPTION: &str = r#"To run a shell command, wrap it in <bash></bash> XML tags. Examples:
<bash>ls</bash>
<bash>python3 script.py</bash>
<bash>cat file.txt</bash>
<bash>python3 -c "
import numpy as np
print(np.sum([1, 2, 3]))
"</bash>"#;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Stateless shell runner: each call spawns a fresh `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    timeout: Duration,
    output_limit_bytes: usize,
    workdir: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
            workdir: None,
        }
    }

    /// Run commands from `workdir` instead of the scaffold's cwd.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    pub fn run(&self, content: &str) -> Result<Execution> {
        if should_block(content) {
            warn!(command = content.trim(), "refusing interactive command");
            return Ok(Execution::output(SHELL_BLOCKED));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(content);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(command = content, "running shell command");
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run shell command")?;

        Ok(Execution::output(render_output(&output)))
    }
}

/// Format captured output the way the model is prompted to expect it.
fn render_output(output: &CommandOutput) -> String {
    if output.timed_out {
        return SHELL_TIMED_OUT.to_string();
    }

    let mut blocks = Vec::new();
    if !output.stdout.is_empty() {
        blocks.push(format!(
            "{SHELL_STDOUT_LABEL}{}{}",
            output.stdout_lossy(),
            output.stdout_truncated_notice()
        ));
    }
    if !output.stderr.is_empty() {
        blocks.push(format!(
            "{SHELL_STDERR_LABEL}{}{}",
            output.stderr_lossy(),
            output.stderr_truncated_notice()
        ));
    }

    if blocks.is_empty() {
        return SHELL_NO_OUTPUT.to_string();
    }
    blocks.join("\n")
}
