//! `<browse>`: usage guide for the headless `browse-*` shell tools.
//!
//! Browsing itself happens through `<bash>`; this command only teaches the
//! model how. The helper daemon behind the tools is launched once at setup by
//! [`launch_helper`] and is not tracked by the turn loop.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use super::Execution;
use crate::core::protocol::BROWSE_TAKES_NO_ARGUMENTS;
use crate::io::process::spawn_detached;

pub const TAG: &str = "browse";

pub const DESCRIPTION: &str = "You have the ability to browse the internet using a headless CLI browser. Use this command to learn about how to browse. Example: <browse></browse>";

const GUIDE: &str = include_str!("../io/prompts/browse.md");

/// Time given to the helper to open its socket before the first turn.
const HELPER_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default)]
pub struct BrowseCommand;

impl BrowseCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, content: &str) -> Execution {
        if !content.is_empty() {
            return Execution::output(BROWSE_TAKES_NO_ARGUMENTS);
        }
        Execution::output(GUIDE.trim_end())
    }
}

/// Start the browser helper (`start_command` argv) detached from the scaffold.
pub fn launch_helper(start_command: &[String]) -> Result<()> {
    let Some((program, args)) = start_command.split_first() else {
        bail!("browse start command is empty");
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    let pid = spawn_detached(cmd)?;
    info!(pid, program = %program, "browser helper launched");
    thread::sleep(HELPER_SETTLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_invocation_returns_the_guide() {
        let execution = BrowseCommand::new().run("");
        assert!(execution.output.contains("browse-goto"));
        assert!(execution.output.contains("<bash>"));
    }

    #[test]
    fn any_content_is_rejected_verbatim() {
        assert_eq!(
            BrowseCommand::new().run(" ").output,
            BROWSE_TAKES_NO_ARGUMENTS
        );
        assert_eq!(
            BrowseCommand::new().run("https://example.com").output,
            BROWSE_TAKES_NO_ARGUMENTS
        );
    }

    #[test]
    fn empty_start_command_is_an_error() {
        assert!(launch_helper(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn helper_launch_does_not_block() {
        launch_helper(&["true".to_string()]).expect("launch");
    }
}
