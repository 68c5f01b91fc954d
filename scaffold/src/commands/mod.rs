//! Capabilities the model can invoke with `<tag>…</tag>`.
//!
//! The set is closed: every capability is a [`Command`] variant sharing one
//! interface (`tag`, `description`, `matches`, `run`). A [`CommandSet`] is built
//! once before the loop starts and never changes during a run.

pub mod browse;
pub mod shell;
pub mod submit;

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

use crate::core::span::{Span, extract_spans};

pub use browse::BrowseCommand;
pub use shell::ShellCommand;
pub use submit::SubmitCommand;

/// What the loop should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    #[default]
    Continue,
    /// The run is finished (a final answer was submitted).
    Terminate,
}

/// Result of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Text appended to the conversation as a user message.
    pub output: String,
    pub effect: Effect,
}

impl Execution {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            effect: Effect::Continue,
        }
    }

    pub fn terminating(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            effect: Effect::Terminate,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Shell(ShellCommand),
    Submit(SubmitCommand),
    Browse(BrowseCommand),
}

impl Command {
    pub fn tag(&self) -> &str {
        match self {
            Command::Shell(_) => shell::TAG,
            Command::Submit(_) => submit::TAG,
            Command::Browse(_) => browse::TAG,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Command::Shell(_) => shell::DESCRIPTION,
            Command::Submit(_) => submit::DESCRIPTION,
            Command::Browse(_) => browse::DESCRIPTION,
        }
    }

    /// Innermost invocation spans of this command in `text`.
    pub fn matches<'a>(&self, text: &'a str) -> Vec<Span<'a>> {
        extract_spans(self.tag(), text)
    }

    /// Execute one invocation. `Err` is reserved for resource failures
    /// (spawn, filesystem); everything the model can fix is returned as output.
    pub fn run(&self, content: &str) -> Result<Execution> {
        match self {
            Command::Shell(cmd) => cmd.run(content),
            Command::Submit(cmd) => cmd.run(content),
            Command::Browse(cmd) => Ok(cmd.run(content)),
        }
    }
}

impl From<ShellCommand> for Command {
    fn from(cmd: ShellCommand) -> Self {
        Command::Shell(cmd)
    }
}

impl From<SubmitCommand> for Command {
    fn from(cmd: SubmitCommand) -> Self {
        Command::Submit(cmd)
    }
}

impl From<BrowseCommand> for Command {
    fn from(cmd: BrowseCommand) -> Self {
        Command::Browse(cmd)
    }
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("tag pattern is valid")
});

/// Ordered, immutable registry of the commands available in a run.
#[derive(Debug)]
pub struct CommandSet {
    commands: Vec<Command>,
}

impl CommandSet {
    /// Build a registry; tags must be identifiers and unique.
    pub fn new(commands: Vec<Command>) -> Result<Self> {
        let mut seen = HashSet::new();
        for command in &commands {
            let tag = command.tag();
            if !TAG_RE.is_match(tag) {
                bail!("invalid command tag '{tag}'");
            }
            if !seen.insert(tag.to_string()) {
                bail!("duplicate command tag '{tag}'");
            }
        }
        Ok(Self { commands })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, tag: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.tag() == tag)
    }

    /// `tag: description` lines in registration order, for the system prompt.
    pub fn describe(&self) -> String {
        self.commands
            .iter()
            .map(|command| format!("{}: {}", command.tag(), command.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
