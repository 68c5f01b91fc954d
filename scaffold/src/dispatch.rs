//! One-command-per-turn dispatch.
//!
//! Every assistant turn is scanned against every registered tag. Exactly one
//! invocation runs; zero or several invocations run nothing and produce a
//! fixed notice instead. Ambiguity is never resolved by picking a match.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::commands::{CommandSet, Effect};
use crate::core::protocol::{NO_COMMANDS_CALLED, TOO_MANY_COMMANDS};

/// Which branch dispatch took for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoCommand,
    TooManyCommands { calls: usize },
    Executed { tag: String },
}

/// Outcome of dispatching one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub decision: Decision,
    /// User messages to append, in order.
    pub messages: Vec<String>,
    /// A command asked the run to end.
    pub terminate: bool,
}

/// Total invocation count across every registered command.
pub fn count_calls(commands: &CommandSet, text: &str) -> usize {
    commands.iter().map(|command| command.matches(text).len()).sum()
}

/// Decide and execute for one assistant turn.
///
/// `Err` only carries resource failures from the executed command.
pub fn dispatch(commands: &CommandSet, text: &str) -> Result<Dispatch> {
    let calls = count_calls(commands, text);
    if calls == 0 {
        debug!("no command called");
        return Ok(Dispatch {
            decision: Decision::NoCommand,
            messages: vec![NO_COMMANDS_CALLED.to_string()],
            terminate: false,
        });
    }
    if calls > 1 {
        warn!(calls, "too many commands called");
        return Ok(Dispatch {
            decision: Decision::TooManyCommands { calls },
            messages: vec![TOO_MANY_COMMANDS.to_string()],
            terminate: false,
        });
    }

    let mut messages = Vec::new();
    let mut terminate = false;
    let mut executed = None;
    for command in commands.iter() {
        let spans = command.matches(text);
        if spans.is_empty() {
            continue;
        }
        info!(tag = command.tag(), "executing command");
        for span in spans {
            let execution = command
                .run(span.content)
                .with_context(|| format!("execute <{}>", command.tag()))?;
            terminate |= execution.effect == Effect::Terminate;
            messages.push(execution.output);
        }
        executed = Some(command.tag().to_string());
    }

    let tag = executed.context("matched command disappeared during dispatch")?;
    Ok(Dispatch {
        decision: Decision::Executed { tag },
        messages,
        terminate,
    })
}
