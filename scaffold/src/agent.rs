//! The turn loop: query, record, dispatch, account.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::commands::CommandSet;
use crate::core::budget::TurnBudget;
use crate::core::history::{History, Role};
use crate::dispatch::{Decision, dispatch};
use crate::io::completion::CompletionService;
use crate::io::transcript::Transcript;

/// Loop state. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    /// A command (the submission) ended the run.
    Submitted,
    /// The message cap was reached without a submission.
    BudgetExhausted,
    /// An interrupt was observed between turns.
    Interrupted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoopState::Running)
    }
}

/// Report for one completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// 1-indexed turn number.
    pub number: u32,
    pub decision: Decision,
    /// Turns left after this one.
    pub remaining: u32,
    /// State after this turn.
    pub state: LoopState,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub state: LoopState,
    pub turns: u32,
}

/// Owns the conversation, the command registry, the completion backend and
/// the transcript for one run.
pub struct Agent<C> {
    history: History,
    commands: CommandSet,
    completion: C,
    budget: TurnBudget,
    transcript: Transcript,
    interrupt: Option<Arc<AtomicBool>>,
    state: LoopState,
    turns: u32,
}

impl<C: CompletionService> Agent<C> {
    pub fn new(
        completion: C,
        commands: CommandSet,
        message_cap: u32,
        transcript: Transcript,
    ) -> Self {
        let budget = TurnBudget::new(message_cap);
        let state = if budget.is_exhausted() {
            LoopState::BudgetExhausted
        } else {
            LoopState::Running
        };
        Self {
            history: History::new(),
            commands,
            completion,
            budget,
            transcript,
            interrupt: None,
            state,
            turns: 0,
        }
    }

    /// Stop between turns once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Append the opening system prompt and the task message.
    pub fn seed(&mut self, system: &str, task: &str) -> Result<()> {
        self.append(Role::System, system)?;
        self.append(Role::User, task)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.budget.remaining()
    }

    /// Run turns until a terminal state. `on_turn` sees every completed turn.
    ///
    /// Any error (protocol violation, backend failure, resource failure) stops
    /// the loop immediately.
    pub fn run<F: FnMut(&Turn)>(&mut self, mut on_turn: F) -> Result<LoopOutcome> {
        info!(remaining = self.budget.remaining(), commands = self.commands.len(), "loop started");
        while self.state == LoopState::Running {
            if self.interrupted() {
                warn!(turns = self.turns, "interrupt received, stopping before next turn");
                self.state = LoopState::Interrupted;
                break;
            }
            let turn = self.step()?;
            on_turn(&turn);
        }
        info!(state = ?self.state, turns = self.turns, "loop finished");
        Ok(LoopOutcome {
            state: self.state,
            turns: self.turns,
        })
    }

    /// Execute exactly one turn: one completion query, one dispatch decision,
    /// at most one command execution.
    #[instrument(skip_all, fields(turn = self.turns + 1, remaining = self.budget.remaining()))]
    pub fn step(&mut self) -> Result<Turn> {
        if self.state.is_terminal() {
            bail!("loop already finished ({:?})", self.state);
        }

        let reply = self
            .completion
            .query(&self.history)
            .context("query completion service")?;
        self.append(Role::Assistant, &reply)?;

        let outcome = dispatch(&self.commands, &reply)?;
        for message in &outcome.messages {
            self.append(Role::User, message)?;
        }

        let remaining = self.budget.consume();
        self.turns += 1;
        self.state = if outcome.terminate {
            LoopState::Submitted
        } else if self.budget.is_exhausted() {
            LoopState::BudgetExhausted
        } else {
            LoopState::Running
        };
        debug!(decision = ?outcome.decision, state = ?self.state, "turn complete");

        Ok(Turn {
            number: self.turns,
            decision: outcome.decision,
            remaining,
            state: self.state,
        })
    }

    /// Flush the transcript and hand back the final history.
    pub fn finish(mut self) -> Result<History> {
        self.transcript.flush()?;
        Ok(self.history)
    }

    fn append(&mut self, role: Role, content: &str) -> Result<()> {
        self.history
            .append(role, content)
            .with_context(|| format!("append {role} message"))?;
        self.transcript.record(role, content)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
