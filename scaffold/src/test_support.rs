//! Test-only helpers: scripted completion backends and seeded histories.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::history::{History, Role};
use crate::io::completion::CompletionService;

/// Completion service that replays a fixed queue of replies.
///
/// Running past the end of the queue is an error, which doubles as an
/// assertion that the loop stopped querying when it should have.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: RefCell<VecDeque<String>>,
    calls: Cell<usize>,
    seen_lengths: RefCell<Vec<usize>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            calls: Cell::new(0),
            seen_lengths: RefCell::new(Vec::new()),
        }
    }

    /// Number of `query` calls so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// History length observed by each query, in order.
    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen_lengths.borrow().clone()
    }
}

impl CompletionService for ScriptedCompletion {
    fn query(&self, history: &History) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.seen_lengths.borrow_mut().push(history.len());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completion exhausted"))
    }
}

impl CompletionService for &ScriptedCompletion {
    fn query(&self, history: &History) -> Result<String> {
        (**self).query(history)
    }
}

/// History holding a system prompt and a task message.
pub fn seeded_history(system: &str, task: &str) -> History {
    let mut history = History::new();
    history
        .append(Role::System, system)
        .expect("system message is valid first");
    history
        .append(Role::User, task)
        .expect("user message is valid after system");
    history
}
