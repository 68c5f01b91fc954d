//! Turn budget accounting for the orchestrator loop.

/// Remaining-turn counter seeded from configuration.
///
/// Decremented exactly once per loop iteration; never wraps below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnBudget {
    remaining: u32,
}

impl TurnBudget {
    pub fn new(cap: u32) -> Self {
        Self { remaining: cap }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Consume one turn and return the turns left afterwards.
    pub fn consume(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}
