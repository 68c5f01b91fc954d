//! Stable exit codes for scaffold CLI commands.

/// Command succeeded, or the run ended with a submission.
pub const OK: i32 = 0;
/// Invalid config/arguments, protocol violation, or a run-fatal resource error.
pub const INVALID: i32 = 1;
/// `scaffold run` used its whole message cap without submitting.
pub const BUDGET_EXHAUSTED: i32 = 2;
/// `scaffold run` was interrupted between turns.
pub const INTERRUPTED: i32 = 3;
