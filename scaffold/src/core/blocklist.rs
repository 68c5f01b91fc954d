//! Deterministic classification of shell invocations that would stall the loop.
//!
//! The scaffold is turn-based: a command that waits for terminal input or
//! detaches from the call never yields a usable result. Refusal is decided on
//! the first whitespace-separated token only; this is a name filter, not a
//! sandbox.

/// Programs refused regardless of their arguments.
const ALWAYS_BLOCKED: &[&str] = &["vim", "vi", "emacs", "nano", "nohup", "git"];

/// Programs refused only when invoked without arguments (they would open an
/// interactive session).
const BLOCKED_STANDALONE: &[&str] = &[
    "python",
    "python3",
    "ipython",
    "bash",
    "sh",
    "exit",
    "/bin/bash",
    "/bin/sh",
    "nohup",
    "vi",
    "vim",
    "emacs",
    "nano",
];

/// Return true when `command` must be refused without spawning anything.
///
/// - Empty or whitespace-only input is never blocked.
/// - A first token in [`ALWAYS_BLOCKED`] is blocked.
/// - A first token in [`BLOCKED_STANDALONE`] is blocked when it is the only token.
pub fn should_block(command: &str) -> bool {
    let mut tokens = command.split_whitespace();
    let Some(program) = tokens.next() else {
        return false;
    };

    if ALWAYS_BLOCKED.contains(&program) {
        return true;
    }

    let standalone = tokens.next().is_none();
    standalone && BLOCKED_STANDALONE.contains(&program)
}
