//! Turn-disciplined command scaffold for text-generation agents.
//!
//! A model drives a machine through `<tag>…</tag>` invocations, one per turn.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (span extraction, blocklist,
//!   history invariants, budget). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, completion backends,
//!   persistence, config, prompts).
//!
//! [`commands`] and [`dispatch`] sit between the two; [`agent`] runs the loop.

pub mod agent;
pub mod commands;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
