//! Deterministic, pure logic shared by the scaffold.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod blocklist;
pub mod budget;
pub mod history;
pub mod protocol;
pub mod span;
