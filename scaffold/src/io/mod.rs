//! I/O helpers: processes, backends, persistence and configuration.

pub mod completion;
pub mod config;
pub mod history_store;
pub mod process;
pub mod prompt;
pub mod transcript;
