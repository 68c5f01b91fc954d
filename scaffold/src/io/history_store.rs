//! Persistence of the conversation history (`history.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::history::History;

/// Load a history dump, re-checking every sequence invariant.
pub fn load_history(path: &Path) -> Result<History> {
    debug!(path = %path.display(), "loading history");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read history {}", path.display()))?;
    let history =
        History::from_json(&contents).with_context(|| format!("parse history {}", path.display()))?;
    debug!(messages = history.len(), "history loaded");
    Ok(history)
}

/// Atomically write the history dump (temp file + rename).
pub fn save_history(path: &Path, history: &History) -> Result<()> {
    debug!(path = %path.display(), messages = history.len(), "writing history");
    let mut buf = history.to_json().context("serialize history")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp history {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace history {}", path.display()))?;
    Ok(())
}
