//! Human-readable transcript of a run (`history.log`).
//!
//! The transcript is a product artifact owned by the agent: opened at setup,
//! appended for every message, flushed when the run finishes. It is written
//! regardless of `RUST_LOG`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::history::{Message, Role};

pub struct Transcript {
    writer: Option<Box<dyn Write>>,
}

impl Transcript {
    /// Create (truncate) the transcript file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create transcript dir {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create transcript {}", path.display()))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + 'static) -> Self {
        Self {
            writer: Some(Box::new(writer)),
        }
    }

    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Header with the resolved run arguments as pretty JSON.
    pub fn record_args<T: Serialize>(&mut self, args: &T) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(args).context("serialize run args")?;
        write!(writer, "====RUN ARGS====\n{json}\n\n\n").context("write transcript")
    }

    pub fn record(&mut self, role: Role, content: &str) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writer
            .write_all(render_block(role, content).as_bytes())
            .context("write transcript")
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush().context("flush transcript"),
            None => Ok(()),
        }
    }
}

/// `====ROLE====` header, the content, and three newlines.
pub fn render_block(role: Role, content: &str) -> String {
    format!("===={}====\n{content}\n\n\n", role.as_str().to_uppercase())
}

/// Render a sequence of messages in transcript format.
pub fn render_messages<'a>(messages: impl IntoIterator<Item = &'a Message>) -> String {
    messages
        .into_iter()
        .map(|message| render_block(message.role, &message.content))
        .collect()
}
