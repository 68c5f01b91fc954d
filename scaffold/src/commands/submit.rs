//! `<submit>`: write the final answer and end the run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::Execution;
use crate::core::protocol::SUBMISSION_ACCEPTED;

pub const TAG: &str = "submit";

pub const DESCRIPTION: &str = "To submit an answer, wrap it in <submit></submit> XML tags. Example: <submit>YOUR ANSWER HERE</submit>";

#[derive(Debug, Clone)]
pub struct SubmitCommand {
    path: PathBuf,
}

impl SubmitCommand {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the submission file with the trimmed answer.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn run(&self, content: &str) -> Result<Execution> {
        let answer = content.trim();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create submission dir {}", parent.display()))?;
        }
        fs::write(&self.path, answer)
            .with_context(|| format!("write submission {}", self.path.display()))?;
        info!(bytes = answer.len(), "answer submitted");
        Ok(Execution::terminating(SUBMISSION_ACCEPTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Effect;

    #[test]
    fn writes_trimmed_answer_and_terminates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("submission.txt");
        let execution = SubmitCommand::new(&path).run("  42\n").expect("submit");

        assert_eq!(execution.output, SUBMISSION_ACCEPTED);
        assert_eq!(execution.effect, Effect::Terminate);
        assert_eq!(fs::read_to_string(&path).expect("read"), "42");
    }

    #[test]
    fn resubmission_overwrites_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("submission.txt");
        let cmd = SubmitCommand::new(&path);
        cmd.run("a much longer first answer").expect("first");
        cmd.run("short").expect("second");
        assert_eq!(fs::read_to_string(&path).expect("read"), "short");
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        // A directory cannot be overwritten as a file.
        let err = SubmitCommand::new(temp.path()).run("42").unwrap_err();
        assert!(err.to_string().contains("write submission"));
    }
}
