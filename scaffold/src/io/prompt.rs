//! Prompt rendering for the opening system and task messages.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const INSTRUCTION_TEMPLATE: &str = include_str!("prompts/instruction.md");
const DEMONSTRATION: &str = include_str!("prompts/demonstration.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("instruction", INSTRUCTION_TEMPLATE)
            .context("load instruction template")?;
        Ok(Self { env })
    }

    /// System prompt listing the available commands, optionally followed by a
    /// worked demonstration.
    pub fn render_system(
        &self,
        command_descriptions: &str,
        show_demonstration: bool,
    ) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template
            .render(context! {
                command_descriptions => command_descriptions,
                demonstration => show_demonstration.then(|| DEMONSTRATION.trim_end()),
            })
            .context("render system prompt")?;
        debug!(bytes = rendered.len(), show_demonstration, "rendered system prompt");
        Ok(rendered)
    }

    /// First user message carrying the task.
    pub fn render_instruction(&self, instructions: &str) -> Result<String> {
        let template = self.env.get_template("instruction")?;
        template
            .render(context! { instructions => instructions })
            .context("render instruction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_embeds_command_listing_verbatim() {
        let engine = PromptEngine::new().expect("engine");
        let rendered = engine
            .render_system("bash: wrap it in <bash></bash> & run", false)
            .expect("render");
        assert!(rendered.contains("COMMANDS:\nbash: wrap it in <bash></bash> & run\n"));
        assert!(rendered.ends_with("such as vim or nano."));
        assert!(!rendered.contains("DEMONSTRATION"));
    }

    #[test]
    fn demonstration_is_appended_when_enabled() {
        let engine = PromptEngine::new().expect("engine");
        let rendered = engine.render_system("x", true).expect("render");
        assert!(rendered.contains("vim or nano.\n\nHere is a demonstration"));
        assert!(rendered.contains("<submit>1941</submit>"));
        assert!(rendered.ends_with("**** END OF DEMONSTRATION ****"));
    }

    #[test]
    fn instruction_is_prefixed() {
        let engine = PromptEngine::new().expect("engine");
        assert_eq!(
            engine.render_instruction("count the files").expect("render"),
            "YOUR TASK:\ncount the files"
        );
    }

    #[test]
    fn instruction_text_is_passed_verbatim() {
        let engine = PromptEngine::new().expect("engine");
        assert_eq!(
            engine
                .render_instruction("  indented task\n\nwith a blank line\n")
                .expect("render"),
            "YOUR TASK:\n  indented task\n\nwith a blank line\n"
        );
    }
}
