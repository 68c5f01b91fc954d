//! Turn-disciplined command scaffold.
//!
//! Drives a text-generation backend through `<bash>`, `<submit>` (and
//! optionally `<browse>`) invocations, one command per turn, until the model
//! submits an answer or the message cap runs out.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing::{error, info};

use scaffold::agent::{Agent, LoopState, Turn};
use scaffold::commands::browse::launch_helper;
use scaffold::commands::{
    BrowseCommand, Command as ScaffoldCommand, CommandSet, ShellCommand, SubmitCommand,
};
use scaffold::exit_codes;
use scaffold::io::completion::build_completion;
use scaffold::io::config::{DEFAULT_CONFIG_PATH, ScaffoldConfig, load_config, write_config};
use scaffold::io::history_store::{load_history, save_history};
use scaffold::io::prompt::PromptEngine;
use scaffold::io::transcript::{Transcript, render_messages};
use scaffold::logging;

#[derive(Parser)]
#[command(
    name = "scaffold",
    version,
    about = "Turn-disciplined command scaffold for text-generation agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent until it submits or the message cap is reached.
    Run {
        /// Config file (missing file means defaults).
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Task for the agent.
        #[arg(
            long,
            required_unless_present = "instructions_file",
            conflicts_with = "instructions_file"
        )]
        instructions: Option<String>,
        /// Read the task from a file.
        #[arg(long)]
        instructions_file: Option<PathBuf>,
        /// Override `message_cap`.
        #[arg(long)]
        message_cap: Option<u32>,
        /// Leave the worked demonstration out of the system prompt.
        #[arg(long)]
        no_demonstration: bool,
    },
    /// Write a default config file.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate a saved history dump and print it as a transcript.
    Show { path: PathBuf },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            error!(err = %format!("{err:#}"), "scaffold failed");
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            instructions,
            instructions_file,
            message_cap,
            no_demonstration,
        } => {
            let cfg = resolve_config(&config, message_cap, no_demonstration)?;
            let instructions = resolve_instructions(instructions, instructions_file.as_deref())?;
            cmd_run(&cfg, &instructions)
        }
        Command::Init { config, force } => cmd_init(&config, force).map(|()| exit_codes::OK),
        Command::Show { path } => cmd_show(&path).map(|()| exit_codes::OK),
    }
}

/// Resolved arguments recorded at the top of the transcript.
#[derive(Serialize)]
struct RunArgs<'a> {
    instructions: &'a str,
    #[serde(flatten)]
    config: &'a ScaffoldConfig,
}

fn cmd_run(cfg: &ScaffoldConfig, instructions: &str) -> Result<i32> {
    let interrupt = register_interrupt()?;

    let completion = build_completion(&cfg.completion)?;
    let commands = build_commands(cfg)?;

    let prompts = PromptEngine::new()?;
    let system = prompts.render_system(&commands.describe(), cfg.show_demonstration)?;
    let task = prompts.render_instruction(instructions)?;

    let mut transcript = Transcript::open(&cfg.transcript_path)?;
    transcript.record_args(&RunArgs {
        instructions,
        config: cfg,
    })?;

    let mut agent =
        Agent::new(completion, commands, cfg.message_cap, transcript).with_interrupt(interrupt);
    agent.seed(&system, &task)?;
    let outcome = agent.run(log_turn)?;

    let history = agent.finish()?;
    save_history(&cfg.history_path, &history)
        .with_context(|| format!("save history {}", cfg.history_path.display()))?;

    println!(
        "run: state={:?} turns={} history={} transcript={}",
        outcome.state,
        outcome.turns,
        cfg.history_path.display(),
        cfg.transcript_path.display()
    );
    Ok(match outcome.state {
        LoopState::Submitted => {
            println!("run: submission={}", cfg.submission_path.display());
            exit_codes::OK
        }
        LoopState::BudgetExhausted => exit_codes::BUDGET_EXHAUSTED,
        LoopState::Interrupted => exit_codes::INTERRUPTED,
        LoopState::Running => bail!("loop returned while still running"),
    })
}

/// First SIGINT/SIGTERM sets the flag and the loop stops after the current
/// turn; a second one exits immediately with the interrupted code.
fn register_interrupt() -> Result<Arc<AtomicBool>> {
    let interrupt = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // Registered first so it sees the flag as it was before this delivery.
        flag::register_conditional_shutdown(
            signal,
            exit_codes::INTERRUPTED,
            Arc::clone(&interrupt),
        )
        .with_context(|| format!("register shutdown handler for signal {signal}"))?;
        flag::register(signal, Arc::clone(&interrupt))
            .with_context(|| format!("register interrupt handler for signal {signal}"))?;
    }
    Ok(interrupt)
}

fn log_turn(turn: &Turn) {
    info!(
        turn = turn.number,
        decision = ?turn.decision,
        remaining = turn.remaining,
        state = ?turn.state,
        "turn finished"
    );
}

/// Registry in prompt order: submit, bash, then browse when enabled.
fn build_commands(cfg: &ScaffoldConfig) -> Result<CommandSet> {
    let mut shell = ShellCommand::new(cfg.bash_timeout(), cfg.output_limit_bytes);
    if let Some(dir) = &cfg.workdir {
        shell = shell.with_workdir(dir);
    }
    let submit = SubmitCommand::new(&cfg.submission_path);
    info!(
        submission = %submit.path().display(),
        bash_timeout_secs = shell.timeout().as_secs(),
        "commands configured"
    );
    let mut commands: Vec<ScaffoldCommand> = vec![submit.into(), shell.into()];
    if cfg.browse.enabled {
        launch_helper(&cfg.browse.start_command).context("launch browser helper")?;
        commands.push(BrowseCommand::new().into());
    }
    CommandSet::new(commands)
}

/// File config with CLI overrides applied, validated once at the end.
fn resolve_config(
    path: &Path,
    message_cap: Option<u32>,
    no_demonstration: bool,
) -> Result<ScaffoldConfig> {
    let mut cfg = load_config(path)?;
    if let Some(cap) = message_cap {
        cfg.message_cap = cap;
    }
    if no_demonstration {
        cfg.show_demonstration = false;
    }
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

fn resolve_instructions(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("read instructions {}", path.display())),
        (None, None) => bail!("either --instructions or --instructions-file is required"),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &ScaffoldConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("init: config={}", path.display());
    Ok(())
}

fn cmd_show(path: &Path) -> Result<()> {
    let history = load_history(path)?;
    print!("{}", render_messages(history.iter()));
    Ok(())
}
