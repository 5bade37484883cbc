//! CLI struct definitions for the workgate command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "workgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Workgate is a synchronous workflow-enforcement engine that agent hosts call before each action to keep workspaces clean, commits issue-linked, and new work gated on hygiene."
)]
pub(crate) struct Cli {
    /// Debug logging to stderr (overrides WORKGATE_LOG).
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub(crate) struct EvaluateCli {
    /// Action kind: 'shell-command', 'file-edit' or 'user-message'.
    #[clap(long, default_value = "shell-command")]
    pub kind: String,
    /// Command line, file path or message.
    #[clap(long)]
    pub text: String,
    /// The user message behind a tool action.
    #[clap(long)]
    pub context: Option<String>,
    /// Force the work type: 'maintenance' or 'new-work'.
    #[clap(long = "override")]
    pub override_intent: Option<String>,
    /// Escalation session id.
    #[clap(long)]
    pub session: Option<String>,
    /// Working directory to evaluate in (defaults to the current directory).
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct TextCli {
    /// Text to inspect.
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub text: Vec<String>,
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct StatusCli {
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ServeCli {
    /// Default working directory for requests that carry no `cwd`.
    #[clap(long)]
    pub cwd: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigCommand {
    /// Print the resolved configuration.
    Show {
        /// Output format: 'toml' or 'json'.
        #[clap(long, default_value = "toml")]
        format: String,
    },
    /// Validate configuration layers; exits 1 when any layer was rejected.
    Check,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ConfigCli {
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Evaluate one action and print the decision. Exits 2 on BLOCK.
    Evaluate(EvaluateCli),
    /// Host hook adapter: reads one event payload from stdin.
    Hook,
    /// JSON-lines service on stdin/stdout.
    Serve(ServeCli),
    /// Classify a shell command.
    Classify(TextCli),
    /// Analyze the intent of a message.
    Intent(TextCli),
    /// Show the workspace snapshot the engine sees.
    Status(StatusCli),
    /// Inspect configuration.
    Config(ConfigCli),
}
