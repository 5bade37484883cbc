//! Workgate: workflow enforcement for agent hosts
//!
//! **Workgate decides, the host enforces.** Before each action (a shell
//! command, a file edit, a user prompt) the host asks Workgate whether the
//! action fits a clean-workspace workflow and gets back ALLOW, WARN or BLOCK
//! with a message explaining what to do next.
//!
//! # Core Principles
//!
//! - **Never the point of failure**: every internal error degrades to ALLOW
//! - **Reads are free**: read-only and vcs-read actions are always allowed
//! - **Maintenance proceeds**: fixing the current change never waits on a clean tree
//! - **New work starts clean**: new work on a dirty workspace is blocked, with an override
//! - **Bounded**: every git/gh query runs under a hard timeout
//!
//! # Architecture
//!
//! - [`core::workspace`]: version-control snapshot (changed paths, branch, last commit)
//! - [`core::cache`]: TTL cache with single-flight recompute and stale-on-error
//! - [`plugins::classify`]: shell command classifier
//! - [`plugins::intent`]: maintenance / new-work / ambiguous message analysis
//! - [`plugins::decide`]: the rule table and [`plugins::decide::Engine`]
//! - [`plugins::escalation`]: per-session repeat counters and severity tiers
//! - [`plugins::hook`], [`plugins::serve`]: host adapters
//!
//! # Examples
//!
//! ```bash
//! # One evaluation
//! workgate evaluate --kind user-message --text "implement new dashboard feature"
//!
//! # As an agent-host hook (payload on stdin, exit 2 blocks)
//! echo '{"hook_event_name":"PreToolUse","tool_name":"Bash","tool_input":{"command":"ls"}}' | workgate hook
//!
//! # Long-lived JSON-lines service
//! workgate serve
//! ```

mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{Cli, Command, ConfigCommand, EvaluateCli, StatusCli, TextCli};
use crate::core::config::{ConfigSources, ResolvedConfig, resolve_config};
use crate::core::error::WorkgateError;
use crate::core::logging::{self, LogProfile};
use crate::core::output::bullet_list;
use crate::plugins::decide::{Action, ActionKind, Engine};
use crate::plugins::hook::{HookEnv, run_hook};
use crate::plugins::intent::IntentCategory;
use clap::Parser;
use colored::Colorize;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

fn resolve_cwd(explicit: Option<PathBuf>, current: &Path) -> PathBuf {
    match explicit {
        Some(p) if p.is_absolute() => p,
        Some(p) => current.join(p),
        None => current.to_path_buf(),
    }
}

fn load_config(cwd: &Path) -> ResolvedConfig {
    resolve_config(&ConfigSources::discover(cwd))
}

fn build_engine(cwd: &Path) -> Result<Engine, WorkgateError> {
    Engine::from_config(load_config(cwd).config)
}

fn parse_kind(raw: &str) -> Result<ActionKind, WorkgateError> {
    match raw {
        "shell-command" | "shell" | "command" => Ok(ActionKind::ShellCommand),
        "file-edit" | "edit" | "file" => Ok(ActionKind::FileEdit),
        "user-message" | "message" | "prompt" => Ok(ActionKind::UserMessage),
        other => Err(WorkgateError::ValidationError(format!(
            "unknown action kind '{}' (expected shell-command, file-edit or user-message)",
            other
        ))),
    }
}

fn check_format(format: &str, allowed: &[&str]) -> Result<(), WorkgateError> {
    if allowed.contains(&format) {
        Ok(())
    } else {
        Err(WorkgateError::ValidationError(format!(
            "unknown format '{}' (expected one of: {})",
            format,
            allowed.join(", ")
        )))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), WorkgateError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse arguments, run the command and return the process exit code.
pub fn run() -> Result<u8, WorkgateError> {
    let cli = Cli::parse();
    let profile = match cli.command {
        Command::Hook | Command::Serve(_) => LogProfile::Host,
        _ => LogProfile::Interactive,
    };
    logging::init(profile, cli.verbose);
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Evaluate(args) => run_evaluate(args, &current_dir),
        Command::Hook => Ok(run_hook_command(&current_dir)),
        Command::Serve(args) => {
            let cwd = resolve_cwd(args.cwd, &current_dir);
            let engine = build_engine(&cwd)?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            plugins::serve::serve(&engine, stdin.lock(), stdout.lock(), &cwd)?;
            Ok(0)
        }
        Command::Classify(args) => run_classify(args, &current_dir),
        Command::Intent(args) => run_intent(args, &current_dir),
        Command::Status(args) => run_status(args, &current_dir),
        Command::Config(args) => {
            let cwd = resolve_cwd(args.cwd, &current_dir);
            let resolved = load_config(&cwd);
            match args.command {
                ConfigCommand::Show { format } => {
                    check_format(&format, &["toml", "json"])?;
                    if format == "json" {
                        print_json(&resolved)?;
                    } else {
                        let rendered = toml::to_string_pretty(&resolved.config)
                            .map_err(|e| WorkgateError::ValidationError(e.to_string()))?;
                        for source in &resolved.sources {
                            println!("# source: {}", source.display());
                        }
                        print!("{}", rendered);
                    }
                    Ok(0)
                }
                ConfigCommand::Check => {
                    if resolved.warnings.is_empty() {
                        println!("{} configuration ok ({} layer(s))", "✓".bright_green(), resolved.sources.len());
                        Ok(0)
                    } else {
                        for warning in &resolved.warnings {
                            eprintln!("{} {}", "✗".bright_red(), warning);
                        }
                        Ok(1)
                    }
                }
            }
        }
    }
}

/// Hooks never fail the host: any error here allows the action.
fn run_hook_command(current_dir: &Path) -> u8 {
    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        tracing::warn!(error = %e, "could not read hook payload, allowing");
        return 0;
    }
    let engine = match build_engine(current_dir) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!(error = %e, "engine unavailable, allowing");
            return 0;
        }
    };
    let outcome = run_hook(&engine, &raw, &HookEnv::from_env(), current_dir);
    if let Some(out) = &outcome.stdout {
        println!("{}", out);
    }
    if let Some(err) = &outcome.stderr {
        eprintln!("{}", err);
    }
    outcome.exit_code
}

fn run_evaluate(args: EvaluateCli, current_dir: &Path) -> Result<u8, WorkgateError> {
    check_format(&args.format, &["text", "json"])?;
    let cwd = resolve_cwd(args.cwd, current_dir);
    let mut action = Action::new(parse_kind(&args.kind)?, args.text);
    if let Some(context) = args.context {
        action = action.with_context(context);
    }
    if let Some(raw) = args.override_intent {
        let category = IntentCategory::parse_override(&raw).ok_or_else(|| {
            WorkgateError::ValidationError(format!("unknown override '{}'", raw))
        })?;
        action = action.with_override(category);
    }
    if let Some(session) = args.session {
        action = action.with_session(session);
    }

    let engine = build_engine(&cwd)?;
    let decision = engine.evaluate(&action, &cwd);

    if args.format == "json" {
        print_json(&decision)?;
    } else {
        let color = std::io::stdout().is_terminal();
        let verdict = decision.verdict.as_str().to_uppercase();
        let verdict = if color {
            match decision.verdict {
                plugins::decide::Verdict::Allow => verdict.bright_green().to_string(),
                plugins::decide::Verdict::Warn => verdict.bright_yellow().to_string(),
                plugins::decide::Verdict::Block => verdict.bright_red().to_string(),
            }
        } else {
            verdict
        };
        let tier = decision
            .severity
            .map(|t| format!(", {}", t.as_str()))
            .unwrap_or_default();
        println!("{} ({:?}{})", verdict, decision.rule, tier);
        if let Some(kind) = &decision.degraded {
            println!("degraded: {}", kind);
        }
        if let Some(text) = decision.render(color) {
            println!();
            println!("{}", text);
        }
    }
    Ok(decision.exit_code())
}

fn run_classify(args: TextCli, current_dir: &Path) -> Result<u8, WorkgateError> {
    check_format(&args.format, &["text", "json"])?;
    let cwd = resolve_cwd(args.cwd, current_dir);
    let engine = build_engine(&cwd)?;
    let result = engine.classifier().classify(&args.text.join(" "));
    if args.format == "json" {
        print_json(&result)?;
    } else {
        println!("access:   {}", result.access_kind.as_str());
        println!("intent:   {}", result.work_intent.as_str());
        if let Some(creation) = result.creation {
            println!("creates:  {}", creation.as_str());
        }
        if result.docs_only {
            println!("docs-only writes");
        }
    }
    Ok(0)
}

fn run_intent(args: TextCli, current_dir: &Path) -> Result<u8, WorkgateError> {
    check_format(&args.format, &["text", "json"])?;
    let cwd = resolve_cwd(args.cwd, current_dir);
    let engine = build_engine(&cwd)?;
    let workspace = engine.workspace(&cwd)?;
    let result = engine.analyzer().analyze(&args.text.join(" "), &workspace)?;
    if args.format == "json" {
        print_json(&result)?;
    } else {
        println!("category:   {}", result.category.as_str());
        println!("confidence: {:.3}", result.confidence);
        if !result.matched_patterns.is_empty() {
            println!("matched:\n{}", bullet_list(&result.matched_patterns, 20));
        }
        for signal in &result.signals {
            println!("signal:     {}", signal);
        }
    }
    Ok(0)
}

fn run_status(args: StatusCli, current_dir: &Path) -> Result<u8, WorkgateError> {
    check_format(&args.format, &["text", "json"])?;
    let cwd = resolve_cwd(args.cwd, current_dir);
    let engine = build_engine(&cwd)?;
    let ws = engine.workspace(&cwd)?;
    if args.format == "json" {
        print_json(&ws)?;
        return Ok(0);
    }
    println!("branch:  {}", ws.branch_name());
    let dirty = match ws.is_dirty() {
        Some(true) => format!("dirty ({} change(s))", ws.changed_file_paths().len()),
        Some(false) => "clean".to_string(),
        None => "unknown (status timed out)".to_string(),
    };
    println!("state:   {}", dirty);
    if let Some(secs) = ws.seconds_since_last_commit() {
        println!("commit:  {}s ago", secs);
    }
    if let Some(issue) = ws.issue_number() {
        println!("issue:   #{}", issue);
    }
    if !ws.changed_file_paths().is_empty() {
        println!("{}", bullet_list(ws.changed_file_paths(), 20));
    }
    Ok(0)
}
