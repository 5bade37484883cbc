//! Tracing setup for the CLI.
//!
//! Logs always go to stderr; stdout carries results and hook payloads.

use tracing_subscriber::EnvFilter;

/// Default verbosity when neither `--verbose` nor an env filter is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// Interactive commands: degraded-mode lines visible.
    Interactive,
    /// Host-facing adapters (`hook`, `serve`): silent unless asked.
    Host,
}

pub fn filter_directive(profile: LogProfile, verbose: bool, env_filter: Option<&str>, debug_flag: bool) -> String {
    if verbose {
        return "workgate=debug".to_string();
    }
    if let Some(directive) = env_filter.filter(|d| !d.trim().is_empty()) {
        return directive.to_string();
    }
    if debug_flag {
        return "workgate=debug".to_string();
    }
    match profile {
        LogProfile::Interactive => "warn".to_string(),
        LogProfile::Host => "error".to_string(),
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init(profile: LogProfile, verbose: bool) {
    let env_filter = std::env::var("WORKGATE_LOG").ok();
    let debug_flag = std::env::var("WORKGATE_DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let directive = filter_directive(profile, verbose, env_filter.as_deref(), debug_flag);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(profile == LogProfile::Interactive)
        .try_init();
}
