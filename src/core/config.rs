//! Layered configuration.
//!
//! Resolution order, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. global file (`$WORKGATE_HOME/config.toml`, else `~/.workgate/config.toml`)
//! 3. project file (`<repo>/.workgate/config.toml`, found by walking up from cwd)
//! 4. environment overrides (`WORKGATE_*`)
//!
//! A layer that cannot be parsed or that fails validation is dropped whole and
//! recorded in [`ResolvedConfig::warnings`]; resolution itself never fails.

use crate::core::error::WorkgateError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR_NAME: &str = ".workgate";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// A single intent pattern. Bare strings use the regex itself as the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Bare(String),
    Named { id: String, pattern: String },
}

impl PatternSpec {
    pub fn named(id: &str, pattern: &str) -> Self {
        Self::Named {
            id: id.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Bare(p) => p,
            Self::Named { id, .. } => id,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Self::Bare(p) => p,
            Self::Named { pattern, .. } => pattern,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentConfig {
    pub maintenance: Vec<PatternSpec>,
    pub new_work: Vec<PatternSpec>,
    /// Minimum distinct matches a set needs before it can win.
    pub min_matches: usize,
    /// When both sets match, the winner's normalized score must be at least
    /// this multiple of the loser's; otherwise the result is ambiguous.
    pub dominance_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalationConfig {
    pub reminder_at: u32,
    pub warning_at: u32,
    pub block_at: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutConfig {
    pub vcs_ms: u64,
    pub issue_tracker_ms: u64,
    pub analysis_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnforcementConfig {
    pub enabled: bool,
    pub allow_docs_edits: bool,
    /// Honor `--force-maintenance` / `--force-new-work` and explicit overrides.
    pub allow_override: bool,
    pub spec_dirs: Vec<String>,
    pub docs_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueTrackerConfig {
    pub enabled: bool,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkgateConfig {
    pub intent: IntentConfig,
    pub cache: CacheConfig,
    pub escalation: EscalationConfig,
    pub timeouts: TimeoutConfig,
    pub enforcement: EnforcementConfig,
    pub issue_tracker: IssueTrackerConfig,
}

impl WorkgateConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn vcs_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.vcs_ms)
    }

    pub fn issue_tracker_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.issue_tracker_ms)
    }

    pub fn analysis_budget(&self) -> Duration {
        Duration::from_millis(self.timeouts.analysis_ms)
    }
}

impl Default for WorkgateConfig {
    fn default() -> Self {
        Self {
            intent: IntentConfig {
                maintenance: default_maintenance_patterns(),
                new_work: default_new_work_patterns(),
                min_matches: 1,
                dominance_ratio: 2.0,
            },
            cache: CacheConfig {
                ttl_seconds: 300,
                max_entries: 256,
            },
            escalation: EscalationConfig {
                reminder_at: 2,
                warning_at: 4,
                block_at: 6,
            },
            timeouts: TimeoutConfig {
                vcs_ms: 100,
                issue_tracker_ms: 500,
                analysis_ms: 50,
            },
            enforcement: EnforcementConfig {
                enabled: true,
                allow_docs_edits: true,
                allow_override: true,
                spec_dirs: vec![".agent-os/specs".to_string(), "specs".to_string()],
                docs_patterns: vec![
                    "*.md".to_string(),
                    "*.mdc".to_string(),
                    "**/docs/**".to_string(),
                ],
            },
            issue_tracker: IssueTrackerConfig {
                enabled: true,
                command: "gh".to_string(),
            },
        }
    }
}

pub fn default_maintenance_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec::named("fix-tests", r"\bfix\b.*\btests?\b"),
        PatternSpec::named("fix-bug", r"\bfix\b.*\bbugs?\b"),
        PatternSpec::named("fix-issue", r"\bfix\b.*\bissues?\b"),
        PatternSpec::named("fix-errors", r"\bfix\b.*\berrors?\b"),
        PatternSpec::named("fix-failing", r"\bfix\b.*\bfail"),
        PatternSpec::named("fix-broken", r"\bfix\b.*\bbrok"),
        PatternSpec::named("debug", r"\bdebug"),
        PatternSpec::named("resolve-conflicts", r"\bresolve\b.*\bconflicts?\b"),
        PatternSpec::named("resolve-errors", r"\bresolve\b.*\berrors?\b"),
        PatternSpec::named("address-ci", r"\baddress\b.*\b(ci|pipeline|review)\b"),
        PatternSpec::named("update-dependencies", r"\bupdate\b.*\bdependen"),
        PatternSpec::named("refactor", r"\brefactor"),
        PatternSpec::named("fix-lint", r"\bfix\b.*\b(lint|styles?|format)"),
        PatternSpec::named("fix-performance", r"\bfix\b.*\bperformance\b"),
        PatternSpec::named("repair", r"\brepair\b"),
        PatternSpec::named("patch", r"\b(patch|hotfix)\b"),
    ]
}

pub fn default_new_work_patterns() -> Vec<PatternSpec> {
    vec![
        PatternSpec::named("implement-feature", r"\bimplement\b.*\b(feature|functionality)\b"),
        PatternSpec::named("implement-auth", r"\bimplement\b.*\b(oauth|auth|login|signup)\b"),
        PatternSpec::named("build-new", r"\bbuild\b.*\bnew\b"),
        PatternSpec::named(
            "build-surface",
            r"\bbuild\b.*\b(dashboard|interface|system|feature|page)\b",
        ),
        PatternSpec::named(
            "create-component",
            r"\bcreate\b.*\b(feature|component|system|interface|page)\b",
        ),
        PatternSpec::named("create-service", r"\bcreate\b.*\b(api|endpoint|service)\b"),
        PatternSpec::named("add-feature", r"\badd\b.*\b(feature|functionality|system)\b"),
        PatternSpec::named(
            "add-capability",
            r"\badd\b.*\b(search|notifications?|integration|support for)\b",
        ),
        PatternSpec::named(
            "develop-feature",
            r"\b(develop|design)\b.*\b(feature|system|interface|component)\b",
        ),
        PatternSpec::named("new-spec", r"(/create-spec|\bnew spec\b)"),
    ]
}

/// Optional-everything mirror of [`WorkgateConfig`] as it appears on disk.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigLayer {
    intent: Option<IntentLayer>,
    cache: Option<CacheLayer>,
    escalation: Option<EscalationLayer>,
    timeouts: Option<TimeoutLayer>,
    enforcement: Option<EnforcementLayer>,
    issue_tracker: Option<IssueTrackerLayer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IntentLayer {
    maintenance: Option<Vec<PatternSpec>>,
    new_work: Option<Vec<PatternSpec>>,
    #[serde(default)]
    maintenance_extra: Vec<PatternSpec>,
    #[serde(default)]
    new_work_extra: Vec<PatternSpec>,
    min_matches: Option<usize>,
    dominance_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheLayer {
    ttl_seconds: Option<u64>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EscalationLayer {
    reminder_at: Option<u32>,
    warning_at: Option<u32>,
    block_at: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimeoutLayer {
    vcs_ms: Option<u64>,
    issue_tracker_ms: Option<u64>,
    analysis_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnforcementLayer {
    enabled: Option<bool>,
    allow_docs_edits: Option<bool>,
    allow_override: Option<bool>,
    spec_dirs: Option<Vec<String>>,
    docs_patterns: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IssueTrackerLayer {
    enabled: Option<bool>,
    command: Option<String>,
}

impl WorkgateConfig {
    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(intent) = layer.intent {
            if let Some(v) = intent.maintenance {
                self.intent.maintenance = v;
            }
            if let Some(v) = intent.new_work {
                self.intent.new_work = v;
            }
            self.intent.maintenance.extend(intent.maintenance_extra);
            self.intent.new_work.extend(intent.new_work_extra);
            if let Some(v) = intent.min_matches {
                self.intent.min_matches = v;
            }
            if let Some(v) = intent.dominance_ratio {
                self.intent.dominance_ratio = v;
            }
        }
        if let Some(cache) = layer.cache {
            if let Some(v) = cache.ttl_seconds {
                self.cache.ttl_seconds = v;
            }
            if let Some(v) = cache.max_entries {
                self.cache.max_entries = v;
            }
        }
        if let Some(esc) = layer.escalation {
            if let Some(v) = esc.reminder_at {
                self.escalation.reminder_at = v;
            }
            if let Some(v) = esc.warning_at {
                self.escalation.warning_at = v;
            }
            if let Some(v) = esc.block_at {
                self.escalation.block_at = v;
            }
        }
        if let Some(t) = layer.timeouts {
            if let Some(v) = t.vcs_ms {
                self.timeouts.vcs_ms = v;
            }
            if let Some(v) = t.issue_tracker_ms {
                self.timeouts.issue_tracker_ms = v;
            }
            if let Some(v) = t.analysis_ms {
                self.timeouts.analysis_ms = v;
            }
        }
        if let Some(e) = layer.enforcement {
            if let Some(v) = e.enabled {
                self.enforcement.enabled = v;
            }
            if let Some(v) = e.allow_docs_edits {
                self.enforcement.allow_docs_edits = v;
            }
            if let Some(v) = e.allow_override {
                self.enforcement.allow_override = v;
            }
            if let Some(v) = e.spec_dirs {
                self.enforcement.spec_dirs = v;
            }
            if let Some(v) = e.docs_patterns {
                self.enforcement.docs_patterns = v;
            }
        }
        if let Some(it) = layer.issue_tracker {
            if let Some(v) = it.enabled {
                self.issue_tracker.enabled = v;
            }
            if let Some(v) = it.command {
                self.issue_tracker.command = v;
            }
        }
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), String> {
        for (set, patterns) in [
            ("maintenance", &self.intent.maintenance),
            ("new_work", &self.intent.new_work),
        ] {
            if patterns.is_empty() {
                return Err(format!("intent.{} must not be empty", set));
            }
            for p in patterns {
                RegexBuilder::new(p.pattern())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| format!("intent.{} pattern '{}': {}", set, p.id(), e))?;
            }
        }
        for m in &self.intent.maintenance {
            if self
                .intent
                .new_work
                .iter()
                .any(|n| n.id() == m.id() || n.pattern() == m.pattern())
            {
                return Err(format!(
                    "pattern '{}' appears in both maintenance and new_work",
                    m.id()
                ));
            }
        }
        if self.intent.min_matches == 0 {
            return Err("intent.min_matches must be at least 1".to_string());
        }
        if !(self.intent.dominance_ratio >= 1.0) {
            return Err("intent.dominance_ratio must be >= 1.0".to_string());
        }
        let e = &self.escalation;
        if e.reminder_at < 2 || e.reminder_at > e.warning_at || e.warning_at > e.block_at {
            return Err(format!(
                "escalation thresholds must satisfy 2 <= reminder_at <= warning_at <= block_at (got {}, {}, {})",
                e.reminder_at, e.warning_at, e.block_at
            ));
        }
        if self.cache.max_entries == 0 {
            return Err("cache.max_entries must be at least 1".to_string());
        }
        if self.timeouts.vcs_ms == 0 || self.timeouts.issue_tracker_ms == 0 {
            return Err("timeouts must be non-zero".to_string());
        }
        compile_globs("enforcement.docs_patterns", &self.enforcement.docs_patterns)
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Compile path globs into one matcher. `*` crosses directory separators, so
/// `*.md` matches at any depth.
pub fn compile_globs(field: &str, patterns: &[String]) -> Result<GlobSet, WorkgateError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern.trim_start_matches("./")).map_err(|e| {
            WorkgateError::ValidationError(format!("{} '{}': {}", field, pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| WorkgateError::ValidationError(format!("{}: {}", field, e)))
}

/// Where configuration comes from. Built by [`ConfigSources::discover`] in
/// production; tests construct it directly.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub global: Option<PathBuf>,
    pub project: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl ConfigSources {
    pub fn discover(cwd: &Path) -> Self {
        let global = std::env::var_os("WORKGATE_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(CONFIG_DIR_NAME)))
            .map(|dir| dir.join(CONFIG_FILE_NAME));
        let env = std::env::vars()
            .filter(|(k, _)| k.starts_with("WORKGATE_"))
            .collect();
        Self {
            global,
            project: find_project_config(cwd),
            env,
        }
    }
}

/// Walk up from `cwd` to the repository root looking for `.workgate/config.toml`.
pub fn find_project_config(cwd: &Path) -> Option<PathBuf> {
    let mut dir = Some(cwd);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if current.join(".git").exists() {
            return None;
        }
        dir = current.parent();
    }
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub config: WorkgateConfig,
    /// Files that contributed, in application order.
    pub sources: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

pub fn resolve_config(sources: &ConfigSources) -> ResolvedConfig {
    let mut config = WorkgateConfig::default();
    let mut applied = Vec::new();
    let mut warnings = Vec::new();

    for path in [&sources.global, &sources.project].into_iter().flatten() {
        if !path.is_file() {
            continue;
        }
        match load_layer(path).and_then(|layer| {
            let mut candidate = config.clone();
            candidate.apply(layer);
            candidate
                .validate()
                .map(|_| candidate)
                .map_err(|reason| WorkgateError::ConfigMalformed {
                    path: path.clone(),
                    reason,
                })
        }) {
            Ok(candidate) => {
                tracing::debug!(path = %path.display(), "applied config layer");
                config = candidate;
                applied.push(path.clone());
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring config layer, keeping previous values");
                warnings.push(e.to_string());
            }
        }
    }

    apply_env_overrides(&mut config, &sources.env, &mut warnings);

    ResolvedConfig {
        config,
        sources: applied,
        warnings,
    }
}

fn load_layer(path: &Path) -> Result<ConfigLayer, WorkgateError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| WorkgateError::ConfigMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn apply_env_overrides(
    config: &mut WorkgateConfig,
    env: &[(String, String)],
    warnings: &mut Vec<String>,
) {
    for (key, value) in env {
        let value = value.trim();
        match key.as_str() {
            "WORKGATE_CACHE_TTL_SECONDS" => match value.parse::<u64>() {
                Ok(v) => config.cache.ttl_seconds = v,
                Err(_) => warnings.push(format!("{}='{}' is not a number", key, value)),
            },
            "WORKGATE_VCS_TIMEOUT_MS" => match value.parse::<u64>() {
                Ok(v) if v > 0 => config.timeouts.vcs_ms = v,
                _ => warnings.push(format!("{}='{}' is not a positive number", key, value)),
            },
            "WORKGATE_ENFORCEMENT" => match value.to_ascii_lowercase().as_str() {
                "off" | "false" | "0" => config.enforcement.enabled = false,
                "on" | "true" | "1" => config.enforcement.enabled = true,
                _ => warnings.push(format!("{}='{}' should be 'on' or 'off'", key, value)),
            },
            _ => {}
        }
    }
}
