//! Decision engine.
//!
//! `Engine::evaluate` combines the command classification, the intent behind
//! the action and the workspace snapshot into ALLOW, WARN or BLOCK. Rules are
//! checked in precedence order and the first match wins:
//!
//! 1. read-only / vcs-read actions are allowed
//! 2. vcs writes that don't create anything are allowed (remediation)
//! 3. docs-only edits are allowed
//! 4. maintenance is allowed, except branch/spec/issue creation on a dirty
//!    workspace that was not explicitly declared maintenance
//! 5. new work on a dirty workspace is blocked
//! 6. ambiguous intent on a dirty workspace warns
//! 7. everything else is allowed
//!
//! Any internal failure degrades to ALLOW with a logged warning.

use crate::core::cache::ContextCache;
use crate::core::config::WorkgateConfig;
use crate::core::error::WorkgateError;
use crate::core::time::{new_decision_id, now_epoch_z, unix_now};
use crate::core::workspace::{GitCli, VersionControl, WorkspaceState, read_workspace};
use crate::plugins::classify::{
    AccessKind, ClassificationResult, Classifier, CreationKind, WorkIntent,
};
use crate::plugins::escalation::{EscalationKey, EscalationTracker, SeverityTier, Topic};
use crate::plugins::guidance::{self, DecisionMessage};
use crate::plugins::intent::{IntentAnalyzer, IntentCategory, IntentResult, IntentSource};
use crate::plugins::issues::{GhIssueTracker, IssueRef, IssueTracker, NoIssueTracker};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ShellCommand,
    FileEdit,
    UserMessage,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShellCommand => "shell-command",
            Self::FileEdit => "file-edit",
            Self::UserMessage => "user-message",
        }
    }
}

/// One proposed action. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Command line, file path or message, depending on `kind`.
    pub text: String,
    /// The user message that led to a tool action, when the host knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_intent: Option<IntentCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "unix_now")]
    pub timestamp: u64,
}

impl Action {
    pub fn new(kind: ActionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            context: None,
            override_intent: None,
            session_id: None,
            timestamp: unix_now(),
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(ActionKind::ShellCommand, command)
    }

    pub fn file_edit(path: impl Into<String>) -> Self {
        Self::new(ActionKind::FileEdit, path)
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(ActionKind::UserMessage, text)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_override(mut self, category: IntentCategory) -> Self {
        self.override_intent = Some(category);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Warn,
    Block,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }
}

/// The rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    EnforcementDisabled,
    VcsUnavailable,
    Degraded,
    ReadOnly,
    Remediation,
    DocsOnly,
    Maintenance,
    CreationOnDirty,
    NewWorkOnDirty,
    AmbiguousOnDirty,
    Default,
}

/// Evaluation lifecycle: `Idle -> Evaluating -> {Allowed, Warned, Blocked} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Evaluating,
    Allowed,
    Warned,
    Blocked,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Evaluating)
                | (Phase::Evaluating, Phase::Allowed | Phase::Warned | Phase::Blocked)
                | (Phase::Allowed | Phase::Warned | Phase::Blocked, Phase::Idle)
        )
    }
}

impl From<Verdict> for Phase {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => Phase::Allowed,
            Verdict::Warn => Phase::Warned,
            Verdict::Block => Phase::Blocked,
        }
    }
}

struct PhaseCursor {
    phase: Phase,
    fingerprint: String,
}

impl PhaseCursor {
    fn advance(&mut self, next: Phase) {
        if !self.phase.can_transition_to(next) {
            tracing::error!(from = ?self.phase, to = ?next, "invalid evaluation transition");
        }
        tracing::trace!(fingerprint = %self.fingerprint, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }
}

/// Final, write-once verdict for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<DecisionMessage>,
    pub cacheable: bool,
    pub rule: Rule,
    pub fingerprint: String,
    pub classification: ClassificationResult,
    pub intent: IntentResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_count: Option<u32>,
    /// Error kind that forced a permissive fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
    pub evaluated_at: String,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Process exit code for hook hosts: 2 blocks, everything else proceeds.
    pub fn exit_code(&self) -> u8 {
        match self.verdict {
            Verdict::Block => 2,
            Verdict::Allow | Verdict::Warn => 0,
        }
    }

    pub fn render(&self, color: bool) -> Option<String> {
        self.message.as_ref().map(|m| m.render(color))
    }
}

pub fn derive_fingerprint(action: &Action, cwd: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.kind.as_str());
    hasher.update(b"|");
    hasher.update(&action.text);
    hasher.update(b"|");
    hasher.update(cwd.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn message_key(cwd: &Path, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text);
    format!("{}|msg|{:x}", cwd.display(), hasher.finalize())
}

#[derive(Debug, Clone)]
struct CachedWorkspace {
    state: WorkspaceState,
    fingerprint: Option<String>,
}

/// Outcome of the rule table before escalation and rendering.
enum Outcome {
    Allow(Rule),
    Escalate {
        verdict: Verdict,
        rule: Rule,
        topic: Topic,
    },
}

pub struct Engine {
    config: WorkgateConfig,
    classifier: Classifier,
    analyzer: IntentAnalyzer,
    vcs: Arc<dyn VersionControl>,
    issues: Arc<dyn IssueTracker>,
    workspaces: ContextCache<CachedWorkspace>,
    intents: ContextCache<IntentResult>,
    issue_refs: ContextCache<Option<IssueRef>>,
    sessions: Mutex<FxHashMap<String, Arc<EscalationTracker>>>,
}

impl Engine {
    pub fn new(
        config: WorkgateConfig,
        vcs: Arc<dyn VersionControl>,
        issues: Arc<dyn IssueTracker>,
    ) -> Result<Self, WorkgateError> {
        let analyzer = IntentAnalyzer::from_config(&config)?;
        let classifier = Classifier::new(
            config.enforcement.spec_dirs.clone(),
            config.enforcement.docs_patterns.clone(),
        )?;
        let max_entries = config.cache.max_entries;
        Ok(Self {
            config,
            classifier,
            analyzer,
            vcs,
            issues,
            workspaces: ContextCache::new(max_entries),
            intents: ContextCache::new(max_entries),
            issue_refs: ContextCache::new(max_entries),
            sessions: Mutex::new(FxHashMap::default()),
        })
    }

    /// Engine backed by `git`, and by `gh` when issue lookups are enabled.
    pub fn from_config(config: WorkgateConfig) -> Result<Self, WorkgateError> {
        let issues: Arc<dyn IssueTracker> = if config.issue_tracker.enabled {
            Arc::new(GhIssueTracker::new(config.issue_tracker.command.clone()))
        } else {
            Arc::new(NoIssueTracker)
        };
        Self::new(config, Arc::new(GitCli::default()), issues)
    }

    pub fn config(&self) -> &WorkgateConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn analyzer(&self) -> &IntentAnalyzer {
        &self.analyzer
    }

    fn tracker(&self, session: &str) -> Arc<EscalationTracker> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            sessions
                .entry(session.to_string())
                .or_insert_with(|| Arc::new(EscalationTracker::new(self.config.escalation.clone()))),
        )
    }

    /// Attempt count for `(branch, topic)` in `session`, zero if never seen.
    pub fn attempt_count(&self, session: &str, branch: &str, topic: Topic) -> u32 {
        self.tracker(session)
            .attempt_count(&EscalationKey::new(branch, topic))
    }

    /// Drop a session's escalation counters. Returns whether it existed.
    pub fn end_session(&self, session: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session)
            .is_some();
        tracing::debug!(session, removed, "session ended");
        removed
    }

    /// Cached workspace snapshot for `cwd`. Dropped early when the repository
    /// fingerprint (HEAD, index, working tree) moved since it was taken.
    /// Degraded snapshots are never served from the cache.
    pub fn workspace(&self, cwd: &Path) -> Result<WorkspaceState, WorkgateError> {
        let key = format!("{}|workspace", cwd.display());
        let fingerprint = self.vcs.fingerprint(cwd, self.config.vcs_timeout());
        if let Some(cached) = self.workspaces.peek(&key)
            && fingerprint.is_some()
            && cached.fingerprint != fingerprint
        {
            tracing::debug!(cwd = %cwd.display(), "repository moved, dropping snapshot");
            self.workspaces.invalidate(&key);
        }

        let mut failure = None;
        let result = self.workspaces.get_or_compute_with(&key, || {
            read_workspace(self.vcs.as_ref(), cwd, self.config.vcs_timeout())
                .map(|state| {
                    let ttl = if state.is_degraded() {
                        Duration::ZERO
                    } else {
                        self.config.cache_ttl()
                    };
                    let cached = CachedWorkspace {
                        state,
                        fingerprint: fingerprint.clone(),
                    };
                    (cached, ttl)
                })
                .map_err(|e| {
                    let wrapped = WorkgateError::CacheComputeFailure(e.to_string());
                    failure = Some(e);
                    wrapped
                })
        });
        match result {
            Ok(cached) => Ok(cached.state),
            Err(err) => Err(failure.unwrap_or(err)),
        }
    }

    /// Record a completed action. Writes invalidate cached workspace and issue state.
    pub fn observe(&self, action: &Action, cwd: &Path) {
        let access = match action.kind {
            ActionKind::ShellCommand => self.classifier.classify(&action.text).access_kind,
            ActionKind::FileEdit => AccessKind::Mutating,
            ActionKind::UserMessage => return,
        };
        if access.is_read() {
            return;
        }
        tracing::debug!(cwd = %cwd.display(), access = access.as_str(), "invalidating workspace context");
        self.workspaces.invalidate(&format!("{}|workspace", cwd.display()));
        self.issue_refs.invalidate_prefix(&format!("{}|issue|", cwd.display()));
    }

    pub fn evaluate(&self, action: &Action, cwd: &Path) -> Decision {
        let fingerprint = derive_fingerprint(action, cwd);
        let mut phase = PhaseCursor {
            phase: Phase::Idle,
            fingerprint: fingerprint.clone(),
        };
        phase.advance(Phase::Evaluating);

        let decision = self.decide(action, cwd, fingerprint);

        phase.advance(decision.verdict.into());
        tracing::info!(
            verdict = decision.verdict.as_str(),
            rule = ?decision.rule,
            kind = action.kind.as_str(),
            access = decision.classification.access_kind.as_str(),
            intent = decision.intent.category.as_str(),
            "evaluated"
        );
        phase.advance(Phase::Idle);
        decision
    }

    fn decide(&self, action: &Action, cwd: &Path, fingerprint: String) -> Decision {
        let base = |verdict: Verdict, rule: Rule, classification: ClassificationResult, intent: IntentResult| Decision {
            id: new_decision_id(),
            verdict,
            severity: None,
            message: None,
            cacheable: matches!(
                rule,
                Rule::ReadOnly | Rule::EnforcementDisabled | Rule::VcsUnavailable
            ),
            rule,
            fingerprint: fingerprint.clone(),
            classification,
            intent,
            attempt_count: None,
            degraded: None,
            evaluated_at: now_epoch_z(),
        };

        if !self.config.enforcement.enabled {
            return base(
                Verdict::Allow,
                Rule::EnforcementDisabled,
                self.classify_action(action, cwd)
                    .unwrap_or_else(|_| ClassificationResult::unknown()),
                IntentResult::unknown(),
            );
        }

        let (classification, context) = rayon::join(
            || self.classify_action(action, cwd),
            || {
                self.workspace(cwd)
                    .and_then(|ws| self.resolve_intent(action, cwd, &ws).map(|intent| (ws, intent)))
            },
        );

        let degrade = |err: WorkgateError, classification: ClassificationResult, rule: Rule| {
            let mut decision = base(Verdict::Allow, rule, classification, IntentResult::unknown());
            decision.degraded = Some(err.kind().to_string());
            decision
        };

        let classification = match classification {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(error = %err, "classification failed, allowing");
                return degrade(err, ClassificationResult::unknown(), Rule::Degraded);
            }
        };
        let (workspace, intent) = match context {
            Ok(context) => context,
            Err(err @ WorkgateError::VcsUnavailable(_)) => {
                tracing::debug!(error = %err, "not a repository, enforcement off");
                let mut decision = degrade(err, classification, Rule::VcsUnavailable);
                decision.cacheable = true;
                return decision;
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "context unavailable, allowing");
                return degrade(err, classification, Rule::Degraded);
            }
        };

        let outcome = self.apply_rules(&classification, &intent, &workspace);
        let tracker = self.tracker(action.session());
        match outcome {
            Outcome::Allow(rule) => {
                tracker.reset_branch(workspace.branch_name());
                let mut decision = base(Verdict::Allow, rule, classification, intent);
                decision.degraded = workspace.is_degraded().then(|| "vcs_timeout".to_string());
                decision
            }
            Outcome::Escalate {
                verdict,
                rule,
                topic,
            } => {
                let (attempts, tier) =
                    tracker.record(EscalationKey::new(workspace.branch_name(), topic));
                let issue = self.issue_for(cwd, &workspace);
                let mut message = match topic {
                    Topic::NewWorkOnDirty => {
                        guidance::new_work_on_dirty(&workspace, &intent, tier, attempts, issue.as_ref())
                    }
                    Topic::CreationOnDirty => guidance::creation_on_dirty(
                        &workspace,
                        classification.creation.unwrap_or(CreationKind::Branch),
                        tier,
                        attempts,
                        issue.as_ref(),
                    ),
                    Topic::AmbiguousOnDirty => {
                        guidance::ambiguous_on_dirty(&workspace, &intent, tier, attempts, issue.as_ref())
                    }
                };
                if !self.config.enforcement.allow_override {
                    message.override_hint = None;
                }
                let mut decision = base(verdict, rule, classification, intent);
                decision.severity = Some(tier);
                decision.attempt_count = Some(attempts);
                decision.message = Some(message);
                decision
            }
        }
    }

    fn apply_rules(
        &self,
        classification: &ClassificationResult,
        intent: &IntentResult,
        workspace: &WorkspaceState,
    ) -> Outcome {
        if classification.access_kind.is_read() {
            return Outcome::Allow(Rule::ReadOnly);
        }
        let creates = classification.creation.is_some();
        if classification.access_kind == AccessKind::VcsWrite && !creates {
            return Outcome::Allow(Rule::Remediation);
        }
        if classification.docs_only && !creates && self.config.enforcement.allow_docs_edits {
            return Outcome::Allow(Rule::DocsOnly);
        }

        // Unknown dirtiness counts as clean.
        let dirty = workspace.is_known_dirty();
        let declared = intent.source == IntentSource::Override;
        match intent.category {
            IntentCategory::Maintenance if creates && dirty && !declared => Outcome::Escalate {
                verdict: Verdict::Block,
                rule: Rule::CreationOnDirty,
                topic: Topic::CreationOnDirty,
            },
            IntentCategory::Maintenance => Outcome::Allow(Rule::Maintenance),
            IntentCategory::NewWork if dirty => Outcome::Escalate {
                verdict: Verdict::Block,
                rule: Rule::NewWorkOnDirty,
                topic: Topic::NewWorkOnDirty,
            },
            IntentCategory::Ambiguous if dirty => Outcome::Escalate {
                verdict: Verdict::Warn,
                rule: Rule::AmbiguousOnDirty,
                topic: if creates {
                    Topic::CreationOnDirty
                } else {
                    Topic::AmbiguousOnDirty
                },
            },
            _ => Outcome::Allow(Rule::Default),
        }
    }

    fn classify_action(
        &self,
        action: &Action,
        cwd: &Path,
    ) -> Result<ClassificationResult, WorkgateError> {
        match action.kind {
            ActionKind::ShellCommand => self
                .classifier
                .classify_with_budget(&action.text, self.config.analysis_budget()),
            ActionKind::FileEdit => {
                let path = Path::new(&action.text);
                let absolute = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    cwd.join(path)
                };
                let relative = absolute
                    .strip_prefix(cwd)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| action.text.clone());
                Ok(self.classifier.classify_edit(&relative, absolute.exists()))
            }
            // A message proposes work; it is never a read.
            ActionKind::UserMessage => Ok(ClassificationResult {
                access_kind: AccessKind::Mutating,
                work_intent: WorkIntent::Other,
                creation: None,
                docs_only: false,
            }),
        }
    }

    /// Intent behind `action`: override, then the action's own message or
    /// context, then the last message seen in this directory.
    fn resolve_intent(
        &self,
        action: &Action,
        cwd: &Path,
        workspace: &WorkspaceState,
    ) -> Result<IntentResult, WorkgateError> {
        let remembered_key = format!("{}|intent", cwd.display());
        match action.override_intent {
            Some(category) if self.config.enforcement.allow_override => {
                let intent = IntentResult::overridden(category);
                if action.kind == ActionKind::UserMessage {
                    self.intents
                        .insert(&remembered_key, intent.clone(), self.config.cache_ttl());
                }
                return Ok(intent);
            }
            Some(category) => {
                tracing::info!(intent = category.as_str(), "overrides disabled, ignoring");
            }
            None => {}
        }
        let message = match action.kind {
            ActionKind::UserMessage => Some(action.text.as_str()),
            _ => action.context.as_deref(),
        }
        .filter(|m| !m.trim().is_empty());

        let Some(message) = message else {
            return Ok(self
                .intents
                .peek(&remembered_key)
                .map(IntentResult::remembered)
                .unwrap_or_else(IntentResult::unknown));
        };

        let mut failure = None;
        let analyzed = self.intents.get_or_compute(
            &message_key(cwd, message),
            self.config.cache_ttl(),
            || {
                self.analyzer.analyze(message, workspace).map_err(|e| {
                    let wrapped = WorkgateError::CacheComputeFailure(e.to_string());
                    failure = Some(e);
                    wrapped
                })
            },
        );
        let intent = analyzed.map_err(|err| failure.unwrap_or(err))?;
        self.intents
            .insert(&remembered_key, intent.clone(), self.config.cache_ttl());
        Ok(intent)
    }

    /// Issue or PR for the current branch. Lookup failures only cost the enrichment.
    fn issue_for(&self, cwd: &Path, workspace: &WorkspaceState) -> Option<IssueRef> {
        let key = format!("{}|issue|{}", cwd.display(), workspace.branch_name());
        self.issue_refs
            .get_or_compute(&key, self.config.cache_ttl(), || {
                self.issues.find_for_branch(
                    cwd,
                    workspace.branch_name(),
                    workspace.issue_number(),
                    self.config.issue_tracker_timeout(),
                )
            })
            .unwrap_or_else(|err| {
                tracing::debug!(error = %err, "issue lookup skipped");
                None
            })
    }
}
