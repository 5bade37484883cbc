use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use workgate::core::config::WorkgateConfig;
use workgate::core::error::WorkgateError;
use workgate::core::workspace::VersionControl;
use workgate::plugins::decide::{Action, DEFAULT_SESSION, Engine, Rule, Verdict};
use workgate::plugins::escalation::{SeverityTier, Topic};
use workgate::plugins::intent::{IntentCategory, IntentSource};
use workgate::plugins::issues::{IssueKind, IssueRef, IssueTracker, NoIssueTracker};

#[derive(Clone, Copy, PartialEq)]
enum StatusMode {
    Ok,
    NotARepo,
    TimedOut,
}

struct FakeVcs {
    branch: String,
    paths: Mutex<Vec<String>>,
    mode: StatusMode,
    delay: Duration,
    status_calls: AtomicUsize,
    /// Status queries that time out before the fake starts answering.
    slow_queries: AtomicUsize,
}

impl FakeVcs {
    fn new(branch: &str, paths: &[&str]) -> Self {
        Self {
            branch: branch.to_string(),
            paths: Mutex::new(paths.iter().map(|p| p.to_string()).collect()),
            mode: StatusMode::Ok,
            delay: Duration::ZERO,
            status_calls: AtomicUsize::new(0),
            slow_queries: AtomicUsize::new(0),
        }
    }

    fn slow_at_first(self, queries: usize) -> Self {
        self.slow_queries.store(queries, Ordering::SeqCst);
        self
    }

    fn with_mode(mut self, mode: StatusMode) -> Self {
        self.mode = mode;
        self
    }

    fn calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

impl VersionControl for FakeVcs {
    fn changed_paths(&self, cwd: &Path, timeout: Duration) -> Result<Vec<String>, WorkgateError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self
            .slow_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WorkgateError::VcsTimeout(timeout.as_millis() as u64));
        }
        match self.mode {
            StatusMode::Ok => Ok(self.paths.lock().unwrap().clone()),
            StatusMode::NotARepo => Err(WorkgateError::VcsUnavailable(cwd.display().to_string())),
            StatusMode::TimedOut => Err(WorkgateError::VcsTimeout(timeout.as_millis() as u64)),
        }
    }

    fn current_branch(&self, cwd: &Path, _timeout: Duration) -> Result<String, WorkgateError> {
        match self.mode {
            StatusMode::NotARepo => Err(WorkgateError::VcsUnavailable(cwd.display().to_string())),
            _ => Ok(self.branch.clone()),
        }
    }

    fn seconds_since_last_commit(
        &self,
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<Option<u64>, WorkgateError> {
        Ok(Some(120))
    }
}

struct FakeIssues {
    fail: bool,
}

impl IssueTracker for FakeIssues {
    fn find_for_branch(
        &self,
        _cwd: &Path,
        _branch: &str,
        number: Option<u64>,
        _timeout: Duration,
    ) -> Result<Option<IssueRef>, WorkgateError> {
        if self.fail {
            return Err(WorkgateError::IssueTrackerError("gh exploded".into()));
        }
        Ok(number.map(|n| IssueRef {
            kind: IssueKind::Issue,
            number: n,
            title: "Login flow".into(),
            state: "OPEN".into(),
            url: String::new(),
        }))
    }
}

fn config() -> WorkgateConfig {
    let mut config = WorkgateConfig::default();
    config.timeouts.analysis_ms = 5_000;
    config
}

fn engine_with(vcs: Arc<FakeVcs>) -> Engine {
    Engine::new(config(), vcs, Arc::new(NoIssueTracker)).unwrap()
}

fn dirty_engine() -> (Engine, Arc<FakeVcs>) {
    let vcs = Arc::new(FakeVcs::new("main", &["a.py", "b.py"]));
    (engine_with(Arc::clone(&vcs)), vcs)
}

const NEW_WORK: &str = "implement new dashboard feature";
const MAINTENANCE: &str = "fix the failing auth test";

#[test]
fn test_read_only_on_dirty_is_allowed() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::shell("cat file.txt").with_context(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.rule, Rule::ReadOnly);
    assert!(decision.cacheable);
    assert!(decision.message.is_none());

    let status = engine.evaluate(&Action::shell("git status").with_context(NEW_WORK), dir.path());
    assert_eq!(status.verdict, Verdict::Allow);
}

#[test]
fn test_new_work_on_dirty_blocks_and_lists_files() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Block);
    assert_eq!(decision.rule, Rule::NewWorkOnDirty);
    assert_eq!(decision.exit_code(), 2);
    assert_eq!(decision.attempt_count, Some(1));
    assert_eq!(decision.severity, Some(SeverityTier::Nudge));

    let message = decision.message.as_ref().unwrap();
    assert_eq!(message.changed_files, vec!["a.py", "b.py"]);
    assert!(message.override_hint.is_some());
    let rendered = decision.render(false).unwrap();
    assert!(rendered.contains("a.py"));
    assert!(rendered.contains("b.py"));
}

#[test]
fn test_maintenance_on_dirty_is_allowed_without_severity() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(MAINTENANCE), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.rule, Rule::Maintenance);
    assert_eq!(decision.severity, None);
    assert_eq!(decision.intent.category, IntentCategory::Maintenance);
}

#[test]
fn test_ambiguous_on_dirty_warns_and_never_blocks() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let mut last = None;
    for _ in 0..10 {
        let decision = engine.evaluate(&Action::message("tidy things up"), dir.path());
        assert_eq!(decision.verdict, Verdict::Warn);
        assert_eq!(decision.exit_code(), 0);
        last = decision.severity;
    }
    assert_eq!(last, Some(SeverityTier::Warning));
}

#[test]
fn test_branch_creation_during_maintenance_blocks() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let action = Action::shell("git checkout -b feature-y").with_context("fix the failing test");
    let first = engine.evaluate(&action, dir.path());
    assert_eq!(first.verdict, Verdict::Block);
    assert_eq!(first.rule, Rule::CreationOnDirty);

    let mut tier = first.severity;
    for _ in 0..8 {
        tier = engine.evaluate(&action, dir.path()).severity;
    }
    assert_eq!(tier, Some(SeverityTier::Warning));
}

#[test]
fn test_escalation_counts_once_per_evaluation() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let a = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    let b = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(a.verdict, b.verdict);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_ne!(a.id, b.id);
    assert_eq!(
        engine.attempt_count(DEFAULT_SESSION, "main", Topic::NewWorkOnDirty),
        2
    );
}

#[test]
fn test_escalation_tiers_rise_then_reset_after_allow() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let tiers: Vec<_> = (0..6)
        .map(|_| engine.evaluate(&Action::message(NEW_WORK), dir.path()).severity.unwrap())
        .collect();
    assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(tiers[0], SeverityTier::Nudge);
    assert_eq!(tiers[5], SeverityTier::Block);

    let allowed = engine.evaluate(&Action::message(MAINTENANCE), dir.path());
    assert_eq!(allowed.verdict, Verdict::Allow);
    assert_eq!(
        engine.attempt_count(DEFAULT_SESSION, "main", Topic::NewWorkOnDirty),
        0
    );
    let again = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(again.attempt_count, Some(1));
}

#[test]
fn test_read_only_allow_also_resets_escalation() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    engine.evaluate(&Action::message(NEW_WORK), dir.path());
    engine.evaluate(&Action::message(NEW_WORK), dir.path());
    let read = engine.evaluate(&Action::shell("ls"), dir.path());
    assert_eq!(read.verdict, Verdict::Allow);
    assert_eq!(
        engine.attempt_count(DEFAULT_SESSION, "main", Topic::NewWorkOnDirty),
        0
    );
}

#[test]
fn test_sessions_are_isolated_and_can_end() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    engine.evaluate(&Action::message(NEW_WORK).with_session("a"), dir.path());
    engine.evaluate(&Action::message(NEW_WORK).with_session("a"), dir.path());
    let other = engine.evaluate(&Action::message(NEW_WORK).with_session("b"), dir.path());
    assert_eq!(other.attempt_count, Some(1));

    assert!(engine.end_session("a"));
    assert!(!engine.end_session("a"));
    assert_eq!(engine.attempt_count("a", "main", Topic::NewWorkOnDirty), 0);
}

#[test]
fn test_override_forces_maintenance() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let action = Action::file_edit("src/app.py")
        .with_context(NEW_WORK)
        .with_override(IntentCategory::Maintenance);
    let decision = engine.evaluate(&action, dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.intent.source, IntentSource::Override);
}

#[test]
fn test_maintenance_override_allows_branch_creation_on_dirty() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let action = Action::shell("git checkout -b fix-login").with_override(IntentCategory::Maintenance);
    for _ in 0..6 {
        let decision = engine.evaluate(&action, dir.path());
        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.rule, Rule::Maintenance);
        assert!(decision.message.is_none());
    }
    assert_eq!(
        engine.attempt_count(DEFAULT_SESSION, "main", Topic::CreationOnDirty),
        0
    );
}

#[test]
fn test_message_override_carries_to_later_tool_actions() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let prompt = engine.evaluate(
        &Action::message(NEW_WORK).with_override(IntentCategory::Maintenance),
        dir.path(),
    );
    assert_eq!(prompt.verdict, Verdict::Allow);

    let branch = engine.evaluate(&Action::shell("git checkout -b dashboard-fix"), dir.path());
    assert_eq!(branch.verdict, Verdict::Allow);
    assert_eq!(branch.intent.source, IntentSource::Override);
}

#[test]
fn test_overrides_ignored_when_disabled() {
    let mut config = config();
    config.enforcement.allow_override = false;
    let engine = Engine::new(
        config,
        Arc::new(FakeVcs::new("main", &["a.py"])),
        Arc::new(NoIssueTracker),
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let action = Action::file_edit("src/app.py")
        .with_context(NEW_WORK)
        .with_override(IntentCategory::Maintenance);
    let decision = engine.evaluate(&action, dir.path());
    assert_eq!(decision.verdict, Verdict::Block);
    assert_eq!(decision.intent.source, IntentSource::Message);
    assert!(decision.message.unwrap().override_hint.is_none());
}

#[test]
fn test_tool_action_inherits_remembered_intent() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    engine.evaluate(&Action::message(NEW_WORK), dir.path());
    let decision = engine.evaluate(&Action::file_edit("src/app.py"), dir.path());
    assert_eq!(decision.verdict, Verdict::Block);
    assert_eq!(decision.intent.source, IntentSource::Remembered);
}

#[test]
fn test_remediation_and_docs_are_allowed_during_new_work() {
    let (engine, _) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    let commit = engine.evaluate(&Action::shell("git commit -m wip").with_context(NEW_WORK), dir.path());
    assert_eq!(commit.verdict, Verdict::Allow);
    assert_eq!(commit.rule, Rule::Remediation);

    let docs = engine.evaluate(&Action::file_edit("README.md").with_context(NEW_WORK), dir.path());
    assert_eq!(docs.verdict, Verdict::Allow);
    assert_eq!(docs.rule, Rule::DocsOnly);
}

#[test]
fn test_clean_workspace_allows_new_work() {
    let vcs = Arc::new(FakeVcs::new("main", &[]));
    let engine = engine_with(vcs);
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.rule, Rule::Default);
}

#[test]
fn test_outside_repository_allows() {
    let vcs = Arc::new(FakeVcs::new("main", &["a.py"]).with_mode(StatusMode::NotARepo));
    let engine = engine_with(vcs);
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.rule, Rule::VcsUnavailable);
    assert!(decision.cacheable);
}

#[test]
fn test_status_timeout_degrades_to_allow() {
    let vcs = Arc::new(FakeVcs::new("main", &["a.py"]).with_mode(StatusMode::TimedOut));
    let engine = engine_with(vcs);
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.degraded.as_deref(), Some("vcs_timeout"));
}

#[test]
fn test_slow_status_is_retried_on_next_evaluation() {
    let vcs = Arc::new(FakeVcs::new("main", &["a.py"]).slow_at_first(1));
    let engine = engine_with(Arc::clone(&vcs));
    let dir = tempfile::tempdir().unwrap();

    let first = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(first.verdict, Verdict::Allow);
    assert_eq!(first.degraded.as_deref(), Some("vcs_timeout"));

    let second = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(second.verdict, Verdict::Block);
    assert_eq!(second.degraded, None);
    assert_eq!(vcs.calls(), 2);

    engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(vcs.calls(), 2);
}

#[test]
fn test_enforcement_disabled_allows_everything() {
    let mut config = config();
    config.enforcement.enabled = false;
    let vcs = Arc::new(FakeVcs::new("main", &["a.py"]));
    let engine = Engine::new(config, vcs.clone(), Arc::new(NoIssueTracker)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.rule, Rule::EnforcementDisabled);
    assert_eq!(vcs.calls(), 0);
}

#[test]
fn test_workspace_is_cached_until_a_write_is_observed() {
    let (engine, vcs) = dirty_engine();
    let dir = tempfile::tempdir().unwrap();
    for _ in 0..3 {
        engine.evaluate(&Action::message(NEW_WORK), dir.path());
    }
    assert_eq!(vcs.calls(), 1);

    engine.observe(&Action::shell("ls"), dir.path());
    engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(vcs.calls(), 1);

    *vcs.paths.lock().unwrap() = Vec::new();
    engine.observe(&Action::shell("git commit -am done"), dir.path());
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(vcs.calls(), 2);
    assert_eq!(decision.verdict, Verdict::Allow);
}

#[test]
fn test_concurrent_evaluations_share_one_status_query() {
    let mut fake = FakeVcs::new("main", &["a.py"]);
    fake.delay = Duration::from_millis(30);
    let vcs = Arc::new(fake);
    let engine = Arc::new(engine_with(Arc::clone(&vcs)));
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let cwd = cwd.clone();
            thread::spawn(move || engine.evaluate(&Action::message(NEW_WORK), &cwd).verdict)
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Verdict::Block);
    }
    assert_eq!(vcs.calls(), 1);
    assert_eq!(
        engine.attempt_count(DEFAULT_SESSION, "main", Topic::NewWorkOnDirty),
        8
    );
}

#[test]
fn test_issue_reference_enriches_message() {
    let vcs = Arc::new(FakeVcs::new("feature-login-#42", &["a.py"]));
    let engine = Engine::new(config(), vcs, Arc::new(FakeIssues { fail: false })).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    let message = decision.message.unwrap();
    assert_eq!(message.issue.as_deref(), Some("issue #42 (open): Login flow"));
}

#[test]
fn test_issue_tracker_failure_only_drops_enrichment() {
    let vcs = Arc::new(FakeVcs::new("feature-login-#42", &["a.py"]));
    let engine = Engine::new(config(), vcs, Arc::new(FakeIssues { fail: true })).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let decision = engine.evaluate(&Action::message(NEW_WORK), dir.path());
    assert_eq!(decision.verdict, Verdict::Block);
    assert!(decision.message.unwrap().issue.is_none());
}
