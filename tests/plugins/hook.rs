use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use workgate::core::config::WorkgateConfig;
use workgate::core::error::WorkgateError;
use workgate::core::workspace::VersionControl;
use workgate::plugins::decide::Engine;
use workgate::plugins::escalation::Topic;
use workgate::plugins::hook::{HookEnv, run_hook};
use workgate::plugins::intent::IntentCategory;
use workgate::plugins::issues::NoIssueTracker;

struct DirtyRepo;

impl VersionControl for DirtyRepo {
    fn changed_paths(&self, _cwd: &Path, _timeout: Duration) -> Result<Vec<String>, WorkgateError> {
        Ok(vec!["src/app.py".to_string()])
    }

    fn current_branch(&self, _cwd: &Path, _timeout: Duration) -> Result<String, WorkgateError> {
        Ok("main".to_string())
    }

    fn seconds_since_last_commit(
        &self,
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<Option<u64>, WorkgateError> {
        Ok(None)
    }
}

fn engine() -> Engine {
    let mut config = WorkgateConfig::default();
    config.timeouts.analysis_ms = 5_000;
    Engine::new(config, Arc::new(DirtyRepo), Arc::new(NoIssueTracker)).unwrap()
}

fn pre_tool(tool: &str, input: serde_json::Value, session: &str) -> String {
    serde_json::json!({
        "hook_event_name": "PreToolUse",
        "tool_name": tool,
        "tool_input": input,
        "session_id": session,
    })
    .to_string()
}

#[test]
fn test_garbage_payload_allows() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_hook(&engine(), "not json {", &HookEnv::default(), dir.path());
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stdout.is_none());
    assert!(outcome.stderr.is_none());
}

#[test]
fn test_read_only_command_passes_silently() {
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: None,
    };
    let raw = pre_tool("Bash", serde_json::json!({"command": "ls -la"}), "s1");
    let outcome = run_hook(&engine(), &raw, &env, dir.path());
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stderr.is_none());
}

#[test]
fn test_new_work_edit_blocks_with_exit_2() {
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: None,
    };
    let raw = pre_tool("Edit", serde_json::json!({"file_path": "src/dashboard.py"}), "s1");
    let outcome = run_hook(&engine(), &raw, &env, dir.path());
    assert_eq!(outcome.exit_code, 2);
    let stderr = outcome.stderr.unwrap();
    assert!(stderr.contains("src/app.py"));
    assert!(stderr.contains("WORKGATE_WORK_TYPE"));
}

#[test]
fn test_work_type_override_allows() {
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: Some(IntentCategory::Maintenance),
    };
    let raw = pre_tool("Edit", serde_json::json!({"file_path": "src/dashboard.py"}), "s1");
    assert_eq!(run_hook(&engine(), &raw, &env, dir.path()).exit_code, 0);
}

#[test]
fn test_prompt_is_never_blocked_but_gets_context() {
    let dir = tempfile::tempdir().unwrap();
    let raw = serde_json::json!({
        "hook_event_name": "UserPromptSubmit",
        "prompt": "implement new dashboard feature",
    })
    .to_string();
    let outcome = run_hook(&engine(), &raw, &HookEnv::default(), dir.path());
    assert_eq!(outcome.exit_code, 0);
    let payload: serde_json::Value = serde_json::from_str(&outcome.stdout.unwrap()).unwrap();
    assert_eq!(payload["decision"], "allow");
    assert_eq!(payload["hookSpecificOutput"]["hookEventName"], "UserPromptSubmit");
    assert!(
        payload["hookSpecificOutput"]["additionalContext"]
            .as_str()
            .unwrap()
            .contains("src/app.py")
    );
}

#[test]
fn test_stop_event_ends_session() {
    let engine = engine();
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: None,
    };
    let raw = pre_tool("Write", serde_json::json!({"file_path": "src/new.py"}), "s9");
    run_hook(&engine, &raw, &env, dir.path());
    assert_eq!(engine.attempt_count("s9", "main", Topic::NewWorkOnDirty), 1);

    let stop = serde_json::json!({"hook_event_name": "Stop", "session_id": "s9"}).to_string();
    let outcome = run_hook(&engine, &stop, &env, dir.path());
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(engine.attempt_count("s9", "main", Topic::NewWorkOnDirty), 0);
}

#[test]
fn test_unknown_tools_and_events_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: None,
    };
    let mcp = pre_tool("mcp__github__create_issue", serde_json::json!({}), "s1");
    assert_eq!(run_hook(&engine(), &mcp, &env, dir.path()).exit_code, 0);
    let event = serde_json::json!({"hook_event_name": "Notification"}).to_string();
    assert_eq!(run_hook(&engine(), &event, &env, dir.path()).exit_code, 0);
}

#[test]
fn test_tool_description_supplies_intent() {
    let dir = tempfile::tempdir().unwrap();
    let new_work = pre_tool(
        "Bash",
        serde_json::json!({"command": "touch src/widget.py", "description": "Implement new dashboard feature"}),
        "s1",
    );
    assert_eq!(run_hook(&engine(), &new_work, &HookEnv::default(), dir.path()).exit_code, 2);

    let fix = pre_tool(
        "Bash",
        serde_json::json!({"command": "touch src/widget.py", "description": "Fix the failing widget test"}),
        "s1",
    );
    assert_eq!(run_hook(&engine(), &fix, &HookEnv::default(), dir.path()).exit_code, 0);
}

#[test]
fn test_force_maintenance_flag_in_prompt_allows_branch_creation() {
    let dir = tempfile::tempdir().unwrap();
    let raw = pre_tool("Bash", serde_json::json!({"command": "git checkout -b hotfix-login"}), "s1");
    let plain = HookEnv {
        prompt: Some("implement new dashboard feature".into()),
        work_type: None,
    };
    assert_eq!(run_hook(&engine(), &raw, &plain, dir.path()).exit_code, 2);

    let flagged = HookEnv {
        prompt: Some("implement new dashboard feature --force-maintenance".into()),
        work_type: None,
    };
    let outcome = run_hook(&engine(), &raw, &flagged, dir.path());
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stderr.is_none());
}

#[test]
fn test_flags_ignored_when_overrides_are_disabled() {
    let mut config = WorkgateConfig::default();
    config.timeouts.analysis_ms = 5_000;
    config.enforcement.allow_override = false;
    let engine = Engine::new(config, Arc::new(DirtyRepo), Arc::new(NoIssueTracker)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let env = HookEnv {
        prompt: Some("implement new dashboard feature --force-maintenance".into()),
        work_type: None,
    };
    let raw = pre_tool("Edit", serde_json::json!({"file_path": "src/dashboard.py"}), "s1");
    let outcome = run_hook(&engine, &raw, &env, dir.path());
    assert_eq!(outcome.exit_code, 2);
    assert!(!outcome.stderr.unwrap().contains("--force-maintenance"));
}
