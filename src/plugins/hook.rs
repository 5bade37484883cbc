//! Agent-host hook adapter.
//!
//! Hosts pipe one JSON payload per lifecycle event into `workgate hook`.
//! Exit code 0 lets the action run, 2 blocks it with the message on stderr.
//! Anything the adapter cannot understand fails open.

use crate::core::error::WorkgateError;
use crate::plugins::decide::{Action, ActionKind, Decision, Engine, Verdict};
use crate::plugins::intent::IntentCategory;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Tools that only look at things.
pub const INVESTIGATION_TOOLS: &[&str] = &[
    "Read", "Grep", "Glob", "LS", "WebFetch", "WebSearch", "TodoWrite", "TodoRead",
    "NotebookRead", "Task", "BashOutput", "KillShell", "KillBash", "ExitPlanMode",
];

/// Tools whose input names a file they write.
pub const EDIT_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub notebook_path: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub hook_event_name: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: ToolInput,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Settings the host passes through the environment.
#[derive(Debug, Clone, Default)]
pub struct HookEnv {
    /// `WORKGATE_PROMPT`: the user message behind tool calls.
    pub prompt: Option<String>,
    /// `WORKGATE_WORK_TYPE`: explicit work-type override.
    pub work_type: Option<IntentCategory>,
}

impl HookEnv {
    pub fn from_env() -> Self {
        let prompt = std::env::var("WORKGATE_PROMPT")
            .ok()
            .filter(|p| !p.trim().is_empty());
        let work_type = std::env::var("WORKGATE_WORK_TYPE").ok().and_then(|raw| {
            let parsed = IntentCategory::parse_override(&raw);
            if parsed.is_none() {
                tracing::warn!(value = %raw, "ignoring unknown WORKGATE_WORK_TYPE");
            }
            parsed
        });
        Self { prompt, work_type }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookAction {
    Evaluate(Action),
    Observe(Action),
    EndSession(String),
    Skip(String),
}

impl HookInput {
    pub fn parse(raw: &str) -> Result<Self, WorkgateError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn tool_action(&self) -> Option<Action> {
        let name = self.tool_name.as_str();
        if name == "Bash" {
            return self.tool_input.command.as_ref().map(Action::shell);
        }
        if EDIT_TOOLS.contains(&name) {
            return self
                .tool_input
                .file_path
                .as_ref()
                .or(self.tool_input.notebook_path.as_ref())
                .or(self.tool_input.path.as_ref())
                .map(Action::file_edit);
        }
        None
    }

    /// Map the payload to what the engine should do with it.
    pub fn to_action(&self, env: &HookEnv) -> HookAction {
        let event = if self.hook_event_name.is_empty() && !self.tool_name.is_empty() {
            "PreToolUse"
        } else {
            self.hook_event_name.as_str()
        };

        let finish = |mut action: Action| {
            if action.kind != ActionKind::UserMessage {
                action.context = self
                    .user_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .or_else(|| env.prompt.clone())
                    .or_else(|| {
                        self.tool_input
                            .description
                            .clone()
                            .filter(|d| !d.trim().is_empty())
                    });
            }
            // A flag in the request beats the process-wide work type.
            let flagged = match action.kind {
                ActionKind::UserMessage => IntentCategory::from_flags(&action.text),
                _ => action.context.as_deref().and_then(IntentCategory::from_flags),
            };
            action.override_intent = flagged.or(env.work_type);
            action.session_id = self.session_id.clone();
            action
        };

        match event {
            "UserPromptSubmit" => match self.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                Some(prompt) => HookAction::Evaluate(finish(Action::message(prompt))),
                None => HookAction::Skip("empty prompt".to_string()),
            },
            "PreToolUse" | "PostToolUse" => {
                if INVESTIGATION_TOOLS.contains(&self.tool_name.as_str())
                    || self.tool_name.starts_with("mcp__")
                {
                    return HookAction::Skip(format!("investigation tool {}", self.tool_name));
                }
                match self.tool_action() {
                    Some(action) if event == "PreToolUse" => HookAction::Evaluate(finish(action)),
                    Some(action) => HookAction::Observe(finish(action)),
                    None => HookAction::Skip(format!("unhandled tool {}", self.tool_name)),
                }
            }
            "Stop" | "SessionEnd" => HookAction::EndSession(
                self.session_id
                    .clone()
                    .unwrap_or_else(|| crate::plugins::decide::DEFAULT_SESSION.to_string()),
            ),
            other => HookAction::Skip(format!("event {}", other)),
        }
    }
}

/// What the hook process should emit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HookOutcome {
    pub exit_code: u8,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl HookOutcome {
    fn allow() -> Self {
        Self::default()
    }
}

fn outcome_for(decision: &Decision, kind: ActionKind) -> HookOutcome {
    let Some(text) = decision.render(false) else {
        return HookOutcome::allow();
    };
    // Prompts are never blocked; the guidance is handed to the agent as context.
    if kind == ActionKind::UserMessage {
        let payload = json!({
            "decision": "allow",
            "hookSpecificOutput": {
                "hookEventName": "UserPromptSubmit",
                "additionalContext": text,
            }
        });
        return HookOutcome {
            exit_code: 0,
            stdout: Some(payload.to_string()),
            stderr: None,
        };
    }
    match decision.verdict {
        Verdict::Block => HookOutcome {
            exit_code: 2,
            stdout: None,
            stderr: Some(text),
        },
        Verdict::Warn | Verdict::Allow => HookOutcome {
            exit_code: 0,
            stdout: None,
            stderr: Some(text),
        },
    }
}

/// Run one hook invocation against `engine`.
pub fn run_hook(engine: &Engine, raw: &str, env: &HookEnv, default_cwd: &Path) -> HookOutcome {
    let input = match HookInput::parse(raw) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable hook payload, allowing");
            return HookOutcome::allow();
        }
    };
    let cwd = input
        .cwd
        .clone()
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| default_cwd.to_path_buf());

    match input.to_action(env) {
        HookAction::Evaluate(action) => {
            let decision = engine.evaluate(&action, &cwd);
            outcome_for(&decision, action.kind)
        }
        HookAction::Observe(action) => {
            engine.observe(&action, &cwd);
            HookOutcome::allow()
        }
        HookAction::EndSession(session) => {
            engine.end_session(&session);
            HookOutcome::allow()
        }
        HookAction::Skip(reason) => {
            tracing::debug!(reason = %reason, "hook skipped");
            HookOutcome::allow()
        }
    }
}
