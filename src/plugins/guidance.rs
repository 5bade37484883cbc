//! Decision messages.
//!
//! Builds the structured message attached to WARN and BLOCK decisions and
//! renders it as plain or colored text for the host.

use crate::core::output::{bullet_list, compact_line};
use crate::core::workspace::WorkspaceState;
use crate::plugins::classify::CreationKind;
use crate::plugins::escalation::SeverityTier;
use crate::plugins::intent::IntentResult;
use crate::plugins::issues::IssueRef;
use colored::Colorize;
use serde::{Deserialize, Serialize};

const MAX_LISTED_FILES: usize = 10;

pub const OVERRIDE_HINT: &str = "If this is maintenance work, add --force-maintenance to the request or rerun with WORKGATE_WORK_TYPE=maintenance (serve: \"override\": \"maintenance\").";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub headline: String,
    pub situation: String,
    pub action_required: Vec<String>,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpretations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_hint: Option<String>,
}

/// Steps that get a dirty workspace back to clean, plus an issue step.
fn cleanup_steps(workspace: &WorkspaceState, issue: Option<&IssueRef>) -> Vec<String> {
    let mut steps = vec![
        "Review the changes: git diff".to_string(),
        "Commit them: git add -A && git commit -m \"<summary> (#<issue>)\"".to_string(),
        "Or set them aside: git stash push -u".to_string(),
    ];
    match issue {
        Some(issue) if issue.is_open() => {
            steps.push(format!("Finish or merge {} before starting something new", issue.label()))
        }
        Some(issue) => steps.push(format!("{} is closed; start the next task from main", issue.label())),
        None if workspace.has_open_issue_ref() => {}
        None => steps.push(
            "Reference an issue for the next task (branch name like feature-name-#123)".to_string(),
        ),
    }
    steps
}

fn attempt_note(tier: SeverityTier, attempts: u32) -> Option<String> {
    match tier {
        SeverityTier::Nudge => None,
        _ => Some(format!("Attempt {} on this branch.", attempts)),
    }
}

fn with_note(situation: String, note: Option<String>) -> String {
    match note {
        Some(note) => format!("{} {}", situation, note),
        None => situation,
    }
}

pub fn new_work_on_dirty(
    workspace: &WorkspaceState,
    intent: &IntentResult,
    tier: SeverityTier,
    attempts: u32,
    issue: Option<&IssueRef>,
) -> DecisionMessage {
    let changed = workspace.changed_file_paths().to_vec();
    DecisionMessage {
        headline: "New work blocked: workspace has uncommitted changes".to_string(),
        situation: with_note(
            format!(
                "Branch '{}' has {} uncommitted change(s) and the request reads as new work (confidence {:.2}).",
                workspace.branch_name(),
                changed.len(),
                intent.confidence
            ),
            attempt_note(tier, attempts),
        ),
        action_required: cleanup_steps(workspace, issue),
        rationale: "New work on top of unrelated changes mixes histories and makes both harder to review."
            .to_string(),
        changed_files: changed,
        interpretations: Vec::new(),
        issue: issue.map(IssueRef::label),
        // The block path always names its way out.
        override_hint: Some(OVERRIDE_HINT.to_string()),
    }
}

pub fn creation_on_dirty(
    workspace: &WorkspaceState,
    creation: CreationKind,
    tier: SeverityTier,
    attempts: u32,
    issue: Option<&IssueRef>,
) -> DecisionMessage {
    let changed = workspace.changed_file_paths().to_vec();
    DecisionMessage {
        headline: format!("Creating a new {} requires a clean workspace", creation.as_str()),
        situation: with_note(
            format!(
                "Branch '{}' has {} uncommitted change(s).",
                workspace.branch_name(),
                changed.len()
            ),
            attempt_note(tier, attempts),
        ),
        action_required: cleanup_steps(workspace, issue),
        rationale: format!(
            "A new {} starts a new unit of work; carrying uncommitted changes into it hides where they belong.",
            creation.as_str()
        ),
        changed_files: changed,
        interpretations: Vec::new(),
        issue: issue.map(IssueRef::label),
        override_hint: tier.shows_override_hint().then(|| OVERRIDE_HINT.to_string()),
    }
}

pub fn ambiguous_on_dirty(
    workspace: &WorkspaceState,
    intent: &IntentResult,
    tier: SeverityTier,
    attempts: u32,
    issue: Option<&IssueRef>,
) -> DecisionMessage {
    let changed = workspace.changed_file_paths().to_vec();
    let matched = if intent.matched_patterns.is_empty() {
        "no known patterns".to_string()
    } else {
        intent.matched_patterns.join(", ")
    };
    DecisionMessage {
        headline: "Proceeding with uncommitted changes: intent unclear".to_string(),
        situation: with_note(
            format!(
                "Branch '{}' has {} uncommitted change(s); the request matched {}.",
                workspace.branch_name(),
                changed.len(),
                matched
            ),
            attempt_note(tier, attempts),
        ),
        action_required: vec![
            "If this continues the current change, carry on and commit when done".to_string(),
            "If this is new work, commit or stash first: git stash push -u".to_string(),
        ],
        rationale: "Maintenance may proceed on a dirty workspace; new work should start clean."
            .to_string(),
        changed_files: changed,
        interpretations: vec![
            "Maintenance: fixing or finishing the current change".to_string(),
            "New work: starting something unrelated to the current change".to_string(),
        ],
        issue: issue.map(IssueRef::label),
        override_hint: tier.shows_override_hint().then(|| OVERRIDE_HINT.to_string()),
    }
}

impl DecisionMessage {
    pub fn render(&self, color: bool) -> String {
        let paint = |text: &str, f: fn(&str) -> colored::ColoredString| {
            if color { f(text).to_string() } else { text.to_string() }
        };
        let mut out = vec![
            paint(&self.headline, |s| s.bright_yellow().bold()),
            String::new(),
            compact_line(&self.situation, 400),
        ];
        if !self.changed_files.is_empty() {
            out.push(String::new());
            out.push(paint("Changed files:", |s| s.bold()));
            out.push(bullet_list(&self.changed_files, MAX_LISTED_FILES));
        }
        if !self.interpretations.is_empty() {
            out.push(String::new());
            out.push(paint("Possible readings:", |s| s.bold()));
            out.push(bullet_list(&self.interpretations, self.interpretations.len()));
        }
        if let Some(issue) = &self.issue {
            out.push(String::new());
            out.push(format!("Tracking: {}", issue));
        }
        out.push(String::new());
        out.push(paint("Next steps:", |s| s.bright_cyan().bold()));
        for (i, step) in self.action_required.iter().enumerate() {
            out.push(format!("  {}. {}", i + 1, step));
        }
        out.push(String::new());
        out.push(format!("Why: {}", self.rationale));
        if let Some(hint) = &self.override_hint {
            out.push(paint(hint, |s| s.dimmed()));
        }
        out.join("\n")
    }
}
