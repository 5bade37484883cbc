//! Issue-tracker lookups used to enrich messages.
//!
//! Lookups never gate a decision: every failure is reported as an error the
//! engine logs and ignores.

use crate::core::error::WorkgateError;
use crate::core::process::{RunError, run_with_timeout};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Issue,
    PullRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub kind: IssueKind,
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl IssueRef {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }

    pub fn label(&self) -> String {
        let kind = match self.kind {
            IssueKind::Issue => "issue",
            IssueKind::PullRequest => "PR",
        };
        format!("{} #{} ({}): {}", kind, self.number, self.state.to_lowercase(), self.title)
    }
}

pub trait IssueTracker: Send + Sync {
    /// Issue `number` if given, else an open pull request whose head is `branch`.
    fn find_for_branch(
        &self,
        cwd: &Path,
        branch: &str,
        number: Option<u64>,
        timeout: Duration,
    ) -> Result<Option<IssueRef>, WorkgateError>;
}

/// Tracker that knows nothing. Used when lookups are disabled.
#[derive(Debug, Clone, Default)]
pub struct NoIssueTracker;

impl IssueTracker for NoIssueTracker {
    fn find_for_branch(
        &self,
        _cwd: &Path,
        _branch: &str,
        _number: Option<u64>,
        _timeout: Duration,
    ) -> Result<Option<IssueRef>, WorkgateError> {
        Ok(None)
    }
}

/// GitHub via the `gh` CLI.
#[derive(Debug, Clone)]
pub struct GhIssueTracker {
    program: String,
}

impl GhIssueTracker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn gh(&self, cwd: &Path, args: &[&str], timeout: Duration) -> Result<Option<String>, WorkgateError> {
        let out = run_with_timeout(&self.program, args, cwd, timeout).map_err(|e| match e {
            RunError::Spawn(err) => {
                WorkgateError::IssueTrackerError(format!("{} not runnable: {}", self.program, err))
            }
            RunError::TimedOut(d) => {
                WorkgateError::IssueTrackerError(format!("lookup timed out after {}ms", d.as_millis()))
            }
        })?;
        if out.success() {
            return Ok(Some(out.stdout));
        }
        let stderr = out.stderr.to_lowercase();
        if stderr.contains("could not resolve") || stderr.contains("not found") {
            return Ok(None);
        }
        Err(WorkgateError::IssueTrackerError(format!(
            "{} {} failed: {}",
            self.program,
            args.join(" "),
            out.stderr.trim()
        )))
    }
}

impl Default for GhIssueTracker {
    fn default() -> Self {
        Self::new("gh")
    }
}

#[derive(Deserialize)]
struct GhItem {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    url: String,
}

impl GhItem {
    fn into_ref(self, kind: IssueKind) -> IssueRef {
        IssueRef {
            kind,
            number: self.number,
            title: self.title,
            state: self.state,
            url: self.url,
        }
    }
}

const GH_FIELDS: &str = "number,title,state,url";

impl IssueTracker for GhIssueTracker {
    fn find_for_branch(
        &self,
        cwd: &Path,
        branch: &str,
        number: Option<u64>,
        timeout: Duration,
    ) -> Result<Option<IssueRef>, WorkgateError> {
        if let Some(number) = number {
            let n = number.to_string();
            let Some(stdout) = self.gh(cwd, &["issue", "view", &n, "--json", GH_FIELDS], timeout)? else {
                return Ok(None);
            };
            return parse_issue(&stdout).map(Some);
        }
        let Some(stdout) = self.gh(
            cwd,
            &["pr", "list", "--head", branch, "--state", "open", "--limit", "1", "--json", GH_FIELDS],
            timeout,
        )?
        else {
            return Ok(None);
        };
        parse_pr_list(&stdout)
    }
}

pub fn parse_issue(json: &str) -> Result<IssueRef, WorkgateError> {
    let item: GhItem = serde_json::from_str(json)?;
    Ok(item.into_ref(IssueKind::Issue))
}

pub fn parse_pr_list(json: &str) -> Result<Option<IssueRef>, WorkgateError> {
    let items: Vec<GhItem> = serde_json::from_str(json)?;
    Ok(items
        .into_iter()
        .next()
        .map(|item| item.into_ref(IssueKind::PullRequest)))
}
