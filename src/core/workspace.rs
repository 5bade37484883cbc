//! Workspace state reader.
//!
//! Snapshots the version-control state of a working directory:
//! - changed paths (`git status --porcelain -z`)
//! - current branch and any issue number encoded in it
//! - seconds since the last commit
//!
//! Every query runs under a hard timeout. A status query that times out
//! produces a degraded snapshot whose dirtiness is unknown instead of an
//! error, so callers can always fall back to a permissive decision.

use crate::core::error::WorkgateError;
use crate::core::process::{RunError, run_with_timeout};
use crate::core::time::unix_now;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::Serialize;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Snapshot of a working directory's version-control state.
///
/// Invariant: when dirtiness is known, `is_dirty() == Some(!changed_file_paths.is_empty())`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceState {
    is_dirty: Option<bool>,
    branch_name: String,
    seconds_since_last_commit: Option<u64>,
    has_open_issue_ref: bool,
    issue_number: Option<u64>,
    changed_file_paths: Vec<String>,
    degraded: bool,
}

impl WorkspaceState {
    pub fn new(
        branch_name: impl Into<String>,
        changed_file_paths: Vec<String>,
        seconds_since_last_commit: Option<u64>,
    ) -> Self {
        let branch_name = branch_name.into();
        let issue_number = parse_issue_number(&branch_name);
        Self {
            is_dirty: Some(!changed_file_paths.is_empty()),
            has_open_issue_ref: issue_number.is_some(),
            issue_number,
            branch_name,
            seconds_since_last_commit,
            changed_file_paths,
            degraded: false,
        }
    }

    /// Snapshot whose status query failed or timed out.
    pub fn degraded(branch_name: impl Into<String>, seconds_since_last_commit: Option<u64>) -> Self {
        let branch_name = branch_name.into();
        let issue_number = parse_issue_number(&branch_name);
        Self {
            is_dirty: None,
            has_open_issue_ref: issue_number.is_some(),
            issue_number,
            branch_name,
            seconds_since_last_commit,
            changed_file_paths: Vec::new(),
            degraded: true,
        }
    }

    pub fn is_dirty(&self) -> Option<bool> {
        self.is_dirty
    }

    /// Dirty for enforcement purposes. Unknown dirtiness counts as clean.
    pub fn is_known_dirty(&self) -> bool {
        self.is_dirty == Some(true)
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn seconds_since_last_commit(&self) -> Option<u64> {
        self.seconds_since_last_commit
    }

    pub fn has_open_issue_ref(&self) -> bool {
        self.has_open_issue_ref
    }

    pub fn issue_number(&self) -> Option<u64> {
        self.issue_number
    }

    pub fn changed_file_paths(&self) -> &[String] {
        &self.changed_file_paths
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Read-only version-control collaborator.
pub trait VersionControl: Send + Sync {
    /// Changed paths in porcelain order. Fails with `VcsUnavailable` outside a repository.
    fn changed_paths(&self, cwd: &Path, timeout: Duration) -> Result<Vec<String>, WorkgateError>;

    fn current_branch(&self, cwd: &Path, timeout: Duration) -> Result<String, WorkgateError>;

    fn seconds_since_last_commit(
        &self,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Option<u64>, WorkgateError>;

    /// Cheap token that changes on commit, staging, branch switch or a
    /// working-tree edit. `None` when it cannot be taken.
    fn fingerprint(&self, _cwd: &Path, _timeout: Duration) -> Option<String> {
        None
    }
}

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Default)]
pub struct GitCli {
    /// Paths whose metadata make up the working-tree part of the fingerprint,
    /// per repository root.
    watched: Mutex<FxHashMap<PathBuf, WatchList>>,
}

#[derive(Debug, Clone)]
struct WatchList {
    /// Index mtime the tracked files were listed at.
    index_stamp: u128,
    /// Tracked files, their directories and the root.
    paths: Arc<Vec<PathBuf>>,
}

impl GitCli {
    fn git(&self, cwd: &Path, args: &[&str], timeout: Duration) -> Result<String, WorkgateError> {
        let out = run_with_timeout("git", args, cwd, timeout).map_err(|e| match e {
            RunError::Spawn(err) => {
                WorkgateError::VcsUnavailable(format!("{}: git not runnable: {}", cwd.display(), err))
            }
            timed_out => timed_out.into(),
        })?;
        if out.success() {
            return Ok(out.stdout);
        }
        if out.stderr.contains("not a git repository") {
            return Err(WorkgateError::VcsUnavailable(cwd.display().to_string()));
        }
        Err(WorkgateError::ValidationError(format!(
            "git {} failed: {}",
            args.join(" "),
            out.stderr.trim()
        )))
    }

    /// Tracked files under `root`, relisted whenever the index moves.
    fn watch_list(&self, root: &Path, index_stamp: u128, timeout: Duration) -> Option<Arc<Vec<PathBuf>>> {
        let mut watched = self
            .watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(list) = watched.get(root)
            && list.index_stamp == index_stamp
        {
            return Some(Arc::clone(&list.paths));
        }

        let listing = match self.git(root, &["ls-files", "-z"], timeout) {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, root = %root.display(), "tracked-file listing failed");
                return None;
            }
        };
        let mut dirs = FxHashSet::default();
        let mut paths = vec![root.to_path_buf()];
        for rel in listing.split('\0').filter(|p| !p.is_empty()) {
            let file = root.join(rel);
            // New untracked files show up as a directory mtime change.
            let mut parent = file.parent();
            while let Some(dir) = parent {
                if dir == root || !dirs.insert(dir.to_path_buf()) {
                    break;
                }
                paths.push(dir.to_path_buf());
                parent = dir.parent();
            }
            paths.push(file);
        }
        let paths = Arc::new(paths);
        watched.insert(
            root.to_path_buf(),
            WatchList {
                index_stamp,
                paths: Arc::clone(&paths),
            },
        );
        Some(paths)
    }
}

impl VersionControl for GitCli {
    fn changed_paths(&self, cwd: &Path, timeout: Duration) -> Result<Vec<String>, WorkgateError> {
        let stdout = self.git(
            cwd,
            &["status", "--porcelain", "-z", "--untracked-files=all"],
            timeout,
        )?;
        Ok(parse_porcelain(&stdout))
    }

    fn current_branch(&self, cwd: &Path, timeout: Duration) -> Result<String, WorkgateError> {
        match self.git(cwd, &["symbolic-ref", "--short", "-q", "HEAD"], timeout) {
            Ok(out) => Ok(out.trim().to_string()),
            // Detached HEAD
            Err(WorkgateError::ValidationError(_)) => Ok("HEAD".to_string()),
            Err(e) => Err(e),
        }
    }

    fn seconds_since_last_commit(
        &self,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<Option<u64>, WorkgateError> {
        match self.git(cwd, &["log", "-1", "--format=%ct"], timeout) {
            Ok(out) => Ok(out
                .trim()
                .parse::<u64>()
                .ok()
                .map(|ts| unix_now().saturating_sub(ts))),
            // No commits yet
            Err(WorkgateError::ValidationError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fingerprint(&self, cwd: &Path, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let (root, git_dir) = find_git_dir(cwd)?;
        let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
        let index_stamp = mtime_nanos(&git_dir.join("index"));
        let repo = format!(
            "{}|{}|{}",
            head.trim(),
            mtime_nanos(&git_dir.join("HEAD")),
            index_stamp
        );
        let watched = self.watch_list(&root, index_stamp, timeout)?;
        match tree_stamp(&watched, deadline) {
            Some(tree) => Some(format!("{}|{:016x}", repo, tree)),
            None => {
                // Too many files to stat in time: a token that never repeats.
                tracing::debug!(root = %root.display(), files = watched.len(), "tree stamp over budget");
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                Some(format!("{}|unbounded|{}", repo, now))
            }
        }
    }
}

/// Snapshot the workspace at `cwd`.
///
/// The status query decides availability: `VcsUnavailable` propagates, a
/// timeout or other failure yields a degraded snapshot. Branch and last-commit
/// queries run alongside it and fall back to `"unknown"` / `None`.
pub fn read_workspace(
    vcs: &dyn VersionControl,
    cwd: &Path,
    timeout: Duration,
) -> Result<WorkspaceState, WorkgateError> {
    let (status, (branch, last_commit)) = rayon::join(
        || vcs.changed_paths(cwd, timeout),
        || {
            (
                vcs.current_branch(cwd, timeout),
                vcs.seconds_since_last_commit(cwd, timeout),
            )
        },
    );

    let branch = match branch {
        Ok(b) => b,
        Err(WorkgateError::VcsUnavailable(p)) => return Err(WorkgateError::VcsUnavailable(p)),
        Err(e) => {
            tracing::warn!(error = %e, "branch query failed, using placeholder");
            "unknown".to_string()
        }
    };
    let last_commit = last_commit.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "last-commit query failed");
        None
    });

    match status {
        Ok(paths) => Ok(WorkspaceState::new(branch, paths, last_commit)),
        Err(WorkgateError::VcsUnavailable(p)) => Err(WorkgateError::VcsUnavailable(p)),
        Err(e) => {
            tracing::warn!(error = %e, cwd = %cwd.display(), "status query degraded");
            Ok(WorkspaceState::degraded(branch, last_commit))
        }
    }
}

/// Parse `git status --porcelain -z` into paths. Renames and copies report
/// the new path; their source path is the next field.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = stdout.split('\0');
    while let Some(entry) = fields.next() {
        if entry.len() < 4 || !entry.is_char_boundary(3) {
            continue;
        }
        paths.push(entry[3..].to_string());
        if entry[..2].contains(['R', 'C']) {
            fields.next();
        }
    }
    paths
}

/// Extract an issue number from a branch name.
///
/// Recognizes `#123` anywhere, then a purely numeric segment between
/// `/`, `-` or `_` separators (`123-login`, `feature/login-123`, `issue_123`).
pub fn parse_issue_number(branch: &str) -> Option<u64> {
    static HASH_REF: OnceLock<Regex> = OnceLock::new();
    let hash_ref = HASH_REF.get_or_init(|| Regex::new(r"#(\d+)").expect("static regex"));
    if let Some(caps) = hash_ref.captures(branch) {
        return caps[1].parse().ok();
    }
    branch
        .split(['/', '-', '_'])
        .filter(|seg| !seg.is_empty() && seg.len() <= 7)
        .find(|seg| seg.chars().all(|c| c.is_ascii_digit()))
        .and_then(|seg| seg.parse().ok())
}

/// Repository root and git directory for `cwd`.
fn find_git_dir(cwd: &Path) -> Option<(PathBuf, PathBuf)> {
    let mut dir = Some(cwd);
    while let Some(current) = dir {
        let dot_git = current.join(".git");
        if dot_git.is_dir() {
            return Some((current.to_path_buf(), dot_git));
        }
        if dot_git.is_file() {
            // Worktrees and submodules: `.git` is a file holding `gitdir: <path>`.
            let content = fs::read_to_string(&dot_git).ok()?;
            let target = content.trim().strip_prefix("gitdir:")?.trim();
            let target = PathBuf::from(target);
            let git_dir = if target.is_absolute() {
                target
            } else {
                current.join(target)
            };
            return Some((current.to_path_buf(), git_dir));
        }
        dir = current.parent();
    }
    None
}

/// Hash of size and mtime for every watched path. `None` past `deadline`.
fn tree_stamp(paths: &[PathBuf], deadline: Instant) -> Option<u64> {
    let mut hasher = FxHasher::default();
    for (i, path) in paths.iter().enumerate() {
        if i % 256 == 0 && Instant::now() >= deadline {
            return None;
        }
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                meta.len().hash(&mut hasher);
                meta.modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .hash(&mut hasher);
            }
            Err(_) => u64::MAX.hash(&mut hasher),
        }
    }
    Some(hasher.finish())
}

fn mtime_nanos(path: &Path) -> u128 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
