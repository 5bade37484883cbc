//! Command classifier.
//!
//! Splits a shell command into segments (respecting quotes, pipes, `&&`, `||`,
//! `;`, command substitution and heredocs) and classifies each one. The
//! command as a whole takes its most restrictive segment:
//! `read-only < vcs-read < vcs-write < mutating`. Anything unrecognized is
//! `mutating`.

use crate::core::config::{WorkgateConfig, compile_globs};
use crate::core::error::WorkgateError;
use globset::GlobSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessKind {
    ReadOnly,
    VcsRead,
    VcsWrite,
    Mutating,
}

impl AccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::VcsRead => "vcs-read",
            Self::VcsWrite => "vcs-write",
            Self::Mutating => "mutating",
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::VcsRead)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkIntent {
    Server,
    Test,
    Build,
    Other,
}

impl WorkIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Test => "test",
            Self::Build => "build",
            Self::Other => "other",
        }
    }
}

/// Actions that start a new unit of work and therefore need a clean workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationKind {
    Branch,
    Spec,
    Issue,
}

impl CreationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Spec => "spec",
            Self::Issue => "issue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub access_kind: AccessKind,
    pub work_intent: WorkIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation: Option<CreationKind>,
    /// Every write targets documentation.
    pub docs_only: bool,
}

impl ClassificationResult {
    fn read_only() -> Self {
        Self {
            access_kind: AccessKind::ReadOnly,
            work_intent: WorkIntent::Other,
            creation: None,
            docs_only: false,
        }
    }

    /// Most restrictive classification, for input that could not be inspected.
    pub fn unknown() -> Self {
        Self {
            access_kind: AccessKind::Mutating,
            ..Self::read_only()
        }
    }
}

/// Classifier with the project's spec directories and docs patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
    spec_dirs: Vec<String>,
    docs: GlobSet,
}

impl Default for Classifier {
    fn default() -> Self {
        let enforcement = WorkgateConfig::default().enforcement;
        let spec_dirs = normalize_spec_dirs(enforcement.spec_dirs);
        let docs = compile_globs("enforcement.docs_patterns", &enforcement.docs_patterns)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "built-in docs patterns rejected");
                GlobSet::empty()
            });
        Self { spec_dirs, docs }
    }
}

fn normalize_spec_dirs(spec_dirs: Vec<String>) -> Vec<String> {
    spec_dirs
        .into_iter()
        .map(|d| d.trim_start_matches("./").trim_end_matches('/').to_string())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Classify with default spec/docs settings.
pub fn classify(action_text: &str) -> ClassificationResult {
    Classifier::default().classify(action_text)
}

impl Classifier {
    /// Fails with `ValidationError` when a docs pattern is not a valid glob.
    pub fn new(spec_dirs: Vec<String>, docs_patterns: Vec<String>) -> Result<Self, WorkgateError> {
        Ok(Self {
            spec_dirs: normalize_spec_dirs(spec_dirs),
            docs: compile_globs("enforcement.docs_patterns", &docs_patterns)?,
        })
    }

    pub fn classify(&self, action_text: &str) -> ClassificationResult {
        // Only a deadline can make classification fail.
        self.classify_within(action_text, None)
            .unwrap_or_else(|_| ClassificationResult::unknown())
    }

    /// Classify, giving up with `ClassificationTimeout` once `budget` is spent.
    pub fn classify_with_budget(
        &self,
        action_text: &str,
        budget: Duration,
    ) -> Result<ClassificationResult, WorkgateError> {
        self.classify_within(action_text, Some((Instant::now() + budget, budget)))
    }

    fn classify_within(
        &self,
        action_text: &str,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<ClassificationResult, WorkgateError> {
        let segments = split_segments(action_text);
        if segments.is_empty() {
            return Ok(ClassificationResult::read_only());
        }

        let mut access = AccessKind::ReadOnly;
        let mut intent = WorkIntent::Other;
        let mut creation = None;
        let mut docs_only = true;
        let mut saw_write = false;

        for segment in &segments {
            if let Some((at, budget)) = deadline
                && Instant::now() >= at
            {
                return Err(WorkgateError::ClassificationTimeout(budget.as_millis() as u64));
            }
            let verdict = self.classify_segment(segment);
            access = access.max(verdict.access);
            if intent == WorkIntent::Other {
                intent = verdict.intent;
            }
            if creation.is_none() {
                creation = verdict.creation;
            }
            if verdict.access == AccessKind::Mutating {
                saw_write = true;
                if !self.writes_only_docs(segment) {
                    docs_only = false;
                }
            }
        }

        Ok(ClassificationResult {
            access_kind: access,
            work_intent: intent,
            creation,
            docs_only: saw_write && docs_only && creation.is_none(),
        })
    }

    /// Classification of a file edit. The path is relative to the workspace root.
    pub fn classify_edit(&self, path: &str, already_exists: bool) -> ClassificationResult {
        let normalized = path.trim_start_matches("./");
        let creation = (!already_exists && self.is_spec_path(normalized)).then_some(CreationKind::Spec);
        ClassificationResult {
            access_kind: AccessKind::Mutating,
            work_intent: if is_test_path(normalized) {
                WorkIntent::Test
            } else {
                WorkIntent::Other
            },
            creation,
            docs_only: creation.is_none() && self.is_docs_path(normalized),
        }
    }

    pub fn is_docs_path(&self, path: &str) -> bool {
        self.docs.is_match(path.trim_start_matches("./"))
    }

    pub fn is_spec_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        self.spec_dirs.iter().any(|dir| {
            path == dir
                || path.starts_with(&format!("{}/", dir))
                || path.contains(&format!("/{}/", dir))
        })
    }

    fn writes_only_docs(&self, segment: &Segment) -> bool {
        let targets = write_targets(segment);
        !targets.is_empty() && targets.iter().all(|t| self.is_docs_path(t))
    }

    fn classify_segment(&self, segment: &Segment) -> SegmentVerdict {
        let words = strip_wrappers(&segment.words);
        let has_writes = !segment.redirects.is_empty();

        let Some(first) = words.first() else {
            return SegmentVerdict::new(if has_writes {
                AccessKind::Mutating
            } else {
                AccessKind::ReadOnly
            });
        };
        let program = first.rsplit('/').next().unwrap_or(first).to_string();
        let args = &words[1..];
        let normalized = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        let intent = detect_work_intent(&normalized);

        let mut verdict = match program.as_str() {
            "git" => classify_git(args),
            "gh" => classify_gh(args),
            "for" | "case" | "select" => SegmentVerdict::new(AccessKind::ReadOnly),
            _ if is_info_query(args) => SegmentVerdict::new(AccessKind::ReadOnly),
            _ if READ_ONLY_TOOLS.contains(&program.as_str()) => {
                if has_in_place_flag(&program, args) {
                    SegmentVerdict::new(AccessKind::Mutating)
                } else {
                    SegmentVerdict::new(AccessKind::ReadOnly)
                }
            }
            _ if is_read_only_subcommand(&program, args) => {
                SegmentVerdict::new(AccessKind::ReadOnly)
            }
            // Explicit mutators and everything unrecognized.
            _ => SegmentVerdict::new(AccessKind::Mutating),
        };

        if has_writes {
            verdict.access = AccessKind::Mutating;
        }
        verdict.intent = intent;
        if verdict.creation.is_none()
            && verdict.access == AccessKind::Mutating
            && !matches!(program.as_str(), "rm" | "rmdir" | "unlink")
            && args
                .iter()
                .chain(segment.redirects.iter())
                .any(|w| self.is_spec_path(w))
        {
            verdict.creation = Some(CreationKind::Spec);
        }
        verdict
    }
}

struct SegmentVerdict {
    access: AccessKind,
    intent: WorkIntent,
    creation: Option<CreationKind>,
}

impl SegmentVerdict {
    fn new(access: AccessKind) -> Self {
        Self {
            access,
            intent: WorkIntent::Other,
            creation: None,
        }
    }

    fn creating(access: AccessKind, kind: CreationKind) -> Self {
        Self {
            access,
            intent: WorkIntent::Other,
            creation: Some(kind),
        }
    }
}

// --- git / gh ---

const GIT_READ: &[&str] = &[
    "status", "log", "diff", "show", "blame", "shortlog", "describe", "rev-parse", "rev-list",
    "ls-files", "ls-tree", "ls-remote", "cat-file", "for-each-ref", "name-rev", "grep",
    "whatchanged", "check-ignore", "reflog", "help", "version", "count-objects", "merge-base",
    "show-ref", "show-branch", "range-diff", "difftool",
];

const GIT_WRITE: &[&str] = &[
    "commit", "push", "merge", "rebase", "reset", "checkout", "switch", "add", "rm", "mv",
    "stash", "cherry-pick", "revert", "pull", "fetch", "apply", "am", "restore", "clean", "init",
    "clone", "tag", "branch", "worktree", "remote", "config", "notes", "submodule", "bisect",
    "gc", "prune", "update-index", "sparse-checkout", "lfs",
];

fn classify_git(args: &[String]) -> SegmentVerdict {
    let mut rest = args.iter().map(String::as_str).peekable();
    // Global options before the subcommand.
    while let Some(&arg) = rest.peek() {
        match arg {
            "-C" | "-c" | "--git-dir" | "--work-tree" | "--namespace" => {
                rest.next();
                rest.next();
            }
            a if a.starts_with('-') => {
                rest.next();
            }
            _ => break,
        }
    }
    let Some(sub) = rest.next() else {
        return SegmentVerdict::new(AccessKind::ReadOnly);
    };
    let sub_args: Vec<&str> = rest.collect();
    let has = |flags: &[&str]| sub_args.iter().any(|a| flags.contains(a));
    let positional = sub_args.iter().filter(|a| !a.starts_with('-')).count();

    match sub {
        s if GIT_READ.contains(&s) => SegmentVerdict::new(AccessKind::VcsRead),
        "checkout" if has(&["-b", "-B", "--orphan"]) => {
            SegmentVerdict::creating(AccessKind::VcsWrite, CreationKind::Branch)
        }
        "switch" if has(&["-c", "-C", "--create", "--force-create", "--orphan"]) => {
            SegmentVerdict::creating(AccessKind::VcsWrite, CreationKind::Branch)
        }
        "worktree" if sub_args.first() == Some(&"add") && has(&["-b", "-B"]) => {
            SegmentVerdict::creating(AccessKind::VcsWrite, CreationKind::Branch)
        }
        "worktree" if sub_args.first() == Some(&"list") => SegmentVerdict::new(AccessKind::VcsRead),
        "branch" => {
            let listing = positional == 0
                || has(&["--list", "-l", "-a", "-r", "--all", "--remotes", "--show-current", "--contains", "--merged", "--no-merged"]);
            let editing = has(&["-d", "-D", "--delete", "-m", "-M", "--move", "-c", "-C", "--copy", "-u", "--set-upstream-to", "--unset-upstream"]);
            if editing {
                SegmentVerdict::new(AccessKind::VcsWrite)
            } else if listing {
                SegmentVerdict::new(AccessKind::VcsRead)
            } else {
                SegmentVerdict::creating(AccessKind::VcsWrite, CreationKind::Branch)
            }
        }
        "stash" if matches!(sub_args.first(), Some(&"list") | Some(&"show")) => {
            SegmentVerdict::new(AccessKind::VcsRead)
        }
        "tag" if positional == 0 || has(&["-l", "--list"]) => SegmentVerdict::new(AccessKind::VcsRead),
        "remote" if positional == 0 || matches!(sub_args.first(), Some(&"show") | Some(&"get-url")) => {
            SegmentVerdict::new(AccessKind::VcsRead)
        }
        "config" if has(&["--get", "--get-all", "--list", "-l", "--get-regexp"]) => {
            SegmentVerdict::new(AccessKind::VcsRead)
        }
        s if GIT_WRITE.contains(&s) => SegmentVerdict::new(AccessKind::VcsWrite),
        _ => SegmentVerdict::new(AccessKind::Mutating),
    }
}

fn classify_gh(args: &[String]) -> SegmentVerdict {
    let group = args.first().map(String::as_str).unwrap_or("");
    let action = args.get(1).map(String::as_str).unwrap_or("");
    match (group, action) {
        ("", _) | ("help", _) | ("--version", _) | ("version", _) => {
            SegmentVerdict::new(AccessKind::ReadOnly)
        }
        ("issue", "create") => SegmentVerdict::creating(AccessKind::VcsWrite, CreationKind::Issue),
        ("api", _) => {
            let writes = args.windows(2).any(|w| {
                matches!(w[0].as_str(), "-X" | "--method")
                    && !w[1].eq_ignore_ascii_case("GET")
            }) || args
                .iter()
                .any(|a| matches!(a.as_str(), "-f" | "-F" | "--field" | "--raw-field" | "--input"));
            SegmentVerdict::new(if writes {
                AccessKind::VcsWrite
            } else {
                AccessKind::VcsRead
            })
        }
        (_, "list" | "view" | "status" | "diff" | "checks" | "browse") => {
            SegmentVerdict::new(AccessKind::VcsRead)
        }
        ("auth", "status") | ("repo", "view") | ("run", "watch") | ("search", _) => {
            SegmentVerdict::new(AccessKind::VcsRead)
        }
        ("issue" | "pr" | "release" | "repo" | "run" | "workflow" | "label" | "gist", _) => {
            SegmentVerdict::new(AccessKind::VcsWrite)
        }
        _ => SegmentVerdict::new(AccessKind::Mutating),
    }
}

// --- generic tools ---

const READ_ONLY_TOOLS: &[&str] = &[
    "cat", "ls", "ll", "la", "head", "tail", "less", "more", "grep", "egrep", "fgrep", "rg", "ag",
    "ack", "find", "fd", "tree", "wc", "sort", "uniq", "cut", "tr", "diff", "cmp", "comm", "file",
    "stat", "du", "df", "pwd", "echo", "printf", "which", "whereis", "type", "printenv", "whoami",
    "id", "date", "uname", "hostname", "ps", "lsof", "netstat", "ss", "jq", "yq", "awk", "gawk",
    "sed", "column", "basename", "dirname", "realpath", "readlink", "true", "false", "test", "[",
    "cd", "pushd", "popd", "history", "man", "tldr", "xxd", "hexdump", "od", "strings", "md5sum",
    "sha1sum", "sha256sum", "shasum", "nl", "tac", "rev", "fold", "join", "paste", "bat", "exa",
    "eza", "env", "uptime", "free", "nproc", "sleep", "seq", "expr", "bc", "zcat", "zgrep",
    "journalctl", "tokei", "cloc",
];

fn has_in_place_flag(program: &str, args: &[String]) -> bool {
    match program {
        "sed" => args
            .iter()
            .any(|a| a == "--in-place" || (a.starts_with("-i") && !a.starts_with("--")) || a.starts_with("--in-place=")),
        "awk" | "gawk" => args.windows(2).any(|w| w[0] == "-i" && w[1] == "inplace"),
        "sort" => args.iter().any(|a| a == "-o" || a.starts_with("--output")),
        "find" => args.iter().any(|a| {
            matches!(
                a.as_str(),
                "-delete" | "-exec" | "-execdir" | "-ok" | "-okdir" | "-fprint" | "-fprintf" | "-fls"
            )
        }),
        _ => false,
    }
}

/// `<tool> --version`, `<tool> --help` and friends.
fn is_info_query(args: &[String]) -> bool {
    matches!(args, [only] if matches!(only.as_str(), "--version" | "-V" | "--help" | "-h" | "version" | "help"))
}

fn is_read_only_subcommand(program: &str, args: &[String]) -> bool {
    let sub = args.first().map(String::as_str).unwrap_or("");
    let sub2 = args.get(1).map(String::as_str).unwrap_or("");
    match program {
        "cargo" => matches!(sub, "tree" | "metadata" | "search" | "locate-project" | "pkgid" | "verify-project" | "-V"),
        "npm" | "pnpm" | "yarn" | "bun" => {
            matches!(sub, "ls" | "list" | "view" | "info" | "outdated" | "why" | "root" | "bin" | "prefix" | "-v")
                || (sub == "audit" && !args.iter().any(|a| a == "fix"))
                || (sub == "config" && sub2 == "get")
        }
        "pip" | "pip3" => matches!(sub, "list" | "show" | "freeze" | "check" | "index"),
        "uv" => (sub == "pip" && matches!(sub2, "list" | "show" | "freeze" | "check" | "tree")) || sub == "tree",
        "docker" | "podman" => {
            matches!(sub, "ps" | "images" | "logs" | "inspect" | "info" | "stats" | "top" | "history" | "port")
                || (matches!(sub, "compose" | "container" | "image")
                    && matches!(sub2, "ps" | "logs" | "config" | "ls" | "inspect" | "images"))
        }
        "docker-compose" => matches!(sub, "ps" | "logs" | "config" | "images"),
        "kubectl" => matches!(sub, "get" | "describe" | "logs" | "top" | "explain" | "api-resources")
            || (sub == "config" && sub2 == "view")
            || (sub == "auth" && sub2 == "can-i"),
        "go" => matches!(sub, "env" | "list" | "doc" | "vet"),
        "systemctl" => matches!(sub, "status" | "list-units" | "is-active" | "is-enabled" | "show"),
        "brew" => matches!(sub, "list" | "info" | "search" | "outdated" | "deps" | "doctor"),
        "apt" | "apt-cache" | "dpkg" => matches!(sub, "list" | "show" | "search" | "policy" | "-l" | "-L"),
        "make" => args.iter().any(|a| a == "-n" || a == "--dry-run" || a == "--just-print"),
        _ => false,
    }
}

const WRAPPERS: &[&str] = &[
    "sudo", "nohup", "command", "builtin", "exec", "time", "nice", "stdbuf", "timeout", "watch",
    "xargs", "env", "then", "do", "done", "else", "elif", "if", "fi", "esac", "while", "until", "!",
    "{", "}",
];

const VALUE_FLAGS: &[&str] = &["-u", "-g", "-n", "-I", "-L", "-P", "-d", "-s", "-k"];

/// Drop env assignments, wrapper commands and shell keywords in front of the real program.
fn strip_wrappers(words: &[String]) -> Vec<String> {
    let mut i = 0;
    let mut wrapper: Option<&str> = None;
    while i < words.len() {
        let w = words[i].as_str();
        if is_assignment(w) {
            i += 1;
            continue;
        }
        if WRAPPERS.contains(&w) {
            // Bare `env` prints the environment; keep it as the program.
            if w == "env" && words[i + 1..].iter().all(|x| is_assignment(x)) {
                break;
            }
            wrapper = Some(w);
            i += 1;
            continue;
        }
        if wrapper.is_some() && w.starts_with('-') {
            i += if VALUE_FLAGS.contains(&w) { 2 } else { 1 };
            continue;
        }
        if wrapper == Some("timeout") && w.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            wrapper = None;
            i += 1;
            continue;
        }
        break;
    }
    words[i.min(words.len())..].to_vec()
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn write_targets(segment: &Segment) -> Vec<String> {
    let mut targets = segment.redirects.clone();
    let words = strip_wrappers(&segment.words);
    let Some(first) = words.first() else {
        return targets;
    };
    let program = first.rsplit('/').next().unwrap_or(first);
    let positional: Vec<&String> = words[1..].iter().filter(|w| !w.starts_with('-')).collect();
    match program {
        "touch" | "tee" | "mkdir" => targets.extend(positional.into_iter().cloned()),
        "cp" | "mv" => targets.extend(positional.last().map(|s| (*s).clone())),
        // First positional is the script; the rest are files edited in place.
        "sed" => targets.extend(positional.into_iter().skip(1).cloned()),
        _ => {}
    }
    targets
}

fn is_test_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    path.starts_with("tests/")
        || path.starts_with("test/")
        || path.contains("/tests/")
        || path.contains("/test/")
        || path.contains("__tests__/")
        || name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.")
}

// --- work intent ---

fn intent_table() -> &'static [(Regex, WorkIntent)] {
    static TABLE: OnceLock<Vec<(Regex, WorkIntent)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let raw: &[(&str, WorkIntent)] = &[
            (r"^(pytest|py\.test|jest|vitest|mocha|rspec|phpunit|tox|nox|ctest|karma|ava)\b", WorkIntent::Test),
            (r"^python[0-9.]* -m (pytest|unittest)\b", WorkIntent::Test),
            (r"^cargo (test|nextest)\b", WorkIntent::Test),
            (r"^(go|deno|bun|dotnet|mix|swift) test\b", WorkIntent::Test),
            (r"^(npm|pnpm|bun|yarn)( run)? test", WorkIntent::Test),
            (r"^(mvn|gradle|\./gradlew|\./mvnw)\b.*\btest\b", WorkIntent::Test),
            (r"^make (test|check)\b", WorkIntent::Test),
            (r"^bundle exec (rspec|rake test)\b", WorkIntent::Test),
            (r"^(npx )?playwright test\b", WorkIntent::Test),
            (r"^(npm|pnpm|bun) (start|run (dev|start|serve|preview))\b", WorkIntent::Server),
            (r"^yarn (run )?(start|dev|serve|preview)\b", WorkIntent::Server),
            (r"^python[0-9.]* -m http\.server\b", WorkIntent::Server),
            (r"manage\.py runserver\b", WorkIntent::Server),
            (r"^flask run\b", WorkIntent::Server),
            (r"^(uvicorn|gunicorn|hypercorn|daphne|nodemon|http-server|live-server)\b", WorkIntent::Server),
            (r"^(bundle exec )?rails (s|server)\b", WorkIntent::Server),
            (r"^(npx )?(next|nuxt|vite|astro) dev\b", WorkIntent::Server),
            (r"^(hugo server|jekyll serve|mkdocs serve|ng serve|php -S)\b", WorkIntent::Server),
            (r"^docker(-compose| compose) up\b", WorkIntent::Server),
            (r"^\./start\.sh\b", WorkIntent::Server),
            (r"^(node|deno run|bun run) \S*server", WorkIntent::Server),
            (r"^cargo (build|check|clippy|doc)\b", WorkIntent::Build),
            (r"^(npm|pnpm|bun|yarn)( run)? build\b", WorkIntent::Build),
            (r"^make\b", WorkIntent::Build),
            (r"^(go|dotnet|swift) build\b", WorkIntent::Build),
            (r"^(tsc|webpack|rollup|esbuild|parcel|cmake|ninja|meson|bazel|buck)\b", WorkIntent::Build),
            (r"^(npx )?(vite|next|nuxt|astro) build\b", WorkIntent::Build),
            (r"^(mvn|\./mvnw)\b.*\b(package|install|compile|verify)\b", WorkIntent::Build),
            (r"^(gradle|\./gradlew)\b.*\b(build|assemble)\b", WorkIntent::Build),
            (r"^docker build\b", WorkIntent::Build),
            (r"^python[0-9.]* -m build\b", WorkIntent::Build),
        ];
        raw.iter()
            .map(|(p, intent)| (Regex::new(p).expect("static intent regex"), *intent))
            .collect()
    })
}

fn detect_work_intent(normalized: &str) -> WorkIntent {
    intent_table()
        .iter()
        .find(|(re, _)| re.is_match(normalized))
        .map(|(_, intent)| *intent)
        .unwrap_or(WorkIntent::Other)
}

// --- tokenizer ---

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Segment {
    words: Vec<String>,
    /// Output redirection targets, excluding `/dev/*` sinks.
    redirects: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Output,
    Input,
    HeredocDelimiter,
}

struct Tokenizer {
    segments: Vec<Segment>,
    current: Segment,
    word: String,
    word_started: bool,
    pending: Pending,
    heredoc: Option<String>,
}

impl Tokenizer {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            current: Segment::default(),
            word: String::new(),
            word_started: false,
            pending: Pending::None,
            heredoc: None,
        }
    }

    fn end_word(&mut self) {
        if !self.word_started {
            return;
        }
        let word = std::mem::take(&mut self.word);
        self.word_started = false;
        match self.pending {
            Pending::Output => {
                if !word.starts_with("/dev/") {
                    self.current.redirects.push(word);
                }
            }
            Pending::Input => {}
            Pending::HeredocDelimiter => {
                self.heredoc = Some(word.trim_start_matches('-').to_string());
            }
            Pending::None => self.current.words.push(word),
        }
        self.pending = Pending::None;
    }

    fn end_segment(&mut self) {
        self.end_word();
        let segment = std::mem::take(&mut self.current);
        if !segment.words.is_empty() || !segment.redirects.is_empty() {
            self.segments.push(segment);
        }
    }

    fn push_char(&mut self, c: char) {
        self.word.push(c);
        self.word_started = true;
    }
}

fn split_segments(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut t = Tokenizer::new();
    let mut nested: Vec<String> = Vec::new();
    let mut i = 0;
    let mut in_single = false;
    let mut in_double = false;

    while i < chars.len() {
        let c = chars[i];

        if in_single {
            if c == '\'' {
                in_single = false;
            } else {
                t.push_char(c);
            }
            i += 1;
            continue;
        }

        // Command substitution is classified as its own segment, in or out of double quotes.
        if c == '$' && chars.get(i + 1) == Some(&'(') {
            let (inner, next) = take_balanced(&chars, i + 2);
            nested.push(inner);
            t.push_char('$');
            i = next;
            continue;
        }
        if c == '`' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == '`')
                .map(|p| i + 1 + p)
                .unwrap_or(chars.len());
            nested.push(chars[i + 1..end].iter().collect());
            t.push_char('$');
            i = end + 1;
            continue;
        }

        if in_double {
            match c {
                '"' => in_double = false,
                '\\' if i + 1 < chars.len() => {
                    t.push_char(chars[i + 1]);
                    i += 1;
                }
                _ => t.push_char(c),
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                in_single = true;
                t.word_started = true;
            }
            '"' => {
                in_double = true;
                t.word_started = true;
            }
            '\\' if i + 1 < chars.len() => {
                if chars[i + 1] != '\n' {
                    t.push_char(chars[i + 1]);
                }
                i += 1;
            }
            '\n' => {
                t.end_segment();
                if let Some(delim) = t.heredoc.take() {
                    // Skip the heredoc body through the delimiter line.
                    let mut j = i + 1;
                    loop {
                        let line_end = chars[j..]
                            .iter()
                            .position(|&ch| ch == '\n')
                            .map(|p| j + p)
                            .unwrap_or(chars.len());
                        let line: String = chars[j..line_end].iter().collect();
                        j = line_end;
                        if line.trim() == delim || j >= chars.len() {
                            break;
                        }
                        j += 1;
                    }
                    i = j;
                }
            }
            ';' | '(' | ')' => t.end_segment(),
            '&' => {
                if chars.get(i + 1) == Some(&'>') {
                    // `&>file` / `&>>file`
                    t.end_word();
                    i += 1;
                    if chars.get(i + 1) == Some(&'>') {
                        i += 1;
                    }
                    t.pending = Pending::Output;
                } else {
                    if chars.get(i + 1) == Some(&'&') {
                        i += 1;
                    }
                    t.end_segment();
                }
            }
            '|' => {
                if matches!(chars.get(i + 1), Some(&'|') | Some(&'&')) {
                    i += 1;
                }
                t.end_segment();
            }
            '>' => {
                // A bare fd number right before `>` belongs to the redirection.
                if t.word_started && t.word.chars().all(|ch| ch.is_ascii_digit()) {
                    t.word.clear();
                    t.word_started = false;
                } else {
                    t.end_word();
                }
                if matches!(chars.get(i + 1), Some(&'>') | Some(&'|')) {
                    i += 1;
                }
                if chars.get(i + 1) == Some(&'&') {
                    // fd duplication such as `2>&1` or `>&2`
                    i += 2;
                    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '-') {
                        i += 1;
                    }
                    continue;
                }
                t.pending = Pending::Output;
            }
            '<' => {
                t.end_word();
                let mut run = 1;
                while chars.get(i + run) == Some(&'<') {
                    run += 1;
                }
                i += run - 1;
                t.pending = match run {
                    2 => Pending::HeredocDelimiter,
                    _ => Pending::Input,
                };
            }
            c if c.is_whitespace() => t.end_word(),
            _ => t.push_char(c),
        }
        i += 1;
    }
    t.end_segment();

    let mut segments = t.segments;
    for inner in nested {
        segments.extend(split_segments(&inner));
    }
    segments
}

/// Returns the text up to the `)` matching an already-consumed `(`, and the index after it.
fn take_balanced(chars: &[char], start: usize) -> (String, usize) {
    let mut depth = 1;
    let mut i = start;
    let mut in_single = false;
    let mut in_double = false;
    while i < chars.len() {
        match chars[i] {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => {
                depth -= 1;
                if depth == 0 {
                    return (chars[start..i].iter().collect(), i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    (chars[start..].iter().collect(), chars.len())
}
