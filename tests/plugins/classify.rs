use workgate::plugins::classify::{AccessKind, Classifier, CreationKind, WorkIntent, classify};

fn access(cmd: &str) -> AccessKind {
    classify(cmd).access_kind
}

#[test]
fn test_read_only_tools() {
    for cmd in [
        "cat file.txt",
        "ls -la",
        "grep -r \"a && b\" src",
        "cd src && ls",
        "find . -name '*.rs'",
        "sed 's/a/b/' notes.txt",
        "ls 2>/dev/null",
        "docker ps",
        "kubectl get pods",
        "python --version",
        "FOO=1 cargo --version",
        "for f in *.py; do wc -l $f; done",
    ] {
        assert_eq!(access(cmd), AccessKind::ReadOnly, "{}", cmd);
    }
}

#[test]
fn test_vcs_reads() {
    for cmd in [
        "git status",
        "git log --oneline | head -5",
        "git --no-pager diff",
        "git -C sub status",
        "git branch",
        "git stash list",
        "gh pr list",
        "gh api repos/o/r/issues",
    ] {
        assert_eq!(access(cmd), AccessKind::VcsRead, "{}", cmd);
    }
}

#[test]
fn test_vcs_writes_without_creation() {
    for cmd in [
        "git commit -m 'fix: thing'",
        "git reset --hard HEAD~1",
        "git push origin main",
        "git stash",
        "git branch -D old",
        "gh pr create --fill",
        "gh api -X POST repos/o/r/issues",
    ] {
        let result = classify(cmd);
        assert_eq!(result.access_kind, AccessKind::VcsWrite, "{}", cmd);
        assert_eq!(result.creation, None, "{}", cmd);
    }
}

#[test]
fn test_compound_takes_most_restrictive_segment() {
    assert_eq!(access("rm -rf tmp && git status"), AccessKind::Mutating);
    assert_eq!(access("git status; git commit -m x"), AccessKind::VcsWrite);
    assert_eq!(access("cat a | xargs rm"), AccessKind::Mutating);
    assert_eq!(access("echo $(rm -rf build)"), AccessKind::Mutating);
}

#[test]
fn test_unknown_and_ambiguous_commands_are_mutating() {
    let result = classify("frobnicate --all");
    assert_eq!(result.access_kind, AccessKind::Mutating);
    assert_eq!(result.work_intent, WorkIntent::Other);
    assert_eq!(access("npm install"), AccessKind::Mutating);
    assert_eq!(access("sudo rm -rf /tmp/x"), AccessKind::Mutating);
    assert_eq!(access("sed -i 's/a/b/' src/main.rs"), AccessKind::Mutating);
    assert_eq!(access("find . -name '*.tmp' -delete"), AccessKind::Mutating);
}

#[test]
fn test_redirection_is_a_write() {
    let result = classify("echo hello > notes.txt");
    assert_eq!(result.access_kind, AccessKind::Mutating);
    assert!(!result.docs_only);

    let docs = classify("echo hello >> README.md");
    assert_eq!(docs.access_kind, AccessKind::Mutating);
    assert!(docs.docs_only);

    assert_eq!(
        access("cat <<EOF > out.txt\nhello\nEOF"),
        AccessKind::Mutating
    );
}

#[test]
fn test_work_intents() {
    assert_eq!(classify("cargo test --all").work_intent, WorkIntent::Test);
    assert_eq!(classify("time pytest -x").work_intent, WorkIntent::Test);
    assert_eq!(classify("make test").work_intent, WorkIntent::Test);
    assert_eq!(classify("npm run dev").work_intent, WorkIntent::Server);
    assert_eq!(
        classify("python manage.py runserver").work_intent,
        WorkIntent::Server
    );
    assert_eq!(classify("cargo build --release").work_intent, WorkIntent::Build);
    assert_eq!(classify("ls").work_intent, WorkIntent::Other);
}

#[test]
fn test_creation_detection() {
    assert_eq!(
        classify("git checkout -b feature-x").creation,
        Some(CreationKind::Branch)
    );
    assert_eq!(classify("git switch -c fix-1").creation, Some(CreationKind::Branch));
    assert_eq!(classify("git branch new-thing").creation, Some(CreationKind::Branch));
    assert_eq!(
        classify("git worktree add -b feat ../wt").creation,
        Some(CreationKind::Branch)
    );
    assert_eq!(
        classify("gh issue create --title x").creation,
        Some(CreationKind::Issue)
    );
    let spec = classify("mkdir -p .agent-os/specs/2025-01-01-login");
    assert_eq!(spec.access_kind, AccessKind::Mutating);
    assert_eq!(spec.creation, Some(CreationKind::Spec));
    assert_eq!(classify("rm -rf .agent-os/specs/old").creation, None);
}

#[test]
fn test_file_edits() {
    let classifier = Classifier::default();

    let test_edit = classifier.classify_edit("tests/test_login.py", true);
    assert_eq!(test_edit.access_kind, AccessKind::Mutating);
    assert_eq!(test_edit.work_intent, WorkIntent::Test);

    let new_spec = classifier.classify_edit(".agent-os/specs/login/spec.md", false);
    assert_eq!(new_spec.creation, Some(CreationKind::Spec));
    assert!(!new_spec.docs_only);

    let existing_spec = classifier.classify_edit(".agent-os/specs/login/spec.md", true);
    assert_eq!(existing_spec.creation, None);
    assert!(existing_spec.docs_only);

    assert!(classifier.classify_edit("docs/guide.txt", true).docs_only);
    assert!(classifier.classify_edit("CLAUDE.md", true).docs_only);
    assert!(!classifier.classify_edit("src/main.rs", true).docs_only);
}

#[test]
fn test_custom_spec_dirs() {
    let classifier = Classifier::new(vec!["./rfcs/".into()], vec!["*.md".into()]).unwrap();
    assert!(classifier.is_spec_path("rfcs/0001-thing.md"));
    assert_eq!(
        classifier.classify("touch rfcs/0002.md").creation,
        Some(CreationKind::Spec)
    );
    assert!(!classifier.is_spec_path(".agent-os/specs/x.md"));
}

#[test]
fn test_configured_docs_globs() {
    let classifier = Classifier::new(
        vec![],
        vec![
            "docs/*.md".into(),
            "**/*.rst".into(),
            "{README,CHANGELOG}.md".into(),
        ],
    )
    .unwrap();
    assert!(classifier.is_docs_path("docs/a.md"));
    assert!(classifier.is_docs_path("x/y/a.rst"));
    assert!(classifier.is_docs_path("README.md"));
    assert!(classifier.is_docs_path("CHANGELOG.md"));
    assert!(!classifier.is_docs_path("LICENSE.md"));
    assert!(classifier.classify_edit("docs/a.md", true).docs_only);
    assert!(classifier.classify("echo hi > x/y/guide.rst").docs_only);
    assert!(!classifier.classify("echo hi > src/lib.rs").docs_only);
}
