/// Shared test utilities for git repository testing, grounded in
/// `test_integration.py`'s fixed-identity environment: every commit in a
/// test repo gets reproducible author/committer name, email and date so
/// rewritten OIDs (and golden transcripts) are stable across runs.
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::oid::Oid;
use crate::vcs::Repo;

pub struct TestRepo {
    pub repo: Repo,
    dir: TempDir,
}

impl TestRepo {
    /// A fresh repository with one commit (`initial`), author/committer
    /// identity pinned to the fixed test values.
    pub fn new() -> TestRepo {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        configure_identity(dir.path());

        std::fs::write(dir.path().join(".gitkeep"), "").unwrap();
        run_git(dir.path(), &["add", "."]);
        commit(dir.path(), "initial");

        TestRepo {
            repo: Repo::new(dir.path()),
            dir,
        }
    }

    /// A freshly initialized repository with no commits at all.
    pub fn new_empty() -> TestRepo {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        configure_identity(dir.path());
        TestRepo {
            repo: Repo::new(dir.path()),
            dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `path` (relative to the repo root), staging it.
    pub fn write_and_stage(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
        run_git(self.path(), &["add", path]);
    }

    /// Stage `content` for `path` and commit it, returning the new OID.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) -> Oid {
        self.write_and_stage(path, content);
        commit(self.path(), message);
        self.head()
    }

    pub fn head(&self) -> Oid {
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, rev: &str) -> Oid {
        let out = Command::new("git")
            .current_dir(self.path())
            .args(["rev-parse", rev])
            .output()
            .unwrap();
        Oid::parse(String::from_utf8_lossy(&out.stdout).trim()).unwrap()
    }

    pub fn checkout_new_branch(&self, name: &str) {
        run_git(self.path(), &["checkout", "-q", "-b", name]);
    }

    pub fn checkout(&self, name: &str) {
        run_git(self.path(), &["checkout", "-q", name]);
    }

    pub fn merge_no_ff(&self, branch: &str) -> Oid {
        run_git(self.path(), &["merge", "--no-ff", "--no-edit", branch]);
        self.head()
    }

    pub fn file_at(&self, rev: Oid, path: &str) -> String {
        let spec = format!("{}:{}", rev, path);
        let out = Command::new("git")
            .current_dir(self.path())
            .args(["show", &spec])
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).into_owned()
    }
}

fn commit(dir: &Path, message: &str) {
    run_git(dir, &["commit", "-q", "-m", message]);
}

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(dir)
        .args(args)
        .status()
        .unwrap_or_else(|e| panic!("failed to spawn git {args:?}: {e}"));
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

/// Pin the environment to the same author/committer identity and dates
/// every integration test in the original implementation used, so
/// rewritten trees are reproducible byte-for-byte across test runs.
fn configure_identity(dir: &Path) {
    run_git(dir, &["config", "user.name", "git-entropy-test"]);
    run_git(dir, &["config", "user.email", "git-entropy-test@example.org"]);
    std::env::set_var("GIT_AUTHOR_NAME", "git-entropy-test");
    std::env::set_var("GIT_AUTHOR_EMAIL", "git-entropy-test@example.org");
    std::env::set_var("GIT_AUTHOR_DATE", "2019-05-26 14:35:38+00:00");
    std::env::set_var("GIT_COMMITTER_NAME", "git-entropy-test");
    std::env::set_var("GIT_COMMITTER_EMAIL", "git-entropy-test@example.org");
    std::env::set_var("GIT_COMMITTER_DATE", "2019-05-27 14:35:38+00:00");
}

#[allow(dead_code)]
pub fn fixed_workdir(repo: &TestRepo) -> PathBuf {
    repo.path().to_path_buf()
}
