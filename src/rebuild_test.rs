use super::*;
use crate::amend::{add_hunk_to_plan, AmendmentPlan};
use crate::backend::{Backend, DEFAULT_QUEUE_CAPACITY};
use crate::diff_parser::parse_diff_hunks;
use std::process::Command;

fn init_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for args in [
        vec!["init", "-q"],
        vec!["config", "user.email", "test@example.org"],
        vec!["config", "user.name", "test"],
    ] {
        Command::new("git").current_dir(dir.path()).args(args).status().unwrap();
    }
    dir
}

fn commit_file(dir: &std::path::Path, content: &str, message: &str) -> Oid {
    std::fs::write(dir.join("a.txt"), content).unwrap();
    Command::new("git").current_dir(dir).args(["add", "a.txt"]).status().unwrap();
    Command::new("git")
        .current_dir(dir)
        .args(["commit", "-q", "-m", message])
        .status()
        .unwrap();
    let out = Command::new("git")
        .current_dir(dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    Oid::parse(String::from_utf8_lossy(&out.stdout).trim()).unwrap()
}

fn file_at(dir: &std::path::Path, rev: Oid, path: &str) -> String {
    let spec = format!("{}:{}", rev, path);
    let out = Command::new("git")
        .current_dir(dir)
        .args(["show", &spec])
        .output()
        .unwrap();
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[tokio::test]
async fn rewrites_single_root_commit_in_place() {
    let dir = init_repo();
    let root = commit_file(dir.path(), "one\ntwo\nthree\n", "initial");

    let diff = b"diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -2,1 +2,1 @@\n-two\n+TWO\n".to_vec();
    let hunks = parse_diff_hunks(&diff).unwrap();

    let repo = Repo::new(dir.path());
    let mut plan = AmendmentPlan::new(root, None);
    add_hunk_to_plan(&mut plan, &repo, root, None, b"a.txt", 2, 1, &hunks[0]).unwrap();
    assert!(plan.has_amendments());

    let backend = Backend::launch(dir.path().to_path_buf(), DEFAULT_QUEUE_CAPACITY);
    let new_head = AmendedBranchBuilder::write(&repo, &backend, &plan).await.unwrap();
    backend.join().await.unwrap();

    assert_ne!(new_head, root);
    assert_eq!(file_at(dir.path(), new_head, "a.txt"), "one\nTWO\nthree\n");
}

#[tokio::test]
async fn propagates_amendment_through_unrelated_child_commit() {
    let dir = init_repo();
    let root = commit_file(dir.path(), "one\ntwo\nthree\n", "initial");

    std::fs::write(dir.path().join("b.txt"), "other file\n").unwrap();
    Command::new("git").current_dir(dir.path()).args(["add", "b.txt"]).status().unwrap();
    let child = commit_file(dir.path(), "one\ntwo\nthree\n", "add unrelated file");
    let _ = child;
    let child_out = Command::new("git")
        .current_dir(dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let child = Oid::parse(String::from_utf8_lossy(&child_out.stdout).trim()).unwrap();

    let diff = b"diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1,1 +1,1 @@\n-one\n+ONE\n".to_vec();
    let hunks = parse_diff_hunks(&diff).unwrap();

    let repo = Repo::new(dir.path());
    let mut plan = AmendmentPlan::new(child, Some(root));
    // blaming at `child` still attributes line 1 of a.txt to `root`
    add_hunk_to_plan(&mut plan, &repo, child, Some(root), b"a.txt", 1, 1, &hunks[0]).unwrap();
    assert!(plan.has_amendments());

    let backend = Backend::launch(dir.path().to_path_buf(), DEFAULT_QUEUE_CAPACITY);
    let new_head = AmendedBranchBuilder::write(&repo, &backend, &plan).await.unwrap();
    backend.join().await.unwrap();

    assert_ne!(new_head, child);
    assert_eq!(file_at(dir.path(), new_head, "a.txt"), "ONE\ntwo\nthree\n");
    assert_eq!(file_at(dir.path(), new_head, "b.txt"), "other file\n");
}
