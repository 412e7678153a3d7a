use super::*;
use std::process::Command;

fn init_repo_with_file(content: &str) -> (tempfile::TempDir, Oid) {
    let dir = tempfile::tempdir().unwrap();
    for args in [
        vec!["init", "-q"],
        vec!["config", "user.email", "test@example.org"],
        vec!["config", "user.name", "test"],
    ] {
        Command::new("git").current_dir(dir.path()).args(args).status().unwrap();
    }
    std::fs::write(dir.path().join("a.txt"), content).unwrap();
    Command::new("git").current_dir(dir.path()).args(["add", "a.txt"]).status().unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["commit", "-q", "-m", "initial"])
        .status()
        .unwrap();
    let out = Command::new("git")
        .current_dir(dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let head = Oid::parse(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
    (dir, head)
}

#[test]
fn formatted_range_matches_blame_l_syntax() {
    let range = IndexedRange::new(crate::oid::ZERO, "a.txt", 4, 2);
    assert_eq!(range.formatted_range(), "4,+2");
}

#[test]
fn blob_oid_resolves_and_caches() {
    let (dir, head) = init_repo_with_file("hello\nworld\n");
    let repo = Repo::new(dir.path());
    let range = IndexedRange::new(head, "a.txt", 1, 1);

    let oid1 = range.blob_oid(&repo).unwrap();
    let oid2 = range.blob_oid(&repo).unwrap();
    assert_eq!(oid1, oid2);
}
