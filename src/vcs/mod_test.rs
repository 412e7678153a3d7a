use super::*;
use std::process::Command;

fn init_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["init", "-q"])
        .status()
        .unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["config", "user.email", "test@example.org"])
        .status()
        .unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["config", "user.name", "test"])
        .status()
        .unwrap();
    dir
}

#[test]
fn resolve_revision_finds_head() {
    let dir = init_repo();
    std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["add", "a.txt"])
        .status()
        .unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["commit", "-q", "-m", "initial"])
        .status()
        .unwrap();

    let repo = Repo::new(dir.path());
    let oid = repo.resolve_revision("HEAD").unwrap();
    assert!(!oid.is_zero());
}

#[test]
fn resolve_revision_rejects_unknown_ref() {
    let dir = init_repo();
    let repo = Repo::new(dir.path());
    let err = repo.resolve_revision("not-a-ref").unwrap_err();
    assert!(matches!(err, Error::InvalidRevision { .. }));
}

#[test]
fn run_with_stdin_hashes_a_blob() {
    let dir = init_repo();
    let repo = Repo::new(dir.path());
    let out = repo
        .run_with_stdin(&["hash-object", "-t", "blob", "--stdin"], b"hello\n")
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.trim().len(), 40);
}
