use super::*;
use crate::amend::AmendmentRecord;
use std::process::Command;

#[test]
fn apply_amendments_replaces_single_line() {
    let content = b"one\ntwo\nthree\n".to_vec();
    let amendments = vec![AmendmentRecord { start: 2, extent: 1, replacement: b"TWO\n".to_vec() }];
    let out = apply_amendments(&content, &amendments);
    assert_eq!(out, b"one\nTWO\nthree\n".to_vec());
}

#[test]
fn apply_amendments_deletes_when_replacement_empty() {
    let content = b"one\ntwo\nthree\n".to_vec();
    let amendments = vec![AmendmentRecord { start: 2, extent: 1, replacement: Vec::new() }];
    let out = apply_amendments(&content, &amendments);
    assert_eq!(out, b"one\nthree\n".to_vec());
}

#[test]
fn apply_amendments_handles_multiple_disjoint_edits() {
    let content = b"a\nb\nc\nd\n".to_vec();
    let amendments = vec![
        AmendmentRecord { start: 1, extent: 1, replacement: b"A\n".to_vec() },
        AmendmentRecord { start: 3, extent: 2, replacement: b"CD\n".to_vec() },
    ];
    let out = apply_amendments(&content, &amendments);
    assert_eq!(out, b"A\nb\nCD\n".to_vec());
}

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

fn default_metadata() -> CommitMetadata {
    CommitMetadata {
        author_name: "git-entropy-test".to_string(),
        author_email: "git-entropy-test@example.org".to_string(),
        author_date: "2019-05-26 14:35:38+00:00".to_string(),
        committer_name: "git-entropy-revised".to_string(),
        committer_email: "git-entropy-revised@example.org".to_string(),
        committer_date: "2019-05-27 14:35:38+00:00".to_string(),
        message: b"amended commit\n".to_vec(),
    }
}

#[tokio::test]
async fn write_tree_and_commit_round_trip() {
    let dir = init_repo();
    std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
    std::fs::write(dir.path().join("b.txt"), "unrelated\n").unwrap();
    Command::new("git").current_dir(dir.path()).args(["add", "a.txt", "b.txt"]).status().unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["commit", "-q", "-m", "initial"])
        .status()
        .unwrap();
    let head_out = Command::new("git")
        .current_dir(dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let initial = Oid::parse(String::from_utf8_lossy(&head_out.stdout).trim()).unwrap();

    let hash_out = vcs_async::run_with_stdin(
        &dir.path().to_path_buf(),
        &["hash-object", "-t", "blob", "-w", "--stdin"],
        &[],
        b"hello again\n",
    )
    .await
    .unwrap();
    let blob = Oid::parse(String::from_utf8_lossy(&hash_out).trim()).unwrap();

    let tree = write_tree(&dir.path().to_path_buf(), initial, &[(b"a.txt".to_vec(), blob)])
        .await
        .unwrap();
    let commit = write_commit(&dir.path().to_path_buf(), tree, &[], &default_metadata()).await.unwrap();
    assert!(!commit.is_zero());

    let listing = Command::new("git")
        .current_dir(dir.path())
        .args(["ls-tree", "-r", &commit.to_hex()])
        .output()
        .unwrap();
    let listing = String::from_utf8_lossy(&listing.stdout);
    assert!(listing.contains("b.txt"), "untouched file must survive the rewrite: {listing}");
    assert!(listing.contains(&blob.to_hex()), "rewritten blob must appear in the tree: {listing}");
}

#[tokio::test]
async fn backend_resolves_independent_commit_rewrite() {
    let dir = init_repo();
    std::fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
    Command::new("git").current_dir(dir.path()).args(["add", "a.txt"]).status().unwrap();
    Command::new("git")
        .current_dir(dir.path())
        .args(["commit", "-q", "-m", "initial"])
        .status()
        .unwrap();
    let head_out = Command::new("git")
        .current_dir(dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let head = Oid::parse(String::from_utf8_lossy(&head_out.stdout).trim()).unwrap();

    let backend = Backend::launch(dir.path().to_path_buf(), DEFAULT_QUEUE_CAPACITY);

    let mut blob = crate::amend::AmendedBlob::new(head, "a.txt", head);
    blob.replace_lines(AmendmentRecord { start: 2, extent: 1, replacement: b"TWO\n".to_vec() }).unwrap();

    let handle = backend
        .request_commit_rewrite(
            head,
            vec![(b"a.txt".to_vec(), blob)],
            Vec::new(),
            Vec::new(),
            default_metadata(),
        )
        .await;

    let oid = backend.resolve_handle(handle).await.unwrap();
    assert!(!oid.is_zero());
    backend.join().await.unwrap();
}
