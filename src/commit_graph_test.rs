use super::*;
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

fn commit(dir: &std::path::Path, filename: &str, content: &str, message: &str) -> Oid {
    std::fs::write(dir.join(filename), content).unwrap();
    Command::new("git").current_dir(dir).args(["add", filename]).status().unwrap();
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

#[test]
fn linear_history_orders_parents_before_children() {
    let dir = init_repo();
    let c1 = commit(dir.path(), "a.txt", "one\n", "c1");
    let c2 = commit(dir.path(), "a.txt", "two\n", "c2");
    let c3 = commit(dir.path(), "a.txt", "three\n", "c3");

    let repo = Repo::new(dir.path());
    let graph = CommitGraph::build_partial(&repo, c3, &[c1]).unwrap();

    assert!(graph.contains(c2));
    assert!(graph.contains(c3));
    assert_eq!(graph.get_parents(c2), &[c1]);

    let ordering = graph.reverse_topo_ordering(c3);
    let pos = |o: Oid| ordering.iter().position(|&x| x == o).unwrap();
    assert!(pos(c2) < pos(c3));
}

#[test]
fn merge_commit_orders_both_parents_before_merge() {
    let dir = init_repo();
    let base = commit(dir.path(), "a.txt", "base\n", "base");

    Command::new("git").current_dir(dir.path()).args(["checkout", "-b", "side"]).status().unwrap();
    let side = commit(dir.path(), "b.txt", "side\n", "side");

    Command::new("git").current_dir(dir.path()).args(["checkout", "-"]).status().unwrap();
    let main_tip = commit(dir.path(), "c.txt", "main\n", "main");

    Command::new("git")
        .current_dir(dir.path())
        .args(["merge", "--no-ff", "--no-edit", "side"])
        .status()
        .unwrap();
    let merge_out = Command::new("git")
        .current_dir(dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let merge = Oid::parse(String::from_utf8_lossy(&merge_out.stdout).trim()).unwrap();

    let repo = Repo::new(dir.path());
    let graph = CommitGraph::build_partial(&repo, merge, &[base]).unwrap();

    let ordering = graph.reverse_topo_ordering(merge);
    let pos = |o: Oid| ordering.iter().position(|&x| x == o).unwrap();
    assert!(pos(side) < pos(merge));
    assert!(pos(main_tip) < pos(merge));
}
