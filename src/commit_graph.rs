//! Partial commit graph construction and reverse-topological ordering
//! (§4.2), grounded in `CommitGraph` from the original implementation's
//! `log.py`. We only ever need the parent edges for commits on the path
//! from a root to head, so the graph is built incrementally with
//! `rev-list --ancestry-path`, never a full repository walk.

use std::collections::{HashMap, HashSet};

use crate::errors::{Error, Result};
use crate::oid::Oid;
use crate::vcs::Repo;

/// Parent edges for every commit on the paths from `root`s to `head`.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    child_to_parents: HashMap<Oid, Vec<Oid>>,
}

impl CommitGraph {
    /// Build the graph spanning every ancestry path from each of `roots`
    /// up to (exclusive) `head`, inclusive of `head` itself.
    pub fn build_partial(repo: &Repo, head: Oid, roots: &[Oid]) -> Result<CommitGraph> {
        let mut graph = CommitGraph::default();
        for &root in roots {
            graph.add_path(repo, head, root)?;
        }
        graph.add_commits(repo, &[head])?;
        Ok(graph)
    }

    pub fn contains(&self, oid: Oid) -> bool {
        self.child_to_parents.contains_key(&oid)
    }

    pub fn get_parents(&self, oid: Oid) -> &[Oid] {
        self.child_to_parents
            .get(&oid)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// `rev-list --parents --no-walk <commits> --`: record just the
    /// listed commits' direct parents, without walking further back.
    fn add_commits(&mut self, repo: &Repo, commits: &[Oid]) -> Result<()> {
        if commits.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rev-list".to_string(), "--parents".to_string(), "--no-walk".to_string()];
        args.extend(commits.iter().map(|c| c.to_hex()));
        args.push("--".to_string());
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

        let out = repo.run(&arg_refs)?;
        self.add_from_rev_list_parents(&out)
    }

    /// `rev-list --parents --ancestry-path <head> ^<root> --`: record
    /// every commit (and its parents) strictly between `root` and `head`.
    fn add_path(&mut self, repo: &Repo, head: Oid, root: Oid) -> Result<()> {
        let head_hex = head.to_hex();
        let exclude_root = format!("^{}", root.to_hex());
        let out = repo.run(&[
            "rev-list",
            "--parents",
            "--ancestry-path",
            &head_hex,
            &exclude_root,
            "--",
        ])?;
        self.add_from_rev_list_parents(&out)
    }

    fn add_from_rev_list_parents(&mut self, output: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(output).map_err(|_| Error::MalformedTreeDiff {
            message: "rev-list output was not valid utf-8".to_string(),
            extended: String::new(),
        })?;

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let hexes: Vec<&str> = line.split_whitespace().collect();
            let child = Oid::parse(hexes[0]).map_err(|_| Error::MalformedTreeDiff {
                message: format!("malformed rev-list entry: {line:?}"),
                extended: String::new(),
            })?;
            let mut parents = Vec::with_capacity(hexes.len() - 1);
            for hex in &hexes[1..] {
                parents.push(Oid::parse(hex).map_err(|_| Error::MalformedTreeDiff {
                    message: format!("malformed rev-list entry: {line:?}"),
                    extended: String::new(),
                })?);
            }

            if let Some(existing) = self.child_to_parents.get(&child) {
                if existing != &parents {
                    return Err(Error::MalformedTreeDiff {
                        message: format!("inconsistent parents reported for {child}"),
                        extended: String::new(),
                    });
                }
            } else {
                self.child_to_parents.insert(child, parents);
            }
        }

        Ok(())
    }

    /// Reverse-topological order starting at `head`: every commit
    /// appears after all of its parents. Implemented as an iterative
    /// two-visit-stack DFS to avoid recursion depth proportional to
    /// history length.
    pub fn reverse_topo_ordering(&self, head: Oid) -> Vec<Oid> {
        let mut ordering = Vec::new();
        let mut visited: HashSet<Oid> = HashSet::new();
        let mut stack: Vec<(Oid, bool)> = vec![(head, false)];

        while let Some((commit, has_recursed)) = stack.pop() {
            if has_recursed {
                if visited.insert(commit) {
                    ordering.push(commit);
                }
                continue;
            }

            if visited.contains(&commit) {
                continue;
            }

            stack.push((commit, true));
            for &parent in self.get_parents(commit).iter().rev() {
                if !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }

        ordering
    }
}

#[cfg(test)]
#[path = "commit_graph_test.rs"]
mod tests;
