//! Rewriting a branch to realize an `AmendmentPlan` (§4.4), grounded in
//! `AmendedBranchBuilder` from `amend.py`. Walks the partial commit graph
//! in reverse-topological order, rewriting each commit's tree from
//! whichever of its own amendments and its parents' propagated
//! amendments apply, then asks the backend to materialize blobs and
//! commits asynchronously.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::amend::{AmendedBlob, AmendmentPlan};
use crate::backend::{Backend, CommitMetadata, ParentRewrite, RewriteHandle};
use crate::errors::{Error, Result};
use crate::oid::Oid;
use crate::tree_diff::parse_diff_tree_summary;
use crate::vcs::Repo;

/// A commit already scheduled with the backend: its handle, and the
/// amended blobs it carries (so descendants can propagate them further
/// without re-deriving anything).
struct RewrittenCommit {
    handle: RewriteHandle,
    amended_blobs: HashMap<Vec<u8>, AmendedBlob<()>>,
}

pub struct AmendedBranchBuilder<'a> {
    repo: &'a Repo,
    backend: &'a Backend,
    graph: crate::commit_graph::CommitGraph,
    rewritten: IndexMap<Oid, RewrittenCommit>,
}

impl<'a> AmendedBranchBuilder<'a> {
    /// Build the partial graph between the plan's root(s) and head, then
    /// apply the plan, returning the new head OID once every rewrite
    /// handle has resolved.
    pub async fn write(repo: &'a Repo, backend: &'a Backend, plan: &AmendmentPlan) -> Result<Oid> {
        let roots: Vec<Oid> = plan.root.into_iter().collect();
        let graph = crate::commit_graph::CommitGraph::build_partial(repo, plan.head, &roots)?;

        let mut builder = AmendedBranchBuilder {
            repo,
            backend,
            graph,
            rewritten: IndexMap::new(),
        };
        builder.apply(plan).await
    }

    async fn apply(&mut self, plan: &AmendmentPlan) -> Result<Oid> {
        let grouped = plan.amendments_by_commit();
        let ordering = self.graph.reverse_topo_ordering(plan.head);

        for commit in ordering {
            let own: HashMap<Vec<u8>, AmendedBlob<()>> = grouped
                .get(&commit)
                .map(|blobs| blobs.iter().map(|b| (b.file.clone(), (*b).clone())).collect())
                .unwrap_or_default();

            self.start_commit_rewrite(commit, own).await?;
        }

        let head_rewrite = self
            .rewritten
            .get(&plan.head)
            .expect("head is always part of its own graph")
            .handle;
        self.backend.resolve_handle(head_rewrite).await
    }

    async fn start_commit_rewrite(
        &mut self,
        commit: Oid,
        own_amendments: HashMap<Vec<u8>, AmendedBlob<()>>,
    ) -> Result<()> {
        let parents = self.graph.get_parents(commit).to_vec();
        let parent_amendments = self.get_parent_amendments(commit, &parents);

        let coalesced = self.coalesce_amended_blobs(commit, own_amendments, &parent_amendments)?;

        let metadata = self.read_commit_metadata(commit)?;

        let mut blobs = Vec::new();
        let mut unchanged = Vec::new();
        for (path, blob) in coalesced.iter() {
            if blob.amendments.is_empty() {
                unchanged.push((path.clone(), blob.oid));
            } else {
                blobs.push((path.clone(), blob.clone()));
            }
        }

        let parent_refs: Vec<ParentRewrite> = parents
            .iter()
            .map(|&p| match self.rewritten.get(&p) {
                Some(r) => ParentRewrite::Pending(r.handle),
                None => ParentRewrite::Resolved(p),
            })
            .collect();

        let handle = self
            .backend
            .request_commit_rewrite(commit, blobs, unchanged, parent_refs, metadata)
            .await;

        self.rewritten.insert(
            commit,
            RewrittenCommit {
                handle,
                amended_blobs: coalesced,
            },
        );
        Ok(())
    }

    /// For each parent already rewritten, its handle plus a
    /// `path -> (parent_oid, amended_blob)` map describing what that
    /// parent still carries unwritten at this path.
    fn get_parent_amendments(
        &self,
        _commit: Oid,
        parents: &[Oid],
    ) -> Vec<(Oid, &HashMap<Vec<u8>, AmendedBlob<()>>)> {
        parents
            .iter()
            .filter_map(|&p| self.rewritten.get(&p).map(|r| (p, &r.amended_blobs)))
            .collect()
    }

    /// Merge a commit's own amendments with every parent's propagated
    /// amendments. A path touched only by this commit, or only by a
    /// single parent with nothing new here, can be reused directly. A
    /// path touched by both this commit and a parent needs full
    /// reconciliation against the diff between them.
    fn coalesce_amended_blobs(
        &self,
        commit: Oid,
        own: HashMap<Vec<u8>, AmendedBlob<()>>,
        parent_amendments: &[(Oid, &HashMap<Vec<u8>, AmendedBlob<()>>)],
    ) -> Result<HashMap<Vec<u8>, AmendedBlob<()>>> {
        let mut coalesced: HashMap<Vec<u8>, AmendedBlob<()>> = HashMap::new();

        let parent_paths: std::collections::HashSet<Vec<u8>> = parent_amendments
            .iter()
            .flat_map(|(_, blobs)| blobs.keys().cloned())
            .collect();

        let mut need_full_reconcile: std::collections::HashSet<Vec<u8>> =
            own.keys().filter(|p| parent_paths.contains(*p)).cloned().collect();

        for (path, blob) in &own {
            if !need_full_reconcile.contains(path) {
                coalesced.insert(path.clone(), blob.clone());
            }
        }

        // Paths touched only by a parent: try a fast-forward reuse; any
        // path that fails (deleted here, or no parent blob OID matches
        // the current tree) escalates to full diff reconciliation, per
        // the coalescing algorithm's step 3.
        let parent_only: Vec<Vec<u8>> =
            parent_paths.iter().filter(|p| !need_full_reconcile.contains(*p)).cloned().collect();

        for path in &parent_only {
            match self.try_fast_forward_reuse(commit, path, parent_amendments)? {
                Some(blob) => {
                    coalesced.insert(path.clone(), blob);
                }
                None => {
                    need_full_reconcile.insert(path.clone());
                }
            }
        }

        if !need_full_reconcile.is_empty() {
            let needed: Vec<Vec<u8>> = need_full_reconcile.into_iter().collect();
            let reconciled = self.handle_parent_changes_with_diff(commit, &own, parent_amendments, &needed)?;
            for (path, blob) in reconciled {
                coalesced.insert(path, blob);
            }
        }

        Ok(coalesced)
    }

    /// A path amended only by a parent (never touched by this commit's
    /// own diff) can reuse the parent's amended blob verbatim if this
    /// commit's pre-rewrite tree still matches the parent's pre-rewrite
    /// blob OID at that path — i.e. the path was fast-forwarded here
    /// unmodified. Returns `None` (the caller must escalate to full
    /// reconciliation) when the path is absent from this commit's tree
    /// or no parent's amended OID matches what's there.
    fn try_fast_forward_reuse(
        &self,
        commit: Oid,
        path: &[u8],
        parent_amendments: &[(Oid, &HashMap<Vec<u8>, AmendedBlob<()>>)],
    ) -> Result<Option<AmendedBlob<()>>> {
        let commit_hex = commit.to_hex();
        let spec = format!("{}:{}", commit_hex, String::from_utf8_lossy(path));
        let current_oid = match self.repo.run(&["rev-parse", "--verify", &spec]) {
            Ok(bytes) => Oid::parse(String::from_utf8_lossy(&bytes).trim()).ok(),
            Err(_) => None,
        };

        let Some(current_oid) = current_oid else {
            return Ok(None);
        };

        for (_, blobs) in parent_amendments {
            if let Some(parent_blob) = blobs.get(path) {
                if parent_blob.oid == current_oid {
                    return Ok(Some(parent_blob.with_meta(commit, path.to_vec(), parent_blob.oid, ())));
                }
            }
        }

        Ok(None)
    }

    /// For every path touched by both this commit and a parent, diff
    /// this commit against that parent and project the parent's
    /// amendments through the diff's line mappings onto this commit's
    /// blob, merging the result with this commit's own amendments.
    fn handle_parent_changes_with_diff(
        &self,
        commit: Oid,
        own: &HashMap<Vec<u8>, AmendedBlob<()>>,
        parent_amendments: &[(Oid, &HashMap<Vec<u8>, AmendedBlob<()>>)],
        needed_paths: &[Vec<u8>],
    ) -> Result<HashMap<Vec<u8>, AmendedBlob<()>>> {
        let mut handled: HashMap<Vec<u8>, AmendedBlob<()>> = HashMap::new();

        for (parent, blobs) in parent_amendments {
            let diffs = self.account_for_diff_against_parent(commit, *parent, needed_paths)?;

            for path in needed_paths {
                let Some(parent_blob) = blobs.get(path) else {
                    continue;
                };

                let diff_hunks = diffs.get(path).cloned().unwrap_or_default();
                let adjusted = parent_blob.adjusted_by_diff(&diff_hunks)?;

                // Start from whatever's already accumulated for this path
                // (this commit's own amendments, plus any earlier parent's
                // projected ones) rather than discarding a second parent's
                // contribution to the same path — a merge commit can have
                // two parents each propagating an edit to the same file.
                let mut merged = handled.remove(path).unwrap_or_else(|| {
                    own.get(path).cloned().unwrap_or_else(|| AmendedBlob::new(commit, path.clone(), parent_blob.oid))
                });
                for record in adjusted {
                    merged.replace_lines(record)?;
                }
                handled.insert(path.clone(), merged);
            }
        }

        for path in needed_paths {
            if !handled.contains_key(path) {
                return Err(Error::UnreconciledPath {
                    commit: commit.to_hex(),
                    path: String::from_utf8_lossy(path).into_owned(),
                });
            }
        }

        Ok(handled)
    }

    /// Run `diff-tree` between `parent` and `commit`, then for every
    /// changed path whose *old* (parent-side) name is one we still need
    /// to reconcile, fetch the unified diff hunks between the parent's
    /// and this commit's version of the file. A path that was deleted by
    /// `commit` relative to `parent` — `new_path` absent — can't have its
    /// pending amendments re-based anywhere, which is a fatal condition:
    /// the caller needed to project that amendment forward but nowhere
    /// left in this commit's tree to project it onto.
    fn account_for_diff_against_parent(
        &self,
        commit: Oid,
        parent: Oid,
        needed_paths: &[Vec<u8>],
    ) -> Result<HashMap<Vec<u8>, Vec<crate::diff_parser::Hunk>>> {
        let commit_hex = commit.to_hex();
        let parent_hex = parent.to_hex();
        let raw = self.repo.run(&[
            "diff-tree",
            "--no-commit-id",
            "--find-renames",
            "-r",
            &parent_hex,
            &commit_hex,
        ])?;
        let summary = parse_diff_tree_summary(&raw)?;

        let mut out = HashMap::new();
        for entry in summary {
            let Some(old_path) = &entry.old_path else {
                continue;
            };
            if !needed_paths.iter().any(|p| p == old_path) {
                continue;
            }

            let Some(new_path) = &entry.new_path else {
                return Err(Error::UnexpectedRewriteDiffEntry {
                    commit: commit_hex.clone(),
                    parent: parent_hex.clone(),
                    path: String::from_utf8_lossy(old_path).into_owned(),
                });
            };

            let old_spec = format!("{}:{}", parent_hex, String::from_utf8_lossy(old_path));
            let new_spec = format!("{}:{}", commit_hex, String::from_utf8_lossy(new_path));
            let diff = self.repo.run(&[
                "diff",
                "--no-indent-heuristic",
                "--unified=0",
                &old_spec,
                &new_spec,
            ])?;
            let hunks = crate::diff_parser::parse_diff_hunks(&diff)?;
            out.insert(old_path.clone(), hunks);
        }

        Ok(out)
    }

    fn read_commit_metadata(&self, commit: Oid) -> Result<CommitMetadata> {
        let format = "%an%x00%ae%x00%ad%x00%cn%x00%ce%x00%cd%x00%B";
        let commit_hex = commit.to_hex();
        let out = self.repo.run(&[
            "show",
            "-s",
            &format!("--format={format}"),
            "--date=raw",
            &commit_hex,
        ])?;

        let mut fields = out.splitn(7, |&b| b == 0);
        let mut next = |name: &str| -> Result<Vec<u8>> {
            fields
                .next()
                .map(|f| f.to_vec())
                .ok_or_else(|| Error::MalformedTreeDiff {
                    message: format!("commit metadata missing field {name}"),
                    extended: String::new(),
                })
        };

        let author_name = String::from_utf8_lossy(&next("author name")?).into_owned();
        let author_email = String::from_utf8_lossy(&next("author email")?).into_owned();
        let author_date = String::from_utf8_lossy(&next("author date")?).into_owned();
        let committer_name = String::from_utf8_lossy(&next("committer name")?).into_owned();
        let committer_email = String::from_utf8_lossy(&next("committer email")?).into_owned();
        let committer_date = String::from_utf8_lossy(&next("committer date")?).into_owned();
        let message = next("message")?;

        Ok(CommitMetadata {
            author_name,
            author_email,
            author_date: author_date.trim().to_string(),
            committer_name,
            committer_email,
            committer_date: committer_date.trim().to_string(),
            message,
        })
    }
}

#[cfg(test)]
#[path = "rebuild_test.rs"]
mod tests;
