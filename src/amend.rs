//! Amendment planning (§4.3): mapping staged hunks onto the historical
//! commits/blobs whose lines they edit, and accumulating those edits
//! into a plan ready for rewriting. Grounded in `AmendmentPlan`,
//! `AmendedBlob`, and `add_hunk_to_plan` from `amend.py`/`__init__.py`.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::blame::{run_blame, BlameMapping};
use crate::diff_parser::Hunk;
use crate::errors::{Error, Result};
use crate::oid::Oid;
use crate::vcs::Repo;

/// A single replacement: swap `[start, start+extent)` of the blob's
/// lines (1-based) for `replacement`'s bytes.
#[derive(Debug, Clone)]
pub struct AmendmentRecord {
    pub start: usize,
    pub extent: usize,
    pub replacement: Vec<u8>,
}

/// A blob at `commit`/`file` carrying a sorted, non-overlapping set of
/// pending line replacements. `D` tracks the blob's place in the
/// rewrite lifecycle: `()` while only planned, `RewriteHandle` once a
/// rewrite has been scheduled with the backend, `Oid` once written.
#[derive(Debug, Clone)]
pub struct AmendedBlob<D> {
    pub commit: Oid,
    pub file: Vec<u8>,
    pub oid: Oid,
    pub amendments: Vec<AmendmentRecord>,
    pub rewrite_data: D,
}

impl AmendedBlob<()> {
    pub fn new(commit: Oid, file: impl Into<Vec<u8>>, oid: Oid) -> AmendedBlob<()> {
        AmendedBlob {
            commit,
            file: file.into(),
            oid,
            amendments: Vec::new(),
            rewrite_data: (),
        }
    }
}

impl<D: Clone> AmendedBlob<D> {
    /// Insert `record` in sorted position, rejecting anything that
    /// overlaps an already-recorded amendment.
    pub fn replace_lines(&mut self, record: AmendmentRecord) -> Result<()> {
        let insert_at = self
            .amendments
            .partition_point(|existing| existing.start < record.start);

        if let Some(prev) = insert_at.checked_sub(1).and_then(|i| self.amendments.get(i)) {
            if prev.start + prev.extent > record.start {
                return Err(Error::OverlappingAmendments);
            }
        }
        if let Some(next) = self.amendments.get(insert_at) {
            if record.start + record.extent > next.start {
                return Err(Error::OverlappingAmendments);
            }
        }

        self.amendments.insert(insert_at, record);
        Ok(())
    }

    /// Merge another blob's amendments into this one (used to combine a
    /// commit's own edits with amendments propagated from a parent along
    /// a fast-forwarded, unchanged path).
    pub fn with_merged_amendments(mut self, other: &AmendedBlob<D>) -> Result<AmendedBlob<D>> {
        for record in &other.amendments {
            self.replace_lines(record.clone())?;
        }
        Ok(self)
    }

    pub fn with_meta<D2>(&self, commit: Oid, file: impl Into<Vec<u8>>, oid: Oid, rewrite_data: D2) -> AmendedBlob<D2> {
        AmendedBlob {
            commit,
            file: file.into(),
            oid,
            amendments: self.amendments.clone(),
            rewrite_data,
        }
    }

    pub fn with_rewrite_data<D2>(&self, rewrite_data: D2) -> AmendedBlob<D2> {
        AmendedBlob {
            commit: self.commit,
            file: self.file.clone(),
            oid: self.oid,
            amendments: self.amendments.clone(),
            rewrite_data,
        }
    }

    /// Re-base this blob's amendments through a diff between the blob's
    /// old pre-image and a parent's version of the file, by merge-walking
    /// the sorted amendment list against the diff's line mappings and
    /// shifting each amendment's `start` by the cumulative extent delta
    /// of every mapping strictly before it. An amendment overlapping a
    /// hunk's delta cannot be re-based unambiguously.
    pub fn adjusted_by_diff(&self, hunks: &[Hunk]) -> Result<Vec<AmendmentRecord>> {
        let mut mappings: Vec<crate::diff_parser::FileLineMapping> =
            hunks.iter().flat_map(|h| h.map_lines()).collect();
        mappings.sort_by_key(|m| m.old_start);

        let mut out = Vec::with_capacity(self.amendments.len());
        let mut shift: i64 = 0;
        let mut mapping_idx = 0;

        for record in &self.amendments {
            while mapping_idx < mappings.len()
                && mappings[mapping_idx].old_start + mappings[mapping_idx].old_extent <= record.start
            {
                let m = mappings[mapping_idx];
                shift += m.new_extent as i64 - m.old_extent as i64;
                mapping_idx += 1;
            }

            if mapping_idx < mappings.len() {
                let m = mappings[mapping_idx];
                let record_end = record.start + record.extent;
                let mapping_end = m.old_start + m.old_extent;
                let overlaps = record.start < mapping_end && record_end > m.old_start;
                if overlaps {
                    return Err(Error::AmendmentOverlapsDelta);
                }
            }

            let new_start = (record.start as i64 + shift) as usize;
            out.push(AmendmentRecord {
                start: new_start,
                extent: record.extent,
                replacement: record.replacement.clone(),
            });
        }

        Ok(out)
    }
}

/// Key for a blob touched during the plan: the commit/path pair it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlobKey {
    commit: Oid,
    file: Vec<u8>,
}

/// Accumulates amendments across commits before any rewrite begins.
/// Keyed by `(commit, file)` so the same blob touched by multiple hunks
/// accumulates all of its amendments before being handed to the backend.
pub struct AmendmentPlan {
    pub head: Oid,
    pub root: Option<Oid>,
    blobs: IndexMap<BlobKey, AmendedBlob<()>>,
}

impl AmendmentPlan {
    pub fn new(head: Oid, root: Option<Oid>) -> AmendmentPlan {
        AmendmentPlan {
            head,
            root,
            blobs: IndexMap::new(),
        }
    }

    pub fn has_amendments(&self) -> bool {
        !self.blobs.is_empty()
    }

    pub fn blobs(&self) -> impl Iterator<Item = &AmendedBlob<()>> {
        self.blobs.values()
    }

    /// Record one replacement against the blob identified by `range`,
    /// resolving (and caching) the blob's pre-rewrite OID on first touch.
    pub fn add_amended_range(
        &mut self,
        repo: &Repo,
        range: &crate::indexed_range::IndexedRange,
        replacement: Vec<u8>,
    ) -> Result<()> {
        let key = BlobKey {
            commit: range.rev,
            file: range.file.clone(),
        };

        if !self.blobs.contains_key(&key) {
            let oid = range.blob_oid(repo)?;
            self.blobs
                .insert(key.clone(), AmendedBlob::new(range.rev, range.file.clone(), oid));
        }

        let blob = self.blobs.get_mut(&key).expect("just inserted");
        blob.replace_lines(AmendmentRecord {
            start: range.start,
            extent: range.extent,
            replacement,
        })
    }

    /// All commits with at least one amended blob, grouped by commit.
    pub fn amendments_by_commit(&self) -> HashMap<Oid, Vec<&AmendedBlob<()>>> {
        let mut grouped: HashMap<Oid, Vec<&AmendedBlob<()>>> = HashMap::new();
        for blob in self.blobs.values() {
            grouped.entry(blob.commit).or_default().push(blob);
        }
        grouped
    }
}

/// For one staged hunk, decompose it into its atomic edits (§4.3: "for
/// each edit `(old_range, new_range)` yielded by a hunk") and attribute
/// each one independently, rather than blaming the hunk's whole old-side
/// span at once — a hunk's context lines separate edits that may belong
/// to entirely different commits, and blaming across all of them at once
/// would spuriously multiply the attributed sources for each individual
/// edit. Grounded in `add_hunk_to_plan`/`Hunk.get_edits`.
pub fn add_hunk_to_plan(
    plan: &mut AmendmentPlan,
    repo: &Repo,
    head: Oid,
    root: Option<Oid>,
    old_file: &[u8],
    hunk: &Hunk,
) -> Result<()> {
    for mapping in hunk.map_lines() {
        add_edit_to_plan(plan, repo, head, root, old_file, hunk, &mapping)?;
    }
    Ok(())
}

/// For one atomic edit within a hunk, blame its old-side range and
/// decide how to amend history:
/// - A pure insertion (no old range) can't be attributed to history —
///   it stays staged, untouched.
/// - Exactly one attributed source: amend that source with this edit's
///   new content (or delete it, if this edit also removed the new side).
/// - Multiple attributed sources: only safe when this edit is a pure
///   deletion (no added lines of its own) — fan the deletion out to
///   every source range. An edit that spans multiple sources and also
///   adds content can't be safely attributed to any single ancestor, so
///   it's skipped.
fn add_edit_to_plan(
    plan: &mut AmendmentPlan,
    repo: &Repo,
    head: Oid,
    root: Option<Oid>,
    old_file: &[u8],
    hunk: &Hunk,
    mapping: &crate::diff_parser::FileLineMapping,
) -> Result<()> {
    if mapping.old_extent == 0 {
        return Ok(());
    }

    let mappings = run_blame(repo, head, root, old_file, mapping.old_start, mapping.old_extent)?;
    if mappings.is_empty() {
        return Ok(());
    }

    if mappings.len() == 1 {
        let BlameMapping { source, .. } = &mappings[0];
        let new_content = hunk.new_range_content(mapping.new_start, mapping.new_extent);
        plan.add_amended_range(repo, source, new_content)
    } else {
        if mapping.new_extent > 0 {
            return Ok(());
        }
        for BlameMapping { source, .. } in &mappings {
            plan.add_amended_range(repo, source, Vec::new())?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "amend_test.rs"]
mod tests;
