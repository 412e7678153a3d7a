//! A line range within a file at a specific revision (§4.1.2), grounded
//! in `IndexedRange` from the original implementation's `git.py`. The
//! blob OID backing the range is resolved lazily and cached, since most
//! ranges are only ever compared or blamed, never hashed.

use std::cell::RefCell;

use crate::oid::Oid;
use crate::vcs::Repo;

/// `[start, start+extent)` (1-based, half-open) of `file` as it existed
/// at `rev`.
#[derive(Debug, Clone)]
pub struct IndexedRange {
    pub rev: Oid,
    pub file: Vec<u8>,
    pub start: usize,
    pub extent: usize,
    blob_oid: RefCell<Option<Oid>>,
}

impl IndexedRange {
    pub fn new(rev: Oid, file: impl Into<Vec<u8>>, start: usize, extent: usize) -> IndexedRange {
        IndexedRange {
            rev,
            file: file.into(),
            start,
            extent,
            blob_oid: RefCell::new(None),
        }
    }

    /// `<start>,+<extent>`, the form `git blame -L` and progress output
    /// both expect.
    pub fn formatted_range(&self) -> String {
        format!("{},+{}", self.start, self.extent)
    }

    /// Resolve (and cache) the blob OID this range's file has at `rev`,
    /// via `ls-tree`.
    pub fn blob_oid(&self, repo: &Repo) -> crate::errors::Result<Oid> {
        if let Some(oid) = *self.blob_oid.borrow() {
            return Ok(oid);
        }

        let spec = format!("{}:{}", self.rev, String::from_utf8_lossy(&self.file));
        let out = repo.run(&["rev-parse", "--verify", &spec])?;
        let oid = Oid::parse(String::from_utf8_lossy(&out).trim())
            .map_err(|_| crate::errors::Error::InvalidRevision {
                revision: spec.clone(),
                returncode: 1,
                extended: None,
            })?;
        *self.blob_oid.borrow_mut() = Some(oid);
        Ok(oid)
    }
}

#[cfg(test)]
#[path = "indexed_range_test.rs"]
mod tests;
