//! Parser for `git diff-tree --raw` / `git diff --raw` summary lines
//! (§4.1.1), grounded in `parse_diff_tree_summary` from the original
//! implementation.

use crate::errors::{context_window, Error, Result};
use crate::oid::Oid;

/// The kind of change a tree-diff raw line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaType {
    Added,
    Modified,
    Deleted,
    Copied,
    Renamed,
    TypeChanged,
}

impl DeltaType {
    fn from_byte(byte: u8) -> Option<DeltaType> {
        match byte {
            b'A' => Some(DeltaType::Added),
            b'M' => Some(DeltaType::Modified),
            b'D' => Some(DeltaType::Deleted),
            b'C' => Some(DeltaType::Copied),
            b'R' => Some(DeltaType::Renamed),
            b'T' => Some(DeltaType::TypeChanged),
            _ => None,
        }
    }
}

/// One line of `diff-tree --raw` output, fully parsed. Per §3: for adds
/// `old_path` is null, for deletes `new_path` is null; renames/copies
/// carry both (possibly differing) paths, everything else carries the
/// same path on both sides.
#[derive(Debug, Clone)]
pub struct FileDiffSummary {
    pub old_mode: String,
    pub new_mode: String,
    pub old_oid: Oid,
    pub new_oid: Oid,
    pub delta_type: DeltaType,
    pub similarity: Option<u8>,
    pub old_path: Option<Vec<u8>>,
    pub new_path: Option<Vec<u8>>,
}

/// Parse every `:...` raw line in `summary`. Blank lines between entries
/// are skipped; anything else is a malformed-input error.
pub fn parse_diff_tree_summary(summary: &[u8]) -> Result<Vec<FileDiffSummary>> {
    let lines: Vec<&[u8]> = summary.split(|&b| b == b'\n').collect();
    let mut out = Vec::new();

    for (line_index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let entry = parse_line(line).ok_or_else(|| Error::MalformedTreeDiff {
            message: format!("unparsable diff-tree entry at line {}", line_index + 1),
            extended: context_window(&lines, line_index),
        })?;
        out.push(entry);
    }

    Ok(out)
}

fn parse_line(line: &[u8]) -> Option<FileDiffSummary> {
    let rest = line.strip_prefix(b":")?;

    let mut fields = rest.splitn(5, |&b| b == b' ');
    let old_mode = fields.next()?;
    let new_mode = fields.next()?;
    let old_oid = fields.next()?;
    let new_oid = fields.next()?;
    let rest = fields.next()?;

    let (status_field, paths) = split_once(rest, b'\t')?;
    let delta_type = DeltaType::from_byte(*status_field.first()?)?;
    let similarity = if status_field.len() > 1 {
        std::str::from_utf8(&status_field[1..]).ok()?.parse().ok()
    } else {
        None
    };

    let (old_path, new_path) = match delta_type {
        DeltaType::Renamed | DeltaType::Copied => {
            let (old, new) = split_once(paths, b'\t')?;
            (Some(old.to_vec()), Some(new.to_vec()))
        }
        DeltaType::Added => (None, Some(paths.to_vec())),
        DeltaType::Deleted => (Some(paths.to_vec()), None),
        _ => (Some(paths.to_vec()), Some(paths.to_vec())),
    };

    Some(FileDiffSummary {
        old_mode: String::from_utf8(old_mode.to_vec()).ok()?,
        new_mode: String::from_utf8(new_mode.to_vec()).ok()?,
        old_oid: Oid::parse(std::str::from_utf8(old_oid).ok()?).ok()?,
        new_oid: Oid::parse(std::str::from_utf8(new_oid).ok()?).ok()?,
        delta_type,
        similarity,
        old_path,
        new_path,
    })
}

fn split_once(bytes: &[u8], sep: u8) -> Option<(&[u8], &[u8])> {
    let at = bytes.iter().position(|&b| b == sep)?;
    Some((&bytes[..at], &bytes[at + 1..]))
}

#[cfg(test)]
#[path = "tree_diff_test.rs"]
mod tests;
