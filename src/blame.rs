//! `git blame --porcelain` parser (§4.1.2), grounded in `blame.py`'s
//! `run_blame`/`parse_blame`/`parse_block` state machine.

use crate::errors::{Error, Result};
use crate::indexed_range::IndexedRange;
use crate::oid::Oid;
use crate::vcs::Repo;

/// One coalesced attribution: a range in the revision under inspection
/// mapped to the range of the commit that introduced it.
#[derive(Debug, Clone)]
pub struct BlameMapping {
    pub source: IndexedRange,
    pub queried: IndexedRange,
}

/// Blame `[start, start+extent)` of `file` at `rev`, restricted to
/// history reachable from `rev` but not from `root` (when given). Returns
/// `[]` for a zero-extent range (a pure insertion has nothing to blame).
pub fn run_blame(
    repo: &Repo,
    rev: Oid,
    root: Option<Oid>,
    file: &[u8],
    start: usize,
    extent: usize,
) -> Result<Vec<BlameMapping>> {
    if extent == 0 {
        return Ok(Vec::new());
    }

    let revision_range = match root {
        Some(root) => format!("{root}..{rev}"),
        None => rev.to_hex(),
    };
    let range_flag = format!("-L{start},+{extent}");
    let file_text = String::from_utf8_lossy(file).into_owned();

    let output = repo.run(&[
        "blame",
        "--porcelain",
        &range_flag,
        &revision_range,
        "--",
        &file_text,
    ])?;

    parse_blame(&output, rev, file, root.is_none())
}

#[derive(Debug, Clone)]
struct RawEntry {
    source_rev: Oid,
    is_boundary: bool,
    filename: Vec<u8>,
    source_line: usize,
    result_line: usize,
    starts_seq: bool,
}

/// Parse one full porcelain stream into coalesced `BlameMapping`s.
fn parse_blame(output: &[u8], rev: Oid, file: &[u8], include_boundary: bool) -> Result<Vec<BlameMapping>> {
    let entries = get_blame_transforms(output, include_boundary)?;

    let mut mappings: Vec<BlameMapping> = Vec::new();
    for entry in entries {
        if let Some(last) = mappings.last_mut() {
            let same_file = last.source.file == entry.filename;
            let contiguous_source =
                last.source.start + last.source.extent == entry.source_line;
            let contiguous_result =
                last.queried.start + last.queried.extent == entry.result_line;

            if !entry.starts_seq && same_file && contiguous_source && contiguous_result {
                last.source.extent += 1;
                last.queried.extent += 1;
                continue;
            }
        }

        mappings.push(BlameMapping {
            source: IndexedRange::new(entry.source_rev, entry.filename, entry.source_line, 1),
            queried: IndexedRange::new(rev, file.to_vec(), entry.result_line, 1),
        });
    }

    Ok(mappings)
}

#[derive(Debug, Clone, Default)]
struct CommitProperties {
    filename: Option<Vec<u8>>,
    is_boundary: bool,
}

/// Walk the porcelain stream, emitting one `RawEntry` per attributed
/// line. Lines attributed to the all-zero sentinel OID (working tree or
/// stage) are dropped, matching `get_blame_transforms`' `continue`.
fn get_blame_transforms(output: &[u8], include_boundary: bool) -> Result<Vec<RawEntry>> {
    let lines: Vec<&[u8]> = output.split(|&b| b == b'\n').collect();
    let mut commit_properties: std::collections::HashMap<Oid, CommitProperties> =
        std::collections::HashMap::new();
    let mut out = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() {
            i += 1;
            continue;
        }

        let header = as_header(line).ok_or_else(|| Error::MalformedBlame {
            message: format!("unparsable blame header: {:?}", String::from_utf8_lossy(line)),
        })?;

        let props = commit_properties.entry(header.oid).or_default();
        let has_prior_properties = props.filename.is_some();
        let mut filename = props.filename.clone();
        let mut is_boundary = props.is_boundary;

        i += 1;
        loop {
            if i >= lines.len() {
                return Err(Error::MalformedBlame {
                    message: "blame block truncated".to_string(),
                });
            }
            let meta_line = lines[i];
            if meta_line.starts_with(b"\t") {
                break;
            }
            if meta_line == b"boundary" {
                if has_prior_properties {
                    return Err(Error::MalformedBlame {
                        message: "boundary marker after first occurrence".to_string(),
                    });
                }
                is_boundary = true;
            } else if let Some(name) = as_filename(meta_line) {
                if has_prior_properties {
                    return Err(Error::MalformedBlame {
                        message: "filename repeated after first occurrence".to_string(),
                    });
                }
                filename = Some(name);
            }
            i += 1;
        }

        let filename = filename.ok_or_else(|| Error::MalformedBlame {
            message: "blame entry missing filename on first occurrence".to_string(),
        })?;

        props.filename = Some(filename.clone());
        props.is_boundary = is_boundary;

        i += 1; // consume the \t-prefixed content line

        if header.oid.is_zero() {
            continue;
        }
        if is_boundary && !include_boundary {
            continue;
        }

        out.push(RawEntry {
            source_rev: header.oid,
            is_boundary,
            filename,
            source_line: header.source_line,
            result_line: header.result_line,
            starts_seq: header.starts_seq,
        });
    }

    Ok(out)
}

struct Header {
    oid: Oid,
    source_line: usize,
    result_line: usize,
    starts_seq: bool,
}

/// Parse a header line: `<hex> <source-line> <result-line>[ <count>]`.
fn as_header(line: &[u8]) -> Option<Header> {
    let text = std::str::from_utf8(line).ok()?;
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    if parts[0].len() != 40 || !parts[0].bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let oid = Oid::parse(parts[0]).ok()?;
    let source_line: usize = parts[1].parse().ok()?;
    let result_line: usize = parts[2].parse().ok()?;
    if parts.len() == 4 && !is_int(parts[3]) {
        return None;
    }

    Some(Header {
        oid,
        source_line,
        result_line,
        starts_seq: parts.len() == 4,
    })
}

fn as_filename(line: &[u8]) -> Option<Vec<u8>> {
    line.strip_prefix(b"filename ").map(|rest| rest.to_vec())
}

fn is_int(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
#[path = "blame_test.rs"]
mod tests;
