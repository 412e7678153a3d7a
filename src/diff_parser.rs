//! Unified-diff parser (§4.1).
//!
//! Operates on raw bytes, not `str`: diff lines can carry arbitrary file
//! content, and a stray carriage return can land mid-line, so splitting is
//! done on `\n` only (never `splitlines()`-style heuristics).

use crate::errors::{context_window, Error, Result};

/// One line's role within a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    Add,
    Remove,
    Context,
}

impl DiffLineType {
    fn from_prefix(byte: u8) -> Option<DiffLineType> {
        match byte {
            b'+' => Some(DiffLineType::Add),
            b'-' => Some(DiffLineType::Remove),
            b' ' => Some(DiffLineType::Context),
            _ => None,
        }
    }
}

/// One line of hunk content: its role plus the raw bytes (newline-
/// terminated unless a trailing "no newline" marker stripped it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub line_type: DiffLineType,
    pub bytes: Vec<u8>,
}

/// A contiguous edit block taken from one `@@ ... @@` section of a diff.
#[derive(Debug, Clone)]
pub struct Hunk {
    pub old_file: Option<Vec<u8>>,
    pub new_file: Option<Vec<u8>>,
    pub old_start: usize,
    pub new_start: usize,
    pub ops: Vec<Op>,
}

/// One atomic edit within a hunk: a contiguous run of non-context ops,
/// described as the (old, new) line ranges it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLineMapping {
    pub old_start: usize,
    pub old_extent: usize,
    pub new_start: usize,
    pub new_extent: usize,
}

impl Hunk {
    /// The old-side line range spanned by every non-`Add` op, i.e. the
    /// range of lines in the pre-image this hunk touches.
    pub fn old_extent(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.line_type != DiffLineType::Add)
            .count()
    }

    /// Concatenate the content of new-side lines `[start, start+extent)`
    /// (1-based). Each op already carries its own line terminator
    /// (possibly stripped by a "no newline" marker).
    pub fn new_range_content(&self, start: usize, extent: usize) -> Vec<u8> {
        if extent == 0 {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut lineno = self.new_start;
        for op in &self.ops {
            if op.line_type == DiffLineType::Remove {
                continue;
            }
            if lineno >= start && lineno < start + extent {
                out.extend_from_slice(&op.bytes);
            }
            lineno += 1;
        }
        out
    }

    /// Group consecutive non-context ops between context boundaries into
    /// atomic `FileLineMapping`s. Pure-context runs produce no mapping.
    pub fn map_lines(&self) -> Vec<FileLineMapping> {
        let mut mappings = Vec::new();
        let mut run: Option<FileLineMapping> = None;

        let mut old_line = self.old_start;
        let mut new_line = self.new_start;

        for op in &self.ops {
            match op.line_type {
                DiffLineType::Context => {
                    if let Some(m) = run.take() {
                        mappings.push(m);
                    }
                    old_line += 1;
                    new_line += 1;
                }
                DiffLineType::Remove => {
                    let m = run.get_or_insert(FileLineMapping {
                        old_start: old_line,
                        old_extent: 0,
                        new_start: new_line,
                        new_extent: 0,
                    });
                    m.old_extent += 1;
                    old_line += 1;
                }
                DiffLineType::Add => {
                    let m = run.get_or_insert(FileLineMapping {
                        old_start: old_line,
                        old_extent: 0,
                        new_start: new_line,
                        new_extent: 0,
                    });
                    m.new_extent += 1;
                    new_line += 1;
                }
            }
        }
        if let Some(m) = run.take() {
            mappings.push(m);
        }

        mappings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Initial,
    DiffHeader,
    InHunk,
    Invalid,
}

#[derive(Debug, Clone, Default)]
struct HeaderAttrs {
    old_file: Option<Vec<u8>>,
    old_file_seen: bool,
    new_file: Option<Vec<u8>>,
    new_file_seen: bool,
}

/// Parse a full unified-diff byte stream into a sequence of hunks.
pub fn parse_diff_hunks(diff: &[u8]) -> Result<Vec<Hunk>> {
    let lines: Vec<&[u8]> = diff.split(|&b| b == b'\n').collect();

    let mut state = State::Initial;
    let mut header = HeaderAttrs::default();
    let mut hunk: Option<Hunk> = None;
    let mut out = Vec::new();

    for (line_index, line) in lines.iter().enumerate() {
        let next_state = step(&mut state, &mut header, &mut hunk, line, &mut out);

        if next_state == State::Invalid {
            return Err(Error::MalformedDiff {
                message: format!("unexpected diff content at line {}", line_index + 1),
                extended: context_window(&lines, line_index),
            });
        }
        state = next_state;
    }

    match state {
        State::Initial => {
            if lines.iter().any(|l| !l.is_empty()) {
                return Err(Error::MalformedDiff {
                    message: "unable to locate diff content".to_string(),
                    extended: context_window(&lines, 0),
                });
            }
        }
        State::InHunk => {
            if let Some(h) = hunk.take() {
                out.push(h);
            }
        }
        _ => {
            return Err(Error::MalformedDiff {
                message: "unexpected end of diff".to_string(),
                extended: context_window(&lines, lines.len()),
            });
        }
    }

    Ok(out)
}

/// Drive one line through the state machine, mutating `header`/`hunk` in
/// place and pushing completed hunks onto `out`. Returns the next state.
fn step(
    state: &mut State,
    header: &mut HeaderAttrs,
    hunk: &mut Option<Hunk>,
    line: &[u8],
    out: &mut Vec<Hunk>,
) -> State {
    match state {
        State::Initial => {
            if is_diff_header(line) {
                *header = HeaderAttrs::default();
                State::DiffHeader
            } else {
                State::Initial
            }
        }
        State::DiffHeader => step_diff_header(header, hunk, line),
        State::InHunk => step_in_hunk(header, hunk, line, out),
        State::Invalid => State::Invalid,
    }
}

fn is_diff_header(line: &[u8]) -> bool {
    line.starts_with(b"diff --git a/") && line.windows(3).any(|w| w == b" b/")
}

fn is_binary_marker(line: &[u8]) -> bool {
    line.starts_with(b"Binary files ") && line.ends_with(b" differ")
}

fn is_ignored_header_line(line: &[u8]) -> bool {
    line.starts_with(b"index ")
        || line.starts_with(b"similarity index ")
        || line.starts_with(b"rename ")
        || line.starts_with(b"deleted file")
        || line.starts_with(b"new file")
        || line.starts_with(b"old mode ")
        || line.starts_with(b"new mode ")
}

fn step_diff_header(header: &mut HeaderAttrs, hunk: &mut Option<Hunk>, line: &[u8]) -> State {
    if is_ignored_header_line(line) {
        return State::DiffHeader;
    }

    if is_diff_header(line) || is_binary_marker(line) {
        *header = HeaderAttrs::default();
        return State::DiffHeader;
    }

    if let Some(rest) = line.strip_prefix(b"--- ") {
        if header.old_file_seen {
            return State::Invalid;
        }
        header.old_file = parse_old_new_path(rest, b"a/");
        header.old_file_seen = true;
        return State::DiffHeader;
    }

    if let Some(rest) = line.strip_prefix(b"+++ ") {
        if header.new_file_seen {
            return State::Invalid;
        }
        header.new_file = parse_old_new_path(rest, b"b/");
        header.new_file_seen = true;
        return State::DiffHeader;
    }

    if let Some((old_start, new_start)) = parse_hunk_header(line) {
        if !(header.old_file_seen && header.new_file_seen) {
            return State::Invalid;
        }
        *hunk = Some(Hunk {
            old_file: header.old_file.clone(),
            new_file: header.new_file.clone(),
            old_start,
            new_start,
            ops: Vec::new(),
        });
        return State::InHunk;
    }

    State::Invalid
}

fn parse_old_new_path(rest: &[u8], prefix: &[u8]) -> Option<Vec<u8>> {
    if rest == b"/dev/null" {
        None
    } else if let Some(path) = rest.strip_prefix(prefix) {
        Some(path.to_vec())
    } else {
        Some(rest.to_vec())
    }
}

fn parse_hunk_header(line: &[u8]) -> Option<(usize, usize)> {
    let rest = line.strip_prefix(b"@@ -")?;
    let end_at = rest.iter().position(|&b| b == b' ')?;
    let old_start = parse_leading_int(&rest[..end_at])?;

    let rest2 = rest[end_at + 1..].strip_prefix(b"+")?;
    let end_at2 = rest2.iter().position(|&b| b == b' ')?;
    let new_start = parse_leading_int(&rest2[..end_at2])?;

    if !rest2[end_at2..].starts_with(b" @@") {
        return None;
    }

    Some((old_start, new_start))
}

fn parse_leading_int(bytes: &[u8]) -> Option<usize> {
    let comma_at = bytes.iter().position(|&b| b == b',').unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..comma_at]).ok()?.parse().ok()
}

fn step_in_hunk(
    header: &mut HeaderAttrs,
    hunk: &mut Option<Hunk>,
    line: &[u8],
    out: &mut Vec<Hunk>,
) -> State {
    if is_diff_header(line) {
        if let Some(h) = hunk.take() {
            out.push(h);
        }
        *header = HeaderAttrs::default();
        return State::DiffHeader;
    }

    if let Some((old_start, new_start)) = parse_hunk_header(line) {
        if let Some(h) = hunk.take() {
            out.push(h);
        }
        *hunk = Some(Hunk {
            old_file: header.old_file.clone(),
            new_file: header.new_file.clone(),
            old_start,
            new_start,
            ops: Vec::new(),
        });
        return State::InHunk;
    }

    let h = match hunk.as_mut() {
        Some(h) => h,
        None => return State::Invalid,
    };

    if line.is_empty() {
        // Tolerated blank context line (seen occasionally from git): an
        // entirely empty context line with no leading space byte at all.
        h.ops.push(Op { line_type: DiffLineType::Context, bytes: b"\n".to_vec() });
        return State::InHunk;
    }

    if line == b"\\ No newline at end of file" {
        return match h.ops.last_mut() {
            Some(last) if last.bytes.ends_with(b"\n") => {
                last.bytes.pop();
                State::InHunk
            }
            _ => State::Invalid,
        };
    }

    let (prefix, remainder) = line.split_at(1);
    let line_type = match DiffLineType::from_prefix(prefix[0]) {
        Some(t) => t,
        None => return State::Invalid,
    };

    let mut bytes = remainder.to_vec();
    bytes.push(b'\n');
    h.ops.push(Op { line_type, bytes });

    State::InHunk
}

#[cfg(test)]
#[path = "diff_parser_test.rs"]
mod tests;
