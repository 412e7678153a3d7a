//! The fatal error type shared by every core module.
//!
//! Mirrors `git_fold.errors.Fatal`: a single error carries a short
//! headline message, the process exit code to propagate (defaulting to 1,
//! but set to the child's own return code for subprocess failures), and an
//! optional "extended" block (subprocess stderr, or a parse context
//! window) printed after a blank line by the CLI.

use std::fmt;

/// Every fatal condition the core can raise.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// `rev-parse --verify` failed to resolve a user-supplied revision.
    #[error("invalid revision {revision:?}")]
    InvalidRevision {
        revision: String,
        returncode: i32,
        extended: Option<String>,
    },

    /// A VCS subprocess exited non-zero.
    #[error("failed to execute `{command}`")]
    Subprocess {
        command: String,
        returncode: i32,
        extended: Option<String>,
    },

    /// The unified-diff parser hit malformed input.
    #[error("{message}")]
    MalformedDiff { message: String, extended: String },

    /// The tree-diff summary parser hit malformed input.
    #[error("{message}")]
    MalformedTreeDiff { message: String, extended: String },

    /// The blame-porcelain parser hit malformed input.
    #[error("{message}")]
    MalformedBlame { message: String },

    /// Two amendments targeting the same blob overlap.
    #[error("overlapping amendments requested")]
    OverlappingAmendments,

    /// Re-basing an amendment through a diff found the amendment's range
    /// overlapping a hunk's delta.
    #[error("amendment overlaps diff delta")]
    AmendmentOverlapsDelta,

    /// Diff reconciliation hit a diff entry it cannot project an
    /// amendment through (an add with no prior path).
    #[error(
        "unexpected diff entry during rewrite at {commit}, looking at parent {parent}, diffing {path}"
    )]
    UnexpectedRewriteDiffEntry {
        commit: String,
        parent: String,
        path: String,
    },

    /// Every `need_full_reconcile` path must be accounted for by some
    /// parent's diff; this fires the internal assertion otherwise.
    #[error("path {path} at commit {commit} was not reconciled against any parent")]
    UnreconciledPath { commit: String, path: String },
}

impl Error {
    /// The process exit code this error should propagate, per §7: fatal
    /// conditions default to 1 except subprocess/revision failures, which
    /// surface the child's own return code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidRevision { returncode, .. } => *returncode,
            Error::Subprocess { returncode, .. } => *returncode,
            _ => 1,
        }
    }

    /// The extended diagnostic block, if any, printed after a blank line.
    pub fn extended(&self) -> Option<&str> {
        match self {
            Error::InvalidRevision { extended, .. } => extended.as_deref(),
            Error::Subprocess { extended, .. } => extended.as_deref(),
            Error::MalformedDiff { extended, .. } => Some(extended),
            Error::MalformedTreeDiff { extended, .. } => Some(extended),
            _ => None,
        }
    }

    /// True if this subprocess failure is just the child observing the
    /// same keyboard interrupt as us (`128 + signal`). The CLI suppresses
    /// the generic "subprocess failed" message in that case.
    pub fn is_suppressed_interrupt(&self) -> bool {
        matches!(self, Error::Subprocess { returncode, .. } if *returncode > 128)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Build a 10-line context window (5 before, 5 after) around a line index,
/// for diagnostics on malformed diff/tree-diff input. `lines` are 0-indexed;
/// `line_index` is the 0-indexed line the error was detected at.
pub fn context_window(lines: &[impl AsRef<[u8]>], line_index: usize) -> String {
    let start = line_index.saturating_sub(5);
    let end = (line_index + 5).min(lines.len());
    let padding = (line_index + 5).to_string().len().max(3);

    let mut out = String::new();
    for (i, line) in lines[start..end].iter().enumerate() {
        let lineno = start + i + 1;
        let text = String::from_utf8_lossy(line.as_ref());
        use fmt::Write as _;
        let _ = writeln!(out, "{:<width$} {}", lineno, text, width = padding);
    }
    out.trim_end_matches('\n').to_string()
}
