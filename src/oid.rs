//! Content-addressed object identifiers.
//!
//! A Git object ID is a 160-bit SHA-1 hash; we never compute one
//! ourselves (the VCS does that), we only parse, compare and display the
//! 40-hex textual form the VCS prints.

use std::fmt;

/// A 160-bit opaque content hash. Value type: cheap to copy, ordered and
/// hashed on its hex bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; 20]);

/// The all-zero OID git prints for the worktree/stage in `blame --porcelain`.
pub const ZERO: Oid = Oid([0; 20]);

#[derive(Debug, thiserror::Error)]
#[error("not a valid object id: {0:?}")]
pub struct ParseOidError(String);

impl Oid {
    /// Parse a 40-character hex string. Shorter (abbreviated) hashes are
    /// not accepted here — every producer in this codebase (`rev-parse
    /// --verify`, `cat-file`, `mktree`, `commit-tree`) emits full IDs.
    pub fn parse(text: &str) -> Result<Oid, ParseOidError> {
        let trimmed = text.trim();
        if trimmed.len() != 40 {
            return Err(ParseOidError(text.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(trimmed, &mut bytes).map_err(|_| ParseOidError(text.to_string()))?;
        Ok(Oid(bytes))
    }

    pub fn is_zero(&self) -> bool {
        *self == ZERO
    }

    /// Full 40-hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Display form truncated to 10 hex characters, used in progress
    /// output and error messages.
    pub fn short(&self) -> String {
        let full = self.to_hex();
        full[..10].to_string()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl std::str::FromStr for Oid {
    type Err = ParseOidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::parse(s)
    }
}

#[cfg(test)]
#[path = "oid_test.rs"]
mod tests;
