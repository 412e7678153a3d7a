//! Subprocess wrapper around the `git` binary (§4.5/§6).
//!
//! We never link `libgit2`: every interaction with the repository goes
//! through `git` itself, either synchronously (for the one-shot planning
//! reads — `blame`, `diff`, `rev-parse`) or through the `tokio::process`
//! variants used by the rewrite backend, which needs many subprocesses
//! in flight concurrently. Grounded in `git_commands::run_git` for the
//! sync shape and in `git.call_git`/`GitCall.call_async` for the
//! async/streaming shape.

use std::path::{Path, PathBuf};
use std::process::Stdio as StdStdio;

use crate::errors::Error;
use crate::oid::Oid;

/// Repository handle: just the working directory git commands run in.
#[derive(Debug, Clone)]
pub struct Repo {
    pub workdir: PathBuf,
}

impl Repo {
    pub fn new(workdir: impl Into<PathBuf>) -> Repo {
        Repo {
            workdir: workdir.into(),
        }
    }

    /// Discover the repository containing `start` by asking git itself,
    /// so we inherit its notion of worktrees/submodules.
    pub fn discover(start: &Path) -> crate::errors::Result<Repo> {
        let out = run_sync(start, &["rev-parse", "--show-toplevel"])?;
        let path = String::from_utf8_lossy(&out).trim().to_string();
        Ok(Repo::new(PathBuf::from(path)))
    }

    /// `git rev-parse --verify <rev>`, wrapping failure as `InvalidRevision`.
    pub fn resolve_revision(&self, rev: &str) -> crate::errors::Result<Oid> {
        let output = std::process::Command::new("git")
            .current_dir(&self.workdir)
            .args(["rev-parse", "--verify", rev])
            .output()
            .map_err(|e| Error::Subprocess {
                command: format!("git rev-parse --verify {rev}"),
                returncode: 1,
                extended: Some(e.to_string()),
            })?;

        if !output.status.success() {
            return Err(Error::InvalidRevision {
                revision: rev.to_string(),
                returncode: output.status.code().unwrap_or(1),
                extended: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Oid::parse(text.trim()).map_err(|_| Error::InvalidRevision {
            revision: rev.to_string(),
            returncode: 1,
            extended: None,
        })
    }

    pub fn run(&self, args: &[&str]) -> crate::errors::Result<Vec<u8>> {
        run_sync(&self.workdir, args)
    }

    pub fn run_with_stdin(&self, args: &[&str], stdin: &[u8]) -> crate::errors::Result<Vec<u8>> {
        run_sync_stdin(&self.workdir, args, stdin)
    }

    /// Pass a command through with inherited stdio (for `range-diff`/`diff
    /// --staged` display per §6 — the user watches it stream directly).
    pub fn run_passthrough(&self, args: &[&str]) -> crate::errors::Result<()> {
        let status = std::process::Command::new("git")
            .current_dir(&self.workdir)
            .args(args)
            .status()
            .map_err(|e| Error::Subprocess {
                command: format!("git {}", args.join(" ")),
                returncode: 1,
                extended: Some(e.to_string()),
            })?;

        if !status.success() {
            return Err(Error::Subprocess {
                command: format!("git {}", args.join(" ")),
                returncode: status.code().unwrap_or(1),
                extended: None,
            });
        }
        Ok(())
    }
}

fn run_sync(workdir: &Path, args: &[&str]) -> crate::errors::Result<Vec<u8>> {
    let output = std::process::Command::new("git")
        .current_dir(workdir)
        .args(args)
        .stdin(StdStdio::null())
        .output()
        .map_err(|e| Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: 1,
            extended: Some(e.to_string()),
        })?;

    if !output.status.success() {
        return Err(Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: output.status.code().unwrap_or(1),
            extended: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    Ok(output.stdout)
}

fn run_sync_stdin(workdir: &Path, args: &[&str], stdin: &[u8]) -> crate::errors::Result<Vec<u8>> {
    use std::io::Write;

    let mut child = std::process::Command::new("git")
        .current_dir(workdir)
        .args(args)
        .stdin(StdStdio::piped())
        .stdout(StdStdio::piped())
        .stderr(StdStdio::piped())
        .spawn()
        .map_err(|e| Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: 1,
            extended: Some(e.to_string()),
        })?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(stdin)
        .map_err(|e| Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: 1,
            extended: Some(e.to_string()),
        })?;

    let output = child.wait_with_output().map_err(|e| Error::Subprocess {
        command: format!("git {}", args.join(" ")),
        returncode: 1,
        extended: Some(e.to_string()),
    })?;

    if !output.status.success() {
        return Err(Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: output.status.code().unwrap_or(1),
            extended: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    Ok(output.stdout)
}

pub mod r#async;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
