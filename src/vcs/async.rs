//! `tokio::process`-based git invocations used by the rewrite backend
//! (§4.5), which keeps many subprocesses in flight concurrently against
//! the bounded work queue.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::errors::Error;
use crate::oid::Oid;

/// Run `git <args>` with no stdin, collecting stdout. Used for read-only
/// lookups (`ls-tree`, `cat-file -p`) during the rewrite.
pub async fn run(workdir: &Path, args: &[&str]) -> crate::errors::Result<Vec<u8>> {
    let output = Command::new("git")
        .current_dir(workdir)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
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

/// Run `git <args>` feeding `stdin`, collecting stdout. Used for
/// `hash-object --stdin`, `mktree`, and `commit-tree` (message on stdin).
pub async fn run_with_stdin(
    workdir: &Path,
    args: &[&str],
    env: &[(&str, &str)],
    stdin: &[u8],
) -> crate::errors::Result<Vec<u8>> {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir)
        .args(args)
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| Error::Subprocess {
        command: format!("git {}", args.join(" ")),
        returncode: 1,
        extended: Some(e.to_string()),
    })?;

    let mut stdin_pipe = child.stdin.take().expect("piped stdin");
    let stdin_owned = stdin.to_vec();
    let write_task = tokio::spawn(async move {
        let _ = stdin_pipe.write_all(&stdin_owned).await;
    });

    let output = child.wait_with_output().await.map_err(|e| Error::Subprocess {
        command: format!("git {}", args.join(" ")),
        returncode: 1,
        extended: Some(e.to_string()),
    })?;
    let _ = write_task.await;

    if !output.status.success() {
        return Err(Error::Subprocess {
            command: format!("git {}", args.join(" ")),
            returncode: output.status.code().unwrap_or(1),
            extended: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    Ok(output.stdout)
}

/// Stream `git cat-file -p <rev>:<path>` line by line via a callback,
/// used by `AmendedBlob::write` to splice in replacement content without
/// buffering the whole blob.
pub async fn stream_file_lines<F>(
    workdir: &Path,
    rev: Oid,
    path: &[u8],
    mut on_line: F,
) -> crate::errors::Result<()>
where
    F: FnMut(&[u8]),
{
    let spec = format!("{}:{}", rev, String::from_utf8_lossy(path));
    let mut child = Command::new("git")
        .current_dir(workdir)
        .args(["cat-file", "-p", &spec])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Subprocess {
            command: format!("git cat-file -p {spec}"),
            returncode: 1,
            extended: Some(e.to_string()),
        })?;

    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut buf = Vec::new();
    stdout
        .read_to_end(&mut buf)
        .await
        .map_err(|e| Error::Subprocess {
            command: format!("git cat-file -p {spec}"),
            returncode: 1,
            extended: Some(e.to_string()),
        })?;

    let status = child.wait().await.map_err(|e| Error::Subprocess {
        command: format!("git cat-file -p {spec}"),
        returncode: 1,
        extended: Some(e.to_string()),
    })?;
    if !status.success() {
        return Err(Error::Subprocess {
            command: format!("git cat-file -p {spec}"),
            returncode: status.code().unwrap_or(1),
            extended: None,
        });
    }

    for line in buf.split_inclusive(|&b| b == b'\n') {
        if !line.is_empty() {
            on_line(line);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "async_test.rs"]
mod tests;
