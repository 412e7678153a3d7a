//! Async rewrite backend (§4.5), grounded in `GitBackend`/
//! `GitBackendWorker` from `apply_rewrite.py`. Commit and blob rewrites
//! are scheduled by handle before their inputs are known (a commit can
//! be scheduled before its parent blobs are), and resolved later by
//! whichever side reaches the await point first. A single fatal error
//! cancels every outstanding rewrite.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::amend::AmendedBlob;
use crate::errors::Error;
use crate::oid::Oid;
use crate::vcs::r#async as vcs_async;

/// Default bound on in-flight rewrite requests, matching
/// `entropy.queueCapacity` (§ambient config) unless overridden.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A stable proxy key for a commit or blob rewrite whose final OID may
/// not be known yet — handed out at schedule time, resolved later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewriteHandle(u64);

/// Author/committer identity and message to stamp onto a rewritten
/// commit, re-derived from the commit being amended.
#[derive(Debug, Clone)]
pub struct CommitMetadata {
    pub author_name: String,
    pub author_email: String,
    pub author_date: String,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_date: String,
    pub message: Vec<u8>,
}

enum ResolvedValue {
    Ready(Oid),
    Failed(Arc<Error>),
}

struct PendingSlot {
    tx: Option<oneshot::Sender<ResolvedValue>>,
    rx: Option<oneshot::Receiver<ResolvedValue>>,
    value: Option<ResolvedValue>,
}

/// A commit rewrite request, queued for the worker to process once the
/// original commit's metadata and any non-amended tree entries are
/// needed.
struct CommitRewriteRequest {
    handle: RewriteHandle,
    commit: Oid,
    blobs: Vec<(Vec<u8>, AmendedBlobInput)>,
    parents: Vec<ParentRef>,
    metadata: CommitMetadata,
}

enum ParentRef {
    Resolved(Oid),
    Pending(RewriteHandle),
}

enum AmendedBlobInput {
    Unchanged(Oid),
    Amended(AmendedBlob<()>),
}

/// Front door to the backend: schedule rewrites, then resolve their
/// handles once the queue has drained enough to produce a real OID.
pub struct Backend {
    repo_dir: PathBuf,
    next_handle: AtomicU64,
    request_tx: mpsc::Sender<CommitRewriteRequest>,
    slots: Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>>,
    fatal: Arc<Mutex<Option<Arc<Error>>>>,
    worker: Option<tokio::task::JoinHandle<()>>,
    tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl Backend {
    pub fn launch(repo_dir: PathBuf, queue_capacity: usize) -> Backend {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let slots: Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>> = Arc::new(Mutex::new(HashMap::new()));
        let fatal: Arc<Mutex<Option<Arc<Error>>>> = Arc::new(Mutex::new(None));
        let tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let worker = tokio::spawn(run_worker(repo_dir.clone(), rx, slots.clone(), fatal.clone(), tasks.clone()));

        Backend {
            repo_dir,
            next_handle: AtomicU64::new(1),
            request_tx: tx,
            slots,
            fatal,
            worker: Some(worker),
            tasks,
        }
    }

    fn alloc_handle(&self) -> RewriteHandle {
        RewriteHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Pre-register a slot so `resolve_handle` has something to await
    /// even if the request hasn't reached the worker yet.
    async fn register_slot(&self, handle: RewriteHandle) {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().await.insert(
            handle,
            PendingSlot {
                tx: Some(tx),
                rx: Some(rx),
                value: None,
            },
        );
    }

    /// Schedule a commit rewrite, returning its handle immediately. The
    /// commit's blobs may themselves still be amended-but-unwritten;
    /// parents may be plain OIDs or other pending handles.
    pub async fn request_commit_rewrite(
        &self,
        commit: Oid,
        blobs: Vec<(Vec<u8>, AmendedBlob<()>)>,
        unchanged_blobs: Vec<(Vec<u8>, Oid)>,
        parents: Vec<ParentRewrite>,
        metadata: CommitMetadata,
    ) -> RewriteHandle {
        let handle = self.alloc_handle();
        self.register_slot(handle).await;

        let mut blob_inputs: Vec<(Vec<u8>, AmendedBlobInput)> = blobs
            .into_iter()
            .map(|(path, blob)| (path, AmendedBlobInput::Amended(blob)))
            .collect();
        blob_inputs.extend(
            unchanged_blobs
                .into_iter()
                .map(|(path, oid)| (path, AmendedBlobInput::Unchanged(oid))),
        );

        let parent_refs = parents
            .into_iter()
            .map(|p| match p {
                ParentRewrite::Resolved(oid) => ParentRef::Resolved(oid),
                ParentRewrite::Pending(h) => ParentRef::Pending(h),
            })
            .collect();

        let request = CommitRewriteRequest {
            handle,
            commit,
            blobs: blob_inputs,
            parents: parent_refs,
            metadata,
        };

        // A closed receiver means the worker already died fatally;
        // the caller will observe that via resolve_handle.
        let _ = self.request_tx.send(request).await;
        handle
    }

    /// Await a handle's final OID. Races the worker's happy path
    /// against the shared fatal-error cell: whichever resolves first
    /// wins, so one failure cancels every outstanding waiter.
    pub async fn resolve_handle(&self, handle: RewriteHandle) -> crate::errors::Result<Oid> {
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(&handle) {
                Some(slot) => {
                    if let Some(value) = &slot.value {
                        return match value {
                            ResolvedValue::Ready(oid) => Ok(*oid),
                            ResolvedValue::Failed(e) => Err(clone_error(e)),
                        };
                    }
                    slot.rx.take()
                }
                None => None,
            }
        };

        let rx = match rx {
            Some(rx) => rx,
            None => {
                self.register_slot(handle).await;
                self.slots
                    .lock()
                    .await
                    .get_mut(&handle)
                    .and_then(|slot| slot.rx.take())
                    .expect("slot just registered")
            }
        };

        match rx.await {
            Ok(ResolvedValue::Ready(oid)) => Ok(oid),
            Ok(ResolvedValue::Failed(e)) => Err(clone_error(&e)),
            Err(_) => {
                // sender dropped without a value: the worker died, check
                // the shared fatal cell for the real cause.
                match self.fatal.lock().await.clone() {
                    Some(e) => Err(clone_error(&e)),
                    None => Err(Error::Subprocess {
                        command: "git-entropy rewrite worker".to_string(),
                        returncode: 1,
                        extended: Some("worker exited without producing a result".to_string()),
                    }),
                }
            }
        }
    }

    /// Drain the queue and stop the worker, propagating its first fatal
    /// error (if any).
    pub async fn join(mut self) -> crate::errors::Result<()> {
        drop(self.request_tx.clone());
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            let _ = task.await;
        }
        match self.fatal.lock().await.clone() {
            Some(e) => Err(clone_error(&e)),
            None => Ok(()),
        }
    }

    /// Mark the backend as fatally cancelled, so `join()` and every
    /// outstanding `resolve_handle()` surface an error instead of
    /// hanging on a queue that will never drain, then abort every
    /// in-flight commit task (which, via RAII `Child` guards in the VCS
    /// wrapper, kills their subprocesses too).
    pub async fn cancel(&self, reason: Error) {
        let mut fatal = self.fatal.lock().await;
        if fatal.is_none() {
            *fatal = Some(Arc::new(reason));
        }
        drop(fatal);
        for task in self.tasks.lock().await.iter() {
            task.abort();
        }
    }
}

/// A parent of a commit being rewritten: either already-resolved (a
/// commit outside the rewritten range) or still pending another handle.
pub enum ParentRewrite {
    Resolved(Oid),
    Pending(RewriteHandle),
}

fn clone_error(e: &Arc<Error>) -> Error {
    e.as_ref().clone()
}

/// Pops requests off the queue in FIFO order and spawns one commit task
/// per request, so a child commit's task can start awaiting its parent's
/// blob/commit tasks (already spawned, since the rebuilder submits
/// strictly in reverse-topological order) while other independent
/// commits materialize concurrently. The worker itself never blocks on a
/// single commit's completion — only on the queue and on the shared
/// fatal cell, so one bad commit doesn't stall commits that don't depend
/// on it.
async fn run_worker(
    repo_dir: PathBuf,
    mut rx: mpsc::Receiver<CommitRewriteRequest>,
    slots: Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>>,
    fatal: Arc<Mutex<Option<Arc<Error>>>>,
    tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
) {
    let blob_cache: Arc<Mutex<HashMap<Oid, Oid>>> = Arc::new(Mutex::new(HashMap::new()));

    while let Some(request) = rx.recv().await {
        if fatal.lock().await.is_some() {
            break;
        }

        let handle = request.handle;
        let repo_dir = repo_dir.clone();
        let slots = slots.clone();
        let fatal = fatal.clone();
        let blob_cache = blob_cache.clone();

        let task = tokio::spawn(async move {
            match process_rewrite_request(&repo_dir, request, &slots, &blob_cache).await {
                Ok(oid) => complete_slot(&slots, handle, ResolvedValue::Ready(oid)).await,
                Err(e) => {
                    let shared = Arc::new(e);
                    let mut guard = fatal.lock().await;
                    if guard.is_none() {
                        *guard = Some(shared.clone());
                    }
                    drop(guard);
                    complete_slot(&slots, handle, ResolvedValue::Failed(shared)).await;
                }
            }
        });
        tasks.lock().await.push(task);
    }
}

async fn complete_slot(
    slots: &Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>>,
    handle: RewriteHandle,
    value: ResolvedValue,
) {
    let mut slots = slots.lock().await;
    if let Some(slot) = slots.get_mut(&handle) {
        if let Some(tx) = slot.tx.take() {
            let _ = tx.send(match &value {
                ResolvedValue::Ready(oid) => ResolvedValue::Ready(*oid),
                ResolvedValue::Failed(e) => ResolvedValue::Failed(e.clone()),
            });
        }
        slot.value = Some(value);
    }
}

async fn process_rewrite_request(
    repo_dir: &PathBuf,
    request: CommitRewriteRequest,
    slots: &Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>>,
    blob_cache: &Arc<Mutex<HashMap<Oid, Oid>>>,
) -> crate::errors::Result<Oid> {
    let mut entries: Vec<(Vec<u8>, Oid)> = Vec::with_capacity(request.blobs.len());
    for (path, input) in request.blobs {
        let oid = match input {
            AmendedBlobInput::Unchanged(oid) => oid,
            AmendedBlobInput::Amended(blob) => resolve_blob(repo_dir, blob, blob_cache).await?,
        };
        entries.push((path, oid));
    }

    let tree = write_tree(repo_dir, request.commit, &entries).await?;

    let mut parent_oids = Vec::with_capacity(request.parents.len());
    for parent in request.parents {
        let oid = match parent {
            ParentRef::Resolved(oid) => oid,
            ParentRef::Pending(handle) => await_slot(slots, handle).await?,
        };
        parent_oids.push(oid);
    }

    write_commit(repo_dir, tree, &parent_oids, &request.metadata).await
}

async fn await_slot(
    slots: &Arc<Mutex<HashMap<RewriteHandle, PendingSlot>>>,
    handle: RewriteHandle,
) -> crate::errors::Result<Oid> {
    loop {
        let maybe = {
            let slots = slots.lock().await;
            slots.get(&handle).and_then(|slot| match &slot.value {
                Some(ResolvedValue::Ready(oid)) => Some(Ok(*oid)),
                Some(ResolvedValue::Failed(e)) => Some(Err(clone_error(e))),
                None => None,
            })
        };
        if let Some(result) = maybe {
            return result;
        }
        tokio::task::yield_now().await;
    }
}

/// At-most-once blob materialization: the first caller for a given
/// pre-rewrite blob OID actually rewrites it; later callers reuse the
/// cached result.
async fn resolve_blob(
    repo_dir: &PathBuf,
    blob: AmendedBlob<()>,
    cache: &Arc<Mutex<HashMap<Oid, Oid>>>,
) -> crate::errors::Result<Oid> {
    if let Some(cached) = cache.lock().await.get(&blob.oid) {
        return Ok(*cached);
    }

    let mut content = Vec::new();
    let commit = blob.commit;
    let file = blob.file.clone();
    let amendments = blob.amendments.clone();
    vcs_async::stream_file_lines(repo_dir, commit, &file, |line| {
        content.extend_from_slice(line);
    })
    .await?;

    let rewritten = apply_amendments(&content, &amendments);
    let out = vcs_async::run_with_stdin(
        repo_dir,
        &["hash-object", "-t", "blob", "-w", "--stdin"],
        &[],
        &rewritten,
    )
    .await?;
    let oid = Oid::parse(String::from_utf8_lossy(&out).trim())
        .map_err(|_| Error::Subprocess {
            command: "git hash-object".to_string(),
            returncode: 1,
            extended: None,
        })?;

    cache.lock().await.insert(blob.oid, oid);
    Ok(oid)
}

/// Splice replacement bytes into `content` at each amendment's
/// `[start, start+extent)` 1-based line range.
fn apply_amendments(content: &[u8], amendments: &[crate::amend::AmendmentRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut lineno = 1usize;
    let mut amend_idx = 0;
    let mut in_suppressed_range: Option<usize> = None; // end line (exclusive) of current suppression

    for line in content.split_inclusive(|&b| b == b'\n') {
        while amend_idx < amendments.len() && amendments[amend_idx].start == lineno {
            out.extend_from_slice(&amendments[amend_idx].replacement);
            in_suppressed_range = Some(lineno + amendments[amend_idx].extent);
            amend_idx += 1;
        }

        let suppressed = in_suppressed_range.map(|end| lineno < end).unwrap_or(false);
        if !suppressed {
            out.extend_from_slice(line);
        }

        lineno += 1;
    }

    out
}

/// Rebuild `original_commit`'s tree with `entries` (path -> blob oid)
/// substituted in, leaving every untouched entry exactly as it was.
/// Queries `ls-tree` once per ancestor directory of a touched path,
/// deepest first, matching `git_fold/apply_rewrite.py::_write_tree`.
async fn write_tree(
    repo_dir: &PathBuf,
    original_commit: Oid,
    entries: &[(Vec<u8>, Oid)],
) -> crate::errors::Result<Oid> {
    if entries.is_empty() {
        let spec = format!("{}^{{tree}}", original_commit.to_hex());
        let out = vcs_async::run(repo_dir, &["rev-parse", &spec]).await?;
        return Oid::parse(String::from_utf8_lossy(&out).trim()).map_err(|_| Error::Subprocess {
            command: "git rev-parse".to_string(),
            returncode: 1,
            extended: None,
        });
    }

    let new_blobs: HashMap<String, Oid> = entries
        .iter()
        .map(|(path, oid)| (String::from_utf8_lossy(path).into_owned(), *oid))
        .collect();

    let mut dir_set: std::collections::HashSet<String> = std::collections::HashSet::new();
    for path in new_blobs.keys() {
        let mut subdir = match path.rsplit_once('/') {
            Some((d, _)) => d.to_string(),
            None => String::new(),
        };
        loop {
            if subdir.is_empty() || !dir_set.insert(subdir.clone()) {
                break;
            }
            subdir = match subdir.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None => String::new(),
            };
        }
    }

    let mut ordered: Vec<String> = dir_set.into_iter().collect();
    ordered.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
    ordered.push(String::new());

    let commit_hex = original_commit.to_hex();
    let mut written: HashMap<String, Oid> = HashMap::new();

    for dir in &ordered {
        let raw = if dir.is_empty() {
            vcs_async::run(repo_dir, &["ls-tree", &commit_hex]).await?
        } else {
            let pathspec = format!("{}/", dir);
            vcs_async::run(repo_dir, &["ls-tree", &commit_hex, "--", &pathspec]).await?
        };

        let mut stdin = String::new();
        for line in raw.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let text = String::from_utf8_lossy(line);
            let Some((meta, name)) = text.split_once('\t') else {
                continue;
            };
            let mut meta_fields = meta.split(' ');
            let mode = meta_fields.next().unwrap_or("100644");
            let obj_type = meta_fields.next().unwrap_or("blob");
            let orig_oid = meta_fields.next().unwrap_or("");

            // `ls-tree <commit> -- <dir>/` prints `name` as the full path
            // relative to the repo root (not relative to `dir`), so it's
            // already the key `new_blobs`/`written` are keyed on. The
            // `mktree` stdin format wants just the basename for this
            // tree level, though, so that's split off separately.
            let full_path = name.to_string();
            let basename = name.rsplit('/').next().unwrap_or(name);

            let oid_str = if obj_type == "tree" {
                written
                    .get(&full_path)
                    .map(|o| o.to_hex())
                    .unwrap_or_else(|| orig_oid.to_string())
            } else {
                new_blobs
                    .get(&full_path)
                    .map(|o| o.to_hex())
                    .unwrap_or_else(|| orig_oid.to_string())
            };

            stdin.push_str(&format!("{} {} {}\t{}\n", mode, obj_type, oid_str, basename));
        }

        let out = vcs_async::run_with_stdin(repo_dir, &["mktree"], &[], stdin.as_bytes()).await?;
        let oid = Oid::parse(String::from_utf8_lossy(&out).trim())
            .map_err(|_| Error::Subprocess {
                command: "git mktree".to_string(),
                returncode: 1,
                extended: None,
            })?;
        written.insert(dir.clone(), oid);
    }

    Ok(*written.get("").expect("root tree always written"))
}

async fn write_commit(
    repo_dir: &PathBuf,
    tree: Oid,
    parents: &[Oid],
    metadata: &CommitMetadata,
) -> crate::errors::Result<Oid> {
    let tree_hex = tree.to_hex();
    let mut args = vec!["commit-tree".to_string(), tree_hex];
    for parent in parents {
        args.push("-p".to_string());
        args.push(parent.to_hex());
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    let env = [
        ("GIT_AUTHOR_NAME", metadata.author_name.as_str()),
        ("GIT_AUTHOR_EMAIL", metadata.author_email.as_str()),
        ("GIT_AUTHOR_DATE", metadata.author_date.as_str()),
        ("GIT_COMMITTER_NAME", metadata.committer_name.as_str()),
        ("GIT_COMMITTER_EMAIL", metadata.committer_email.as_str()),
        ("GIT_COMMITTER_DATE", metadata.committer_date.as_str()),
    ];

    let out = vcs_async::run_with_stdin(repo_dir, &arg_refs, &env, &metadata.message).await?;
    Oid::parse(String::from_utf8_lossy(&out).trim()).map_err(|_| Error::Subprocess {
        command: "git commit-tree".to_string(),
        returncode: 1,
        extended: None,
    })
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;
