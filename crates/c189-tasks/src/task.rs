//! The task capability and the progress cell each task writes through

use async_trait::async_trait;
use c189_core::{ProgressEvent, ProgressFn, TaskKind, TaskProgress};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// What a submission asks for. Two tasks with equal `CmdInfo` are the same
/// operation as far as the manager is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CmdInfo {
    pub kind: TaskKind,
    /// Normalized local path (upload) or remote file id (download)
    pub source: String,
    /// Remote folder id (upload) or normalized save directory (download)
    pub target: String,
}

/// Files finished vs. files found, for directory uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCount {
    pub done: usize,
    pub total: usize,
}

/// A unit of background transfer work owned by the `TaskManager`.
///
/// Readers call the accessors from any thread while `run` is in flight; each
/// accessor returns a copy so a reader never sees a half-updated value.
#[async_trait]
pub trait TransferTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Dedup key material
    fn cmd_info(&self) -> CmdInfo;

    /// Direction-specific description shown after the progress column
    fn summary(&self) -> String;

    fn progress(&self) -> TaskProgress;

    /// File counters, only for directory uploads
    fn count(&self) -> Option<FileCount> {
        None
    }

    /// The server already held the content; no bytes were sent
    fn quick_upload(&self) -> bool {
        false
    }

    /// Every failure recorded so far, oldest first
    fn errors(&self) -> Vec<String>;

    /// Drive the transfer to its end. Called once per submission.
    async fn run(&self);
}

/// Single-writer state shared between a task and its progress callback.
///
/// Only the task's own execution unit writes; `watch` hands readers whole
/// snapshots.
pub(crate) struct TaskState {
    progress: watch::Sender<TaskProgress>,
    files: watch::Sender<FileCount>,
    errors: watch::Sender<Vec<String>>,
    quick_up: AtomicBool,
}

impl TaskState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            progress: watch::channel(TaskProgress::default()).0,
            files: watch::channel(FileCount::default()).0,
            errors: watch::channel(Vec::new()).0,
            quick_up: AtomicBool::new(false),
        })
    }

    /// Callback handed to the transfer engine
    pub(crate) fn progress_fn(self: &Arc<Self>) -> ProgressFn {
        let state = Arc::clone(self);
        Arc::new(move |event: &ProgressEvent| state.observe(event))
    }

    fn observe(&self, event: &ProgressEvent) {
        self.progress.send_modify(|p| p.apply(event));
        if matches!(event, ProgressEvent::Terminal { .. }) {
            self.files.send_modify(|c| c.done += 1);
        }
    }

    pub(crate) fn set_file_total(&self, total: usize) {
        self.files.send_modify(|c| c.total = total);
    }

    pub(crate) fn set_quick_upload(&self, quick: bool) {
        self.quick_up.store(quick, Ordering::Release);
    }

    pub(crate) fn push_error(&self, message: String) {
        warn!("{message}");
        self.errors.send_modify(|e| e.push(message));
    }

    /// Mark the snapshot complete after a successful run.
    ///
    /// Covers runs that emit no byte events at all (an empty directory).
    pub(crate) fn complete(&self) {
        self.progress.send_modify(|p| {
            let total = p.total.unwrap_or(p.done).max(p.done);
            p.done = total;
            p.total = Some(total);
        });
    }

    pub(crate) fn progress(&self) -> TaskProgress {
        *self.progress.borrow()
    }

    pub(crate) fn files(&self) -> FileCount {
        *self.files.borrow()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub(crate) fn quick_upload(&self) -> bool {
        self.quick_up.load(Ordering::Acquire)
    }
}

/// Absolute, `.`/`..`-free form of `path` for dedup keys.
///
/// Existing paths are canonicalized (symlinks resolved); missing paths are
/// cleaned lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
