use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Direction of a background transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Upload,
    Download,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Upload => f.write_str("upload"),
            TaskKind::Download => f.write_str("download"),
        }
    }
}

/// A remote file or folder as reported by a listing or metadata call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub size: u64,
    pub is_folder: bool,
    pub created_time: String,
    pub modified_time: String,
    /// Present for files only; may be protocol-relative (`//host/...`)
    pub download_url: Option<String>,
}

/// Outcome of an upload, download, or folder operation.
///
/// State machines return one of these instead of an error whenever the
/// server answered but did not honour the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferCode {
    Success,
    Failed,
    NetworkError,
    PathError,
    MkdirError,
    CreateError,
    UnknownResponse,
    QuotaExhausted,
    IllegalFile,
    CommitError,
}

impl TransferCode {
    pub fn is_success(self) -> bool {
        self == TransferCode::Success
    }

    /// Short explanation shown in task error lists
    pub fn reason(self) -> &'static str {
        match self {
            TransferCode::Success => "success",
            TransferCode::Failed => "unknown failure",
            TransferCode::NetworkError => "network error",
            TransferCode::PathError => "local path missing or wrong type",
            TransferCode::MkdirError => "could not create remote folder",
            TransferCode::CreateError => "could not create upload task",
            TransferCode::UnknownResponse => "unrecognized server response",
            TransferCode::QuotaExhausted => "daily transfer quota exhausted",
            TransferCode::IllegalFile => "file rejected by server",
            TransferCode::CommitError => "upload commit failed",
        }
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Why a single file transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalTag {
    /// Data transferred and committed
    Done,
    /// Server already held the content; no bytes sent
    QuickUp,
    /// Target already present (remote for uploads, local for downloads)
    Exists,
    Illegal,
    Exhausted,
    Error,
}

impl TerminalTag {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TerminalTag::Illegal | TerminalTag::Exhausted | TerminalTag::Error
        )
    }
}

impl fmt::Display for TerminalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminalTag::Done => "done",
            TerminalTag::QuickUp => "quick upload",
            TerminalTag::Exists => "already there",
            TerminalTag::Illegal => "rejected",
            TerminalTag::Exhausted => "quota exhausted",
            TerminalTag::Error => "failed",
        })
    }
}

/// Progress notification emitted by the transfer state machines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Whole-file checksum is being computed
    Checking { name: String },
    /// Cumulative bytes moved; `total` is `None` when the size is unknown
    Bytes {
        name: String,
        done: u64,
        total: Option<u64>,
    },
    /// Emitted exactly once per file when it reaches a terminal state
    Terminal { name: String, tag: TerminalTag },
}

impl ProgressEvent {
    pub fn name(&self) -> &str {
        match self {
            ProgressEvent::Checking { name }
            | ProgressEvent::Bytes { name, .. }
            | ProgressEvent::Terminal { name, .. } => name,
        }
    }
}

/// Progress callback shared by upload and download paths.
///
/// Reference counted so the chunk stream feeding a request body can hold it.
pub type ProgressFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Status attached to a task's progress snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusTag {
    #[default]
    None,
    Checking,
    Terminal(TerminalTag),
}

/// Copy-on-read progress snapshot of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgress {
    pub done: u64,
    pub total: Option<u64>,
    pub status: StatusTag,
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self {
            done: 0,
            total: Some(1),
            status: StatusTag::None,
        }
    }
}

impl TaskProgress {
    /// Fold a progress event into the snapshot.
    ///
    /// Successful terminal tags mark the snapshot complete so a quick upload
    /// (which moves no bytes) still reads as 100%.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Checking { .. } => {
                self.done = 0;
                self.total = Some(1);
                self.status = StatusTag::Checking;
            }
            ProgressEvent::Bytes { done, total, .. } => {
                self.done = *done;
                self.total = *total;
                self.status = StatusTag::None;
            }
            ProgressEvent::Terminal { tag, .. } => {
                if !tag.is_failure() {
                    match self.total {
                        Some(total) if self.done < total => self.done = total,
                        Some(_) => {}
                        None => self.total = Some(self.done),
                    }
                }
                self.status = StatusTag::Terminal(*tag);
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        match self.total {
            Some(total) => self.done >= total,
            None => false,
        }
    }

    /// Completion percentage, `None` while the total is unknown
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.done as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}
