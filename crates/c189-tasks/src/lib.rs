//! c189-tasks: background transfer tasks and the registry that runs them
//!
//! - `task`: the `TransferTask` capability and the shared progress cell
//! - `upload` / `download`: the two task variants over the transfer engine
//! - `manager`: `TaskManager` (submission, dedup, snapshots, error detail)
//! - `board`: follow mode, one live line per watched task
//! - `interrupt`: the keystroke listener the board polls to stop watching

pub mod board;
pub mod download;
pub mod interrupt;
pub mod manager;
pub mod render;
pub mod task;
pub mod upload;

pub use board::{FollowEnd, StatusBoard};
pub use download::DownloadTask;
pub use interrupt::{InterruptSource, KeyInterrupt, ManualInterrupt};
pub use manager::{Lifecycle, ResubmitPrompt, SubmitOutcome, TaskManager, TaskSnapshot};
pub use render::human_size;
pub use task::{normalize_path, CmdInfo, FileCount, TransferTask};
pub use upload::UploadTask;
