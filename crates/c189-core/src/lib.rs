pub mod config;
pub mod error;
pub mod types;

pub use error::{C189Error, C189Result};
pub use types::{
    FileRecord, ProgressEvent, ProgressFn, StatusTag, TaskKind, TaskProgress, TerminalTag,
    TransferCode,
};
