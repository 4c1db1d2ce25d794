//! c189-transfer: upload and download state machines
//!
//! - `upload`: single-file upload behind the `UploadStrategy` seam
//!   (`QuickUploader` for client-API sessions, `BasicUploader` for web-only)
//! - `dir`: mirror a local tree remotely and upload every file in it
//! - `download`: resumable single-file and zipped-folder downloads

pub mod dir;
pub mod download;
pub mod upload;

pub use dir::{
    collect_tree, scan_tree, upload_dir, upload_tree, DirUploadOptions, DirUploadReport, FileErrorFn,
    TreeEntry,
};
pub use download::{down_dir_zip_by_id, down_file_by_id};
pub use upload::{select_uploader, BasicUploader, QuickUploader, UploadOutcome, UploadStrategy};
