//! Background download of a file, or of a folder as a zip archive

use async_trait::async_trait;
use c189_api::CloudApi;
use c189_core::{TaskKind, TaskProgress};
use c189_transfer::{down_dir_zip_by_id, down_file_by_id};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::task::{normalize_path, CmdInfo, TaskState, TransferTask};

pub struct DownloadTask {
    api: Arc<dyn CloudApi>,
    save_dir: PathBuf,
    fid: String,
    is_file: bool,
    remote_parent_path: String,
    remote_name: String,
    state: Arc<TaskState>,
}

impl DownloadTask {
    pub fn new(api: Arc<dyn CloudApi>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            save_dir: save_dir.into(),
            fid: String::new(),
            is_file: true,
            remote_parent_path: String::new(),
            remote_name: String::new(),
            state: TaskState::new(),
        }
    }

    /// Folders (`is_file == false`) are fetched as a server-built archive.
    /// The remote path and name are only used for display.
    pub fn set_fid(
        &mut self,
        fid: impl Into<String>,
        is_file: bool,
        remote_parent_path: impl Into<String>,
        remote_name: impl Into<String>,
    ) {
        self.fid = fid.into();
        self.is_file = is_file;
        self.remote_parent_path = remote_parent_path.into();
        self.remote_name = remote_name.into();
    }

    /// `parent/name` when known, else the bare id
    fn remote_display(&self) -> String {
        match (self.remote_parent_path.as_str(), self.remote_name.as_str()) {
            (_, "") => self.fid.clone(),
            ("", name) => name.to_string(),
            (parent, name) => format!("{}/{}", parent.trim_end_matches('/'), name),
        }
    }
}

#[async_trait]
impl TransferTask for DownloadTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn cmd_info(&self) -> CmdInfo {
        CmdInfo {
            kind: TaskKind::Download,
            source: self.fid.clone(),
            target: normalize_path(&self.save_dir).to_string_lossy().into_owned(),
        }
    }

    fn summary(&self) -> String {
        format!("Download: {}", self.remote_display())
    }

    fn progress(&self) -> TaskProgress {
        self.state.progress()
    }

    fn errors(&self) -> Vec<String> {
        self.state.errors()
    }

    async fn run(&self) {
        debug!(fid = %self.fid, dir = %self.save_dir.display(), is_file = self.is_file, "download task started");
        let progress = self.state.progress_fn();
        let code = if self.is_file {
            down_file_by_id(self.api.as_ref(), &self.fid, &self.save_dir, Some(&progress)).await
        } else {
            down_dir_zip_by_id(self.api.as_ref(), &self.fid, &self.save_dir, Some(&progress)).await
        };

        if code.is_success() {
            self.state.complete();
            info!(fid = %self.fid, "download task finished");
        } else {
            let what = if self.is_file { "file" } else { "folder" };
            self.state.push_error(format!(
                "{what} download failed: {} -> {} (id {})",
                code.reason(),
                self.remote_display(),
                self.fid
            ));
        }
    }
}
