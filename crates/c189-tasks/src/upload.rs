//! Background upload of a file or a directory tree

use async_trait::async_trait;
use c189_api::CloudApi;
use c189_core::{TaskKind, TaskProgress, TransferCode};
use c189_transfer::{scan_tree, upload_tree, DirUploadOptions, UploadStrategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::task::{normalize_path, CmdInfo, FileCount, TaskState, TransferTask};

pub struct UploadTask {
    api: Arc<dyn CloudApi>,
    uploader: Arc<dyn UploadStrategy>,
    path: PathBuf,
    is_file: bool,
    force: bool,
    create_parent_dir: bool,
    folder_id: String,
    folder_name: String,
    state: Arc<TaskState>,
}

impl UploadTask {
    /// A task bound to the shared session and its chosen upload strategy.
    /// Targets the drive root until `set_target` is called.
    pub fn new(api: Arc<dyn CloudApi>, uploader: Arc<dyn UploadStrategy>) -> Self {
        Self {
            api,
            uploader,
            path: PathBuf::new(),
            is_file: true,
            force: false,
            create_parent_dir: true,
            folder_id: "-11".to_string(),
            folder_name: "/".to_string(),
            state: TaskState::new(),
        }
    }

    /// `create_parent_dir` only matters for directories: mirror the directory
    /// itself under the target, or upload its contents straight into it.
    pub fn set_upload_path(
        &mut self,
        path: impl Into<PathBuf>,
        is_file: bool,
        force: bool,
        create_parent_dir: bool,
    ) {
        self.path = path.into();
        self.is_file = is_file;
        self.force = force;
        self.create_parent_dir = create_parent_dir;
    }

    pub fn set_target(&mut self, folder_id: impl Into<String>, folder_name: impl Into<String>) {
        self.folder_id = folder_id.into();
        self.folder_name = folder_name.into();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run_file(&self) {
        let progress = self.state.progress_fn();
        let outcome = self
            .uploader
            .upload_file(&self.path, &self.folder_id, self.force, Some(&progress))
            .await;
        if outcome.is_success() {
            self.state.set_quick_upload(outcome.quick_upload);
            self.state.complete();
        } else {
            self.state.push_error(format!(
                "file upload failed: {} -> {}",
                outcome.code.reason(),
                self.path.display()
            ));
        }
    }

    fn dir_failed(&self, code: TransferCode) {
        self.state.push_error(format!(
            "folder upload failed: {} -> {}",
            code.reason(),
            self.path.display()
        ));
    }

    async fn run_dir(&self) {
        let is_dir = tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return self.dir_failed(TransferCode::PathError);
        }
        // One walk serves both the file count and the upload
        let tree = match scan_tree(&self.path).await {
            Ok(tree) => tree,
            Err(e) => {
                debug!(path = %self.path.display(), "cannot walk folder: {e}");
                return self.dir_failed(TransferCode::PathError);
            }
        };
        self.state
            .set_file_total(tree.iter().filter(|e| !e.is_dir).count());

        let progress = self.state.progress_fn();
        let state = Arc::clone(&self.state);
        let root = self.path.clone();
        let on_file_error = move |path: &Path, code: TransferCode| {
            let rel = path.strip_prefix(&root).unwrap_or(path);
            state.push_error(format!(
                "{} in folder failed to upload: {}",
                rel.display(),
                code.reason()
            ));
        };

        let report = upload_tree(
            self.api.as_ref(),
            self.uploader.as_ref(),
            &self.path,
            &tree,
            &self.folder_id,
            DirUploadOptions {
                force: self.force,
                create_root_dir: self.create_parent_dir,
            },
            Some(&progress),
            Some(&on_file_error),
        )
        .await;

        if !report.code.is_success() {
            self.dir_failed(report.code);
        } else if self.state.errors().is_empty() {
            self.state.complete();
        }
    }
}

#[async_trait]
impl TransferTask for UploadTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Upload
    }

    fn cmd_info(&self) -> CmdInfo {
        CmdInfo {
            kind: TaskKind::Upload,
            source: normalize_path(&self.path).to_string_lossy().into_owned(),
            target: self.folder_id.clone(),
        }
    }

    fn summary(&self) -> String {
        let count = self
            .count()
            .map(|c| format!(" ({}/{})", c.done, c.total))
            .unwrap_or_default();
        format!(
            "Upload: {}{} -> {}",
            self.path.display(),
            count,
            self.folder_name
        )
    }

    fn progress(&self) -> TaskProgress {
        self.state.progress()
    }

    fn count(&self) -> Option<FileCount> {
        let files = self.state.files();
        (!self.is_file && files.total > 0).then_some(files)
    }

    fn quick_upload(&self) -> bool {
        self.state.quick_upload()
    }

    fn errors(&self) -> Vec<String> {
        self.state.errors()
    }

    async fn run(&self) {
        debug!(
            path = %self.path.display(),
            folder_id = %self.folder_id,
            strategy = self.uploader.name(),
            "upload task started"
        );
        if self.is_file {
            self.run_file().await;
        } else {
            self.run_dir().await;
        }
        info!(
            path = %self.path.display(),
            errors = self.state.errors().len(),
            "upload task ended"
        );
    }
}
