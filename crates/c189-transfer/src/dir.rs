//! Directory upload: mirror a local tree remotely, then upload its files
//!
//! Two passes. Folder creation is fail-fast and runs first: a missing folder
//! id leaves every path below it unresolvable, so the upload stops before any
//! file data is sent. File uploads are best-effort: failures are collected
//! and the rest still go.

use c189_api::CloudApi;
use c189_core::{ProgressFn, TransferCode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::upload::{UploadOutcome, UploadStrategy};

/// Called once for every file whose upload did not succeed
pub type FileErrorFn = dyn Fn(&Path, TransferCode) + Send + Sync;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirUploadOptions {
    /// Re-upload files that already exist remotely (web uploads only)
    pub force: bool,
    /// Create a remote folder named after the local root; otherwise the
    /// root's contents go straight into the parent folder
    pub create_root_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirUploadReport {
    /// `Success` unless the tree could not be read or mirrored
    pub code: TransferCode,
    pub outcomes: Vec<UploadOutcome>,
}

impl DirUploadReport {
    fn failed(code: TransferCode) -> Self {
        Self {
            code,
            outcomes: Vec::new(),
        }
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// A file or directory below the upload root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the root, `/`-separated
    pub rel: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl TreeEntry {
    /// Relative path of the containing directory ("" for the root)
    pub fn parent_rel(&self) -> &str {
        self.rel.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }
}

/// Walk `root` depth-first (pre-order, names sorted) so every directory
/// precedes its contents.
///
/// Symlinked files are read through the link. Symlinked directories and
/// dangling links are skipped, so a link back into the tree cannot loop.
pub fn collect_tree(root: &Path) -> std::io::Result<Vec<TreeEntry>> {
    let mut out = Vec::new();
    collect_inner(root, "", &mut out)?;
    Ok(out)
}

/// `collect_tree` on the blocking pool
pub async fn scan_tree(root: &Path) -> std::io::Result<Vec<TreeEntry>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || collect_tree(&root))
        .await
        .map_err(std::io::Error::other)?
}

fn collect_inner(dir: &Path, prefix: &str, out: &mut Vec<TreeEntry>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(target) if target.is_file() => out.push(TreeEntry {
                    rel,
                    path,
                    is_dir: false,
                }),
                Ok(_) => debug!(rel = %rel, "skipping symlinked directory"),
                Err(e) => debug!(rel = %rel, "skipping dangling symlink: {e}"),
            }
        } else if file_type.is_dir() {
            out.push(TreeEntry {
                rel: rel.clone(),
                path: path.clone(),
                is_dir: true,
            });
            collect_inner(&path, &rel, out)?;
        } else if file_type.is_file() {
            out.push(TreeEntry {
                rel,
                path,
                is_dir: false,
            });
        }
    }
    Ok(())
}

/// Upload the tree under `local_root` into `parent_id`.
pub async fn upload_dir(
    api: &dyn CloudApi,
    uploader: &dyn UploadStrategy,
    local_root: &Path,
    parent_id: &str,
    options: DirUploadOptions,
    progress: Option<&ProgressFn>,
    on_file_error: Option<&(dyn Fn(&Path, TransferCode) + Send + Sync + '_)>,
) -> DirUploadReport {
    if !local_root.is_dir() {
        warn!(path = %local_root.display(), "upload root is not a directory");
        return DirUploadReport::failed(TransferCode::PathError);
    }
    let tree = match scan_tree(local_root).await {
        Ok(tree) => tree,
        Err(e) => {
            warn!(path = %local_root.display(), "cannot walk upload root: {e}");
            return DirUploadReport::failed(TransferCode::PathError);
        }
    };
    upload_tree(
        api,
        uploader,
        local_root,
        &tree,
        parent_id,
        options,
        progress,
        on_file_error,
    )
    .await
}

/// Upload an already collected `tree` of `local_root`.
///
/// Every folder is mirrored before any file is sent: a folder that cannot be
/// created stops the upload with no file data transferred. File failures are
/// collected and the remaining files still go.
#[allow(clippy::too_many_arguments)]
pub async fn upload_tree(
    api: &dyn CloudApi,
    uploader: &dyn UploadStrategy,
    local_root: &Path,
    tree: &[TreeEntry],
    parent_id: &str,
    options: DirUploadOptions,
    progress: Option<&ProgressFn>,
    on_file_error: Option<&(dyn Fn(&Path, TransferCode) + Send + Sync + '_)>,
) -> DirUploadReport {
    let root_id = if options.create_root_dir {
        let root_name = local_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match api.create_folder(parent_id, &root_name).await {
            Ok(id) => id,
            Err(e) => {
                warn!(folder = %root_name, parent_id, "mkdir failed: {e}");
                return DirUploadReport::failed(e.to_code(TransferCode::MkdirError));
            }
        }
    } else {
        parent_id.to_string()
    };

    // relative dir path -> remote folder id
    let mut folders: HashMap<String, String> = HashMap::new();
    folders.insert(String::new(), root_id);

    for entry in tree.iter().filter(|e| e.is_dir) {
        let Some(parent) = folders.get(entry.parent_rel()).cloned() else {
            warn!(rel = %entry.rel, "parent folder id unknown");
            return DirUploadReport::failed(TransferCode::MkdirError);
        };
        let name = entry.rel.rsplit('/').next().unwrap_or(&entry.rel);
        match api.create_folder(&parent, name).await {
            Ok(id) => {
                debug!(rel = %entry.rel, id = %id, "mirrored folder");
                folders.insert(entry.rel.clone(), id);
            }
            Err(e) => {
                warn!(rel = %entry.rel, "mkdir failed, nothing uploaded: {e}");
                return DirUploadReport::failed(e.to_code(TransferCode::MkdirError));
            }
        }
    }

    let mut outcomes = Vec::new();
    for entry in tree.iter().filter(|e| !e.is_dir) {
        let Some(parent) = folders.get(entry.parent_rel()) else {
            warn!(rel = %entry.rel, "parent folder id unknown");
            return DirUploadReport {
                code: TransferCode::MkdirError,
                outcomes,
            };
        };
        let outcome = uploader
            .upload_file(&entry.path, parent, options.force, progress)
            .await;
        if !outcome.is_success() {
            if let Some(cb) = on_file_error {
                cb(&entry.path, outcome.code);
            }
        }
        outcomes.push(outcome);
    }

    DirUploadReport {
        code: TransferCode::Success,
        outcomes,
    }
}
