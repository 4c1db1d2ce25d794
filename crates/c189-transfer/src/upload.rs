//! Single-file upload state machine
//!
//! Two strategies behind one trait, picked once per session:
//!   - `QuickUploader` (client API): checksum → create → quick commit, or
//!     stream data → commit
//!   - `BasicUploader` (web API): check existing by name+size → multipart
//!     upload
//!
//! Every path ends with exactly one `ProgressEvent::Terminal`, so observers
//! can render a final status without looking at byte counts.

use async_trait::async_trait;
use c189_api::{CloudApi, CreateUploadReply, CreateUploadRequest, UploadBody, UploadCreateInfo};
use c189_chunks::{choose_chunk_size, chunks, file_checksum, ChunkProgress};
use c189_core::{ProgressEvent, ProgressFn, TerminalTag, TransferCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Result of uploading one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub code: TransferCode,
    pub remote_id: Option<String>,
    /// Server already held the content; no data was sent
    pub quick_upload: bool,
    pub path: PathBuf,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// One way of getting a local file into a remote folder
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    /// Short label for logs ("client" or "web")
    fn name(&self) -> &'static str;

    /// Can skip the data transfer when the server already has the content
    fn supports_quick_upload(&self) -> bool;

    async fn upload_file(
        &self,
        local_path: &Path,
        folder_id: &str,
        force: bool,
        progress: Option<&ProgressFn>,
    ) -> UploadOutcome;
}

/// Pick the strategy the session's credentials allow.
pub fn select_uploader(api: Arc<dyn CloudApi>, skip_checksum: bool) -> Arc<dyn UploadStrategy> {
    if api.has_client_session() {
        Arc::new(QuickUploader::new(api, skip_checksum))
    } else {
        Arc::new(BasicUploader::new(api))
    }
}

// ── Shared pieces ────────────────────────────────────────────────────────

struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    label: String,
}

async fn inspect(path: &Path) -> Option<LocalFile> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let name = path.file_name()?.to_string_lossy().into_owned();
    Some(LocalFile {
        path: path.to_path_buf(),
        name,
        size: meta.len(),
        label: path.display().to_string(),
    })
}

/// How a strategy run ended, before the terminal event is emitted
struct Ending {
    code: TransferCode,
    remote_id: Option<String>,
    quick_upload: bool,
    tag: TerminalTag,
}

impl Ending {
    fn done(id: String, quick_upload: bool) -> Self {
        Self {
            code: TransferCode::Success,
            remote_id: Some(id),
            quick_upload,
            tag: if quick_upload {
                TerminalTag::QuickUp
            } else {
                TerminalTag::Done
            },
        }
    }

    fn exists(id: String) -> Self {
        Self {
            code: TransferCode::Success,
            remote_id: Some(id),
            quick_upload: false,
            tag: TerminalTag::Exists,
        }
    }

    fn failed(code: TransferCode) -> Self {
        let tag = match code {
            TransferCode::IllegalFile => TerminalTag::Illegal,
            TransferCode::QuotaExhausted => TerminalTag::Exhausted,
            _ => TerminalTag::Error,
        };
        Self {
            code,
            remote_id: None,
            quick_upload: false,
            tag,
        }
    }
}

fn emit(progress: Option<&ProgressFn>, event: ProgressEvent) {
    if let Some(cb) = progress {
        cb(&event);
    }
}

fn finish(
    strategy: &str,
    path: &Path,
    label: String,
    ending: Ending,
    progress: Option<&ProgressFn>,
) -> UploadOutcome {
    emit(
        progress,
        ProgressEvent::Terminal {
            name: label,
            tag: ending.tag,
        },
    );
    if ending.code.is_success() {
        info!(
            strategy,
            path = %path.display(),
            id = ending.remote_id.as_deref().unwrap_or_default(),
            quick = ending.quick_upload,
            "upload finished"
        );
    } else {
        warn!(strategy, path = %path.display(), code = ?ending.code, "upload failed");
    }
    UploadOutcome {
        code: ending.code,
        remote_id: ending.remote_id,
        quick_upload: ending.quick_upload,
        path: path.to_path_buf(),
    }
}

/// Stream the file as a request body, reporting cumulative bytes.
async fn file_body(
    file: &LocalFile,
    progress: Option<&ProgressFn>,
) -> std::io::Result<UploadBody> {
    let handle = tokio::fs::File::open(&file.path).await?;
    let mut stream = chunks(handle.take(file.size), choose_chunk_size(Some(file.size)));
    if let Some(cb) = progress.cloned() {
        let name = file.label.clone();
        let total = file.size;
        let on_chunk: ChunkProgress = Arc::new(move |done| {
            cb(&ProgressEvent::Bytes {
                name: name.clone(),
                done,
                total: Some(total),
            })
        });
        stream = stream.with_progress(on_chunk);
    }
    Ok(Box::pin(stream))
}

// ── Client API: create → quick / stream → commit ─────────────────────────

pub struct QuickUploader {
    api: Arc<dyn CloudApi>,
    skip_checksum: bool,
}

impl QuickUploader {
    pub fn new(api: Arc<dyn CloudApi>, skip_checksum: bool) -> Self {
        Self { api, skip_checksum }
    }

    async fn checksum(&self, file: &LocalFile, progress: Option<&ProgressFn>) -> Option<String> {
        if self.skip_checksum {
            return Some(String::new());
        }
        emit(
            progress,
            ProgressEvent::Checking {
                name: file.label.clone(),
            },
        );
        let path = file.path.clone();
        match tokio::task::spawn_blocking(move || file_checksum(&path)).await {
            Ok(Ok(md5)) => Some(md5),
            Ok(Err(e)) => {
                warn!(path = %file.path.display(), "checksum failed: {e:#}");
                None
            }
            Err(e) => {
                warn!(path = %file.path.display(), "checksum task failed: {e}");
                None
            }
        }
    }

    async fn commit(&self, info: &UploadCreateInfo, quick: bool) -> Ending {
        match self.api.commit_upload(info).await {
            Ok(id) => Ending::done(id, quick),
            Err(e) => {
                warn!(upload_file_id = %info.upload_file_id, "commit failed: {e}");
                Ending::failed(TransferCode::CommitError)
            }
        }
    }

    async fn run(&self, file: &LocalFile, folder_id: &str, progress: Option<&ProgressFn>) -> Ending {
        let Some(md5) = self.checksum(file, progress).await else {
            return Ending::failed(TransferCode::Failed);
        };

        let request = CreateUploadRequest {
            parent_folder_id: folder_id.to_string(),
            file_name: file.name.clone(),
            size: file.size,
            md5,
            local_path: file.label.clone(),
        };
        let info = match self.api.create_upload(&request).await {
            Ok(CreateUploadReply::Created(info)) => info,
            Ok(CreateUploadReply::QuotaExhausted) => {
                return Ending::failed(TransferCode::QuotaExhausted)
            }
            Ok(CreateUploadReply::Illegal) => return Ending::failed(TransferCode::IllegalFile),
            Ok(CreateUploadReply::Unrecognized(text)) => {
                warn!(path = %file.path.display(), reply = %text, "unrecognized create-upload reply");
                return Ending::failed(TransferCode::UnknownResponse);
            }
            Err(e) => {
                warn!(path = %file.path.display(), "create upload failed: {e}");
                return Ending::failed(e.to_code(TransferCode::CreateError));
            }
        };

        if info.data_exists {
            debug!(path = %file.path.display(), "content already on server, quick upload");
            return self.commit(&info, true).await;
        }

        debug!(
            path = %file.path.display(),
            node = %info.upload_url,
            size = file.size,
            "streaming upload data"
        );
        let body = match file_body(file, progress).await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %file.path.display(), "open for upload failed: {e}");
                return Ending::failed(TransferCode::PathError);
            }
        };
        if let Err(e) = self.api.upload_data(&info, file.size, body).await {
            warn!(path = %file.path.display(), "upload data failed: {e}");
            return Ending::failed(e.to_code(TransferCode::Failed));
        }

        self.commit(&info, false).await
    }
}

#[async_trait]
impl UploadStrategy for QuickUploader {
    fn name(&self) -> &'static str {
        "client"
    }

    fn supports_quick_upload(&self) -> bool {
        true
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        folder_id: &str,
        _force: bool,
        progress: Option<&ProgressFn>,
    ) -> UploadOutcome {
        let label = local_path.display().to_string();
        let ending = match inspect(local_path).await {
            Some(file) => self.run(&file, folder_id, progress).await,
            None => Ending::failed(TransferCode::PathError),
        };
        finish(self.name(), local_path, label, ending, progress)
    }
}

// ── Web API: check existing → multipart upload ───────────────────────────

pub struct BasicUploader {
    api: Arc<dyn CloudApi>,
}

impl BasicUploader {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    /// Id of a same-name, same-size file already in the folder
    async fn find_existing(&self, file: &LocalFile, folder_id: &str) -> Option<String> {
        match self.api.list_folder(folder_id).await {
            Ok(records) => records
                .into_iter()
                .find(|r| !r.is_folder && r.name == file.name && r.size == file.size)
                .map(|r| r.id),
            Err(e) => {
                warn!(folder_id, "existence check failed, uploading anyway: {e}");
                None
            }
        }
    }

    async fn run(
        &self,
        file: &LocalFile,
        folder_id: &str,
        force: bool,
        progress: Option<&ProgressFn>,
    ) -> Ending {
        if !force {
            if let Some(id) = self.find_existing(file, folder_id).await {
                debug!(path = %file.path.display(), id = %id, "already uploaded");
                return Ending::exists(id);
            }
        }

        let target = match self.api.web_upload_target().await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %file.path.display(), "no web upload node: {e}");
                return Ending::failed(e.to_code(TransferCode::Failed));
            }
        };
        let body = match file_body(file, progress).await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %file.path.display(), "open for upload failed: {e}");
                return Ending::failed(TransferCode::PathError);
            }
        };

        match self
            .api
            .web_upload(&target, folder_id, &file.name, file.size, body)
            .await
        {
            Ok(id) => Ending::done(id, false),
            Err(e) => {
                warn!(path = %file.path.display(), "web upload failed: {e}");
                Ending::failed(e.to_code(TransferCode::Failed))
            }
        }
    }
}

#[async_trait]
impl UploadStrategy for BasicUploader {
    fn name(&self) -> &'static str {
        "web"
    }

    fn supports_quick_upload(&self) -> bool {
        false
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        folder_id: &str,
        force: bool,
        progress: Option<&ProgressFn>,
    ) -> UploadOutcome {
        let label = local_path.display().to_string();
        let ending = match inspect(local_path).await {
            Some(file) => self.run(&file, folder_id, force, progress).await,
            None => Ending::failed(TransferCode::PathError),
        };
        finish(self.name(), local_path, label, ending, progress)
    }
}
