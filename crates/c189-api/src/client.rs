//! The transport capability the transfer state machines are written against

use async_trait::async_trait;
use bytes::Bytes;
use c189_core::FileRecord;
use futures::stream::BoxStream;
use futures::Stream;
use std::pin::Pin;

use crate::error::ApiResult;

/// Request body for data uploads
pub type UploadBody = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Response body of a download
pub type DownloadBody = BoxStream<'static, ApiResult<Bytes>>;

/// Metadata sent with a create-upload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUploadRequest {
    pub parent_folder_id: String,
    pub file_name: String,
    pub size: u64,
    /// Uppercase hex MD5, empty when checksumming was skipped
    pub md5: String,
    pub local_path: String,
}

/// Upload session returned by create-upload; used once then dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCreateInfo {
    pub upload_file_id: String,
    pub upload_url: String,
    pub commit_url: String,
    /// Server already holds content with this checksum
    pub data_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateUploadReply {
    Created(UploadCreateInfo),
    QuotaExhausted,
    Illegal,
    /// Reply carried none of the known shapes; holds the raw text
    Unrecognized(String),
}

/// Web upload node plus the page session key it expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUploadTarget {
    pub upload_url: String,
    pub session_key: String,
}

pub struct DownloadResponse {
    /// From `Content-Disposition`, when present
    pub file_name: Option<String>,
    pub content_length: Option<u64>,
    /// Server honoured the requested range (206)
    pub partial: bool,
    pub body: DownloadBody,
}

impl std::fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

/// Authenticated session shared by every running task.
///
/// Implementations are read-only after construction so concurrent tasks can
/// issue requests without coordinating.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Key, secret and token are present, so the signed client API (and quick
    /// upload) is usable
    fn has_client_session(&self) -> bool;

    /// All entries of a folder, following pagination
    async fn list_folder(&self, folder_id: &str) -> ApiResult<Vec<FileRecord>>;

    /// Create `name` under `parent_id`; returns the existing id if present
    async fn create_folder(&self, parent_id: &str, name: &str) -> ApiResult<String>;

    async fn file_info(&self, file_id: &str) -> ApiResult<FileRecord>;

    async fn create_upload(&self, req: &CreateUploadRequest) -> ApiResult<CreateUploadReply>;

    /// PUT the whole file body to the upload node
    async fn upload_data(
        &self,
        info: &UploadCreateInfo,
        size: u64,
        body: UploadBody,
    ) -> ApiResult<()>;

    /// Confirm an upload session; returns the new remote file id
    async fn commit_upload(&self, info: &UploadCreateInfo) -> ApiResult<String>;

    async fn web_upload_target(&self) -> ApiResult<WebUploadTarget>;

    /// Multipart upload through the web node; returns the new remote file id
    async fn web_upload(
        &self,
        target: &WebUploadTarget,
        parent_id: &str,
        file_name: &str,
        size: u64,
        body: UploadBody,
    ) -> ApiResult<String>;

    /// Redirect target for a server-side zip of a folder
    async fn folder_zip_url(&self, folder_id: &str) -> ApiResult<String>;

    /// GET `url` starting at byte `offset`
    async fn open_download(&self, url: &str, offset: u64) -> ApiResult<DownloadResponse>;
}
