//! In-memory `CloudApi` for transfer tests.
//!
//! Keeps a flat table of remote entries plus file contents, and counts calls
//! per endpoint so tests can assert which requests a state machine made.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use c189_api::{
    ApiError, ApiResult, CloudApi, CreateUploadReply, CreateUploadRequest, DownloadResponse,
    UploadBody, UploadCreateInfo, WebUploadTarget,
};
use c189_core::{FileRecord, ProgressEvent, ProgressFn};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const ROOT: &str = "-11";

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub list_folder: usize,
    pub create_folder: Vec<(String, String)>,
    pub file_info: usize,
    pub create_upload: usize,
    pub upload_data: usize,
    pub commit_upload: usize,
    pub web_upload_target: usize,
    pub web_upload: usize,
    pub folder_zip_url: usize,
    /// Range start of every download request
    pub download_offsets: Vec<u64>,
}

struct Pending {
    parent: String,
    name: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: Vec<FileRecord>,
    contents: HashMap<String, Vec<u8>>,
    /// Stored content by checksum (what quick upload matches against)
    blobs: HashMap<String, Vec<u8>>,
    pending: HashMap<String, Pending>,
    calls: Calls,
    quota_exhausted: bool,
    illegal_names: HashSet<String>,
    failing_folders: HashSet<String>,
    fail_download_after: Option<u64>,
    ignore_range: bool,
    create_error: Option<fn() -> ApiError>,
    unrecognized_create: bool,
    reject_data: bool,
    fail_commit: bool,
}

impl State {
    fn alloc_id(&mut self) -> String {
        self.next_id += 1;
        (1000 + self.next_id).to_string()
    }

    fn insert_file(&mut self, parent: &str, name: &str, data: Vec<u8>) -> String {
        let id = self.alloc_id();
        self.blobs
            .insert(c189_chunks::checksum_bytes(&data), data.clone());
        self.entries.push(FileRecord {
            id: id.clone(),
            parent_id: parent.to_string(),
            name: name.to_string(),
            size: data.len() as u64,
            is_folder: false,
            created_time: "2024-01-01 00:00:00".into(),
            modified_time: "2024-01-01 00:00:00".into(),
            download_url: Some(format!("//fake.test/dl/{id}")),
        });
        self.contents.insert(id.clone(), data);
        id
    }
}

pub struct FakeCloud {
    client_session: bool,
    state: Mutex<State>,
}

impl FakeCloud {
    /// Web-only session (no client API credentials)
    pub fn web() -> Arc<Self> {
        Arc::new(Self {
            client_session: false,
            state: Mutex::new(State::default()),
        })
    }

    /// Session with client API credentials (quick upload capable)
    pub fn client() -> Arc<Self> {
        Arc::new(Self {
            client_session: true,
            state: Mutex::new(State::default()),
        })
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn add_file(&self, parent: &str, name: &str, data: &[u8]) -> String {
        self.state.lock().unwrap().insert_file(parent, name, data.to_vec())
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        let mut st = self.state.lock().unwrap();
        let id = st.alloc_id();
        st.entries.push(FileRecord {
            id: id.clone(),
            parent_id: parent.to_string(),
            name: name.to_string(),
            is_folder: true,
            ..Default::default()
        });
        id
    }

    /// Content the server already stores, without a visible entry
    pub fn seed_content(&self, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .blobs
            .insert(c189_chunks::checksum_bytes(data), data.to_vec());
    }

    pub fn set_quota_exhausted(&self) {
        self.state.lock().unwrap().quota_exhausted = true;
    }

    pub fn reject_name(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .illegal_names
            .insert(name.to_string());
    }

    pub fn fail_mkdir(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_folders
            .insert(name.to_string());
    }

    /// Next download stream breaks once this absolute byte offset is reached
    pub fn fail_next_download_after(&self, offset: u64) {
        self.state.lock().unwrap().fail_download_after = Some(offset);
    }

    pub fn ignore_range(&self) {
        self.state.lock().unwrap().ignore_range = true;
    }

    /// Create-upload requests fail with the error `make` builds
    pub fn create_error(&self, make: fn() -> ApiError) {
        self.state.lock().unwrap().create_error = Some(make);
    }

    /// Create-upload answers with a reply of no known shape
    pub fn unrecognized_create(&self) {
        self.state.lock().unwrap().unrecognized_create = true;
    }

    /// The upload node refuses data PUTs
    pub fn reject_data(&self) {
        self.state.lock().unwrap().reject_data = true;
    }

    /// Commits are refused, whether data was sent or not
    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn entry(&self, id: &str) -> Option<FileRecord> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn children(&self, parent: &str) -> Vec<FileRecord> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.parent_id == parent)
            .cloned()
            .collect()
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().contents.get(id).cloned()
    }
}

async fn drain(mut body: UploadBody) -> ApiResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

#[async_trait]
impl CloudApi for FakeCloud {
    fn has_client_session(&self) -> bool {
        self.client_session
    }

    async fn list_folder(&self, folder_id: &str) -> ApiResult<Vec<FileRecord>> {
        self.state.lock().unwrap().calls.list_folder += 1;
        Ok(self.children(folder_id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> ApiResult<String> {
        let mut st = self.state.lock().unwrap();
        st.calls
            .create_folder
            .push((parent_id.to_string(), name.to_string()));
        if st.failing_folders.contains(name) {
            return Err(ApiError::Rejected {
                code: "MkdirError".into(),
                message: name.into(),
            });
        }
        if let Some(existing) = st
            .entries
            .iter()
            .find(|e| e.is_folder && e.parent_id == parent_id && e.name == name)
        {
            return Ok(existing.id.clone());
        }
        let id = st.alloc_id();
        st.entries.push(FileRecord {
            id: id.clone(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            is_folder: true,
            ..Default::default()
        });
        Ok(id)
    }

    async fn file_info(&self, file_id: &str) -> ApiResult<FileRecord> {
        self.state.lock().unwrap().calls.file_info += 1;
        self.entry(file_id).ok_or(ApiError::Rejected {
            code: "FileNotFound".into(),
            message: file_id.into(),
        })
    }

    async fn create_upload(&self, req: &CreateUploadRequest) -> ApiResult<CreateUploadReply> {
        let mut st = self.state.lock().unwrap();
        st.calls.create_upload += 1;
        if let Some(make) = st.create_error {
            return Err(make());
        }
        if st.unrecognized_create {
            return Ok(CreateUploadReply::Unrecognized(
                "<html>maintenance</html>".into(),
            ));
        }
        if st.quota_exhausted {
            return Ok(CreateUploadReply::QuotaExhausted);
        }
        if st.illegal_names.contains(&req.file_name) {
            return Ok(CreateUploadReply::Illegal);
        }
        let upload_file_id = format!("up-{}", st.alloc_id());
        let existing = if req.md5.is_empty() {
            None
        } else {
            st.blobs.get(&req.md5).cloned()
        };
        let data_exists = existing.is_some();
        st.pending.insert(
            upload_file_id.clone(),
            Pending {
                parent: req.parent_folder_id.clone(),
                name: req.file_name.clone(),
                data: existing.unwrap_or_default(),
            },
        );
        Ok(CreateUploadReply::Created(UploadCreateInfo {
            upload_file_id,
            upload_url: "https://upload.fake.test/data".into(),
            commit_url: "https://upload.fake.test/commit".into(),
            data_exists,
        }))
    }

    async fn upload_data(
        &self,
        info: &UploadCreateInfo,
        size: u64,
        body: UploadBody,
    ) -> ApiResult<()> {
        {
            let mut st = self.state.lock().unwrap();
            st.calls.upload_data += 1;
            if st.reject_data {
                return Err(ApiError::Status(403));
            }
        }
        let data = drain(body).await?;
        if data.len() as u64 != size {
            return Err(ApiError::Rejected {
                code: "SizeMismatch".into(),
                message: format!("{} != {size}", data.len()),
            });
        }
        let mut st = self.state.lock().unwrap();
        let pending = st
            .pending
            .get_mut(&info.upload_file_id)
            .ok_or(ApiError::Status(404))?;
        pending.data = data;
        Ok(())
    }

    async fn commit_upload(&self, info: &UploadCreateInfo) -> ApiResult<String> {
        let mut st = self.state.lock().unwrap();
        st.calls.commit_upload += 1;
        if st.fail_commit {
            return Err(ApiError::Rejected {
                code: "CommitFailed".into(),
                message: info.upload_file_id.clone(),
            });
        }
        let pending = st
            .pending
            .remove(&info.upload_file_id)
            .ok_or(ApiError::Status(404))?;
        Ok(st.insert_file(&pending.parent, &pending.name, pending.data))
    }

    async fn web_upload_target(&self) -> ApiResult<WebUploadTarget> {
        self.state.lock().unwrap().calls.web_upload_target += 1;
        Ok(WebUploadTarget {
            upload_url: "https://upload.fake.test/web".into(),
            session_key: "page-session".into(),
        })
    }

    async fn web_upload(
        &self,
        _target: &WebUploadTarget,
        parent_id: &str,
        file_name: &str,
        _size: u64,
        body: UploadBody,
    ) -> ApiResult<String> {
        self.state.lock().unwrap().calls.web_upload += 1;
        let data = drain(body).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .insert_file(parent_id, file_name, data))
    }

    async fn folder_zip_url(&self, folder_id: &str) -> ApiResult<String> {
        self.state.lock().unwrap().calls.folder_zip_url += 1;
        match self.entry(folder_id) {
            Some(e) if e.is_folder => Ok(format!("https://fake.test/zip/{folder_id}")),
            _ => Err(ApiError::Status(404)),
        }
    }

    async fn open_download(&self, url: &str, offset: u64) -> ApiResult<DownloadResponse> {
        let mut st = self.state.lock().unwrap();
        st.calls.download_offsets.push(offset);
        let fail_after = st.fail_download_after.take();

        let (data, file_name, content_length) = if let Some(id) = url.rsplit_once("/zip/").map(|(_, id)| id) {
            let folder = st
                .entries
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(ApiError::Status(404))?;
            let mut archive = Vec::new();
            for child in st.entries.iter().filter(|e| e.parent_id == id && !e.is_folder) {
                archive.extend_from_slice(child.name.as_bytes());
                archive.extend_from_slice(st.contents.get(&child.id).map(Vec::as_slice).unwrap_or_default());
            }
            (archive, Some(format!("{}.zip", folder.name)), None)
        } else {
            let id = url.rsplit('/').next().unwrap_or_default();
            let data = st.contents.get(id).cloned().ok_or(ApiError::Status(404))?;
            let name = st.entries.iter().find(|e| e.id == id).map(|e| e.name.clone());
            let len = data.len() as u64;
            (data, name, Some(len))
        };

        let partial = offset > 0 && !st.ignore_range;
        let start = if partial { offset as usize } else { 0 };
        let content_length = if partial {
            content_length.map(|l| l - offset)
        } else {
            content_length
        };

        let mut pieces: Vec<ApiResult<Bytes>> = Vec::new();
        let mut pos = start;
        while pos < data.len() {
            if let Some(limit) = fail_after {
                if pos as u64 >= limit {
                    pieces.push(Err(ApiError::Network("connection reset".into())));
                    break;
                }
            }
            let mut end = (pos + 700).min(data.len());
            if let Some(limit) = fail_after {
                end = end.min(limit as usize).max(pos + 1);
            }
            pieces.push(Ok(Bytes::copy_from_slice(&data[pos..end])));
            pos = end;
        }

        Ok(DownloadResponse {
            file_name,
            content_length,
            partial,
            body: futures::stream::iter(pieces).boxed(),
        })
    }
}

/// Progress callback recording every event
pub fn recorder() -> (ProgressFn, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let cb: ProgressFn = Arc::new(move |e: &ProgressEvent| sink.lock().unwrap().push(e.clone()));
    (cb, events)
}

/// `done` values of all byte events, in order
pub fn byte_counts(events: &[ProgressEvent]) -> Vec<(u64, Option<u64>)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Bytes { done, total, .. } => Some((*done, *total)),
            _ => None,
        })
        .collect()
}

pub fn terminal_tags(events: &[ProgressEvent]) -> Vec<c189_core::TerminalTag> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Terminal { tag, .. } => Some(*tag),
            _ => None,
        })
        .collect()
}
