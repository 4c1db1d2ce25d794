//! Test doubles for the task manager: a web-only in-memory drive and a
//! hand-released task.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use c189_api::{
    ApiError, ApiResult, CloudApi, CreateUploadReply, CreateUploadRequest, DownloadResponse,
    UploadBody, UploadCreateInfo, WebUploadTarget,
};
use c189_core::{FileRecord, StatusTag, TaskKind, TaskProgress};
use c189_tasks::{CmdInfo, TaskManager, TransferTask};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const ROOT: &str = "-11";

#[derive(Default)]
struct Drive {
    next_id: u64,
    entries: Vec<FileRecord>,
    contents: HashMap<String, Vec<u8>>,
    failing_uploads: HashSet<String>,
}

/// Web-session drive: no quick upload, uploads go through `web_upload`
#[derive(Default)]
pub struct MemDrive {
    drive: Mutex<Drive>,
}

impl MemDrive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_file(&self, parent: &str, name: &str, data: &[u8]) -> String {
        let mut d = self.drive.lock().unwrap();
        insert(&mut d, parent, name, data.to_vec())
    }

    /// Uploads of `name` fail at the transport level
    pub fn fail_upload(&self, name: &str) {
        self.drive.lock().unwrap().failing_uploads.insert(name.to_string());
    }

    pub fn children(&self, parent: &str) -> Vec<FileRecord> {
        let d = self.drive.lock().unwrap();
        d.entries
            .iter()
            .filter(|e| e.parent_id == parent)
            .cloned()
            .collect()
    }
}

fn insert(d: &mut Drive, parent: &str, name: &str, data: Vec<u8>) -> String {
    d.next_id += 1;
    let id = d.next_id.to_string();
    d.entries.push(FileRecord {
        id: id.clone(),
        parent_id: parent.to_string(),
        name: name.to_string(),
        size: data.len() as u64,
        download_url: Some(format!("//mem.test/dl/{id}")),
        ..Default::default()
    });
    d.contents.insert(id.clone(), data);
    id
}

#[async_trait]
impl CloudApi for MemDrive {
    fn has_client_session(&self) -> bool {
        false
    }

    async fn list_folder(&self, folder_id: &str) -> ApiResult<Vec<FileRecord>> {
        Ok(self.children(folder_id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> ApiResult<String> {
        let mut d = self.drive.lock().unwrap();
        if let Some(e) = d
            .entries
            .iter()
            .find(|e| e.is_folder && e.parent_id == parent_id && e.name == name)
        {
            return Ok(e.id.clone());
        }
        d.next_id += 1;
        let id = d.next_id.to_string();
        d.entries.push(FileRecord {
            id: id.clone(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            is_folder: true,
            ..Default::default()
        });
        Ok(id)
    }

    async fn file_info(&self, file_id: &str) -> ApiResult<FileRecord> {
        let d = self.drive.lock().unwrap();
        d.entries
            .iter()
            .find(|e| e.id == file_id)
            .cloned()
            .ok_or(ApiError::Rejected {
                code: "FileNotFound".into(),
                message: file_id.into(),
            })
    }

    async fn create_upload(&self, _req: &CreateUploadRequest) -> ApiResult<CreateUploadReply> {
        Err(ApiError::NotAuthenticated)
    }

    async fn upload_data(
        &self,
        _info: &UploadCreateInfo,
        _size: u64,
        _body: UploadBody,
    ) -> ApiResult<()> {
        Err(ApiError::NotAuthenticated)
    }

    async fn commit_upload(&self, _info: &UploadCreateInfo) -> ApiResult<String> {
        Err(ApiError::NotAuthenticated)
    }

    async fn web_upload_target(&self) -> ApiResult<WebUploadTarget> {
        Ok(WebUploadTarget {
            upload_url: "https://upload.mem.test/web".into(),
            session_key: "page".into(),
        })
    }

    async fn web_upload(
        &self,
        _target: &WebUploadTarget,
        parent_id: &str,
        file_name: &str,
        _size: u64,
        mut body: UploadBody,
    ) -> ApiResult<String> {
        if self.drive.lock().unwrap().failing_uploads.contains(file_name) {
            return Err(ApiError::Network("connection reset".into()));
        }
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        let mut d = self.drive.lock().unwrap();
        Ok(insert(&mut d, parent_id, file_name, data))
    }

    async fn folder_zip_url(&self, _folder_id: &str) -> ApiResult<String> {
        Err(ApiError::Status(404))
    }

    async fn open_download(&self, url: &str, offset: u64) -> ApiResult<DownloadResponse> {
        let id = url.rsplit('/').next().unwrap_or_default().to_string();
        let data = self
            .drive
            .lock()
            .unwrap()
            .contents
            .get(&id)
            .cloned()
            .ok_or(ApiError::Status(404))?;
        let start = (offset as usize).min(data.len());
        let rest = Bytes::copy_from_slice(&data[start..]);
        Ok(DownloadResponse {
            file_name: None,
            content_length: Some(rest.len() as u64),
            partial: offset > 0,
            body: futures::stream::iter(vec![Ok(rest)]).boxed(),
        })
    }
}

/// A task that blocks in `run` until a gate permit is added, then reports
/// done or failed
pub struct GateTask {
    key: String,
    gate: Arc<Semaphore>,
    fail: bool,
    runs: Arc<AtomicUsize>,
    progress: Mutex<TaskProgress>,
    errors: Mutex<Vec<String>>,
}

impl GateTask {
    pub fn new(key: &str, gate: Arc<Semaphore>, runs: Arc<AtomicUsize>) -> Arc<Self> {
        Self::build(key, gate, runs, false)
    }

    pub fn failing(key: &str, gate: Arc<Semaphore>, runs: Arc<AtomicUsize>) -> Arc<Self> {
        Self::build(key, gate, runs, true)
    }

    fn build(key: &str, gate: Arc<Semaphore>, runs: Arc<AtomicUsize>, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            gate,
            fail,
            runs,
            progress: Mutex::new(TaskProgress::default()),
            errors: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TransferTask for GateTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn cmd_info(&self) -> CmdInfo {
        CmdInfo {
            kind: TaskKind::Download,
            source: self.key.clone(),
            target: "/save".into(),
        }
    }

    fn summary(&self) -> String {
        format!("Download: {}", self.key)
    }

    fn progress(&self) -> TaskProgress {
        *self.progress.lock().unwrap()
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    async fn run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.progress.lock().unwrap() = TaskProgress {
            done: 10,
            total: Some(100),
            status: StatusTag::None,
        };
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        if self.fail {
            self.errors
                .lock()
                .unwrap()
                .push(format!("file download failed: network error -> {}", self.key));
        } else {
            *self.progress.lock().unwrap() = TaskProgress {
                done: 100,
                total: Some(100),
                status: StatusTag::None,
            };
        }
    }
}

/// Poll until no task is alive
pub async fn wait_idle(manager: &TaskManager) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while manager.has_alive_task().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tasks did not finish");
}

/// Poll until `runs` reaches `n`
pub async fn wait_runs(runs: &AtomicUsize, n: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while runs.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task never started");
}
