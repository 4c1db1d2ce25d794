//! JSON reply shapes of the web API

use c189_core::FileRecord;
use serde::Deserialize;
use serde_json::Value;

pub const PAGE_SIZE: u64 = 60;

/// Ids arrive as either JSON numbers or strings
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_u64(v: &Value) -> u64 {
    match v {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FileItem {
    pub file_id: Value,
    pub parent_id: Value,
    pub file_name: String,
    pub file_size: Value,
    pub is_folder: bool,
    pub create_time: String,
    pub last_op_time: String,
    pub download_url: Option<String>,
}

impl From<FileItem> for FileRecord {
    fn from(item: FileItem) -> Self {
        FileRecord {
            id: value_to_string(&item.file_id),
            parent_id: value_to_string(&item.parent_id),
            name: item.file_name,
            size: value_to_u64(&item.file_size),
            is_folder: item.is_folder,
            created_time: item.create_time,
            modified_time: item.last_op_time,
            download_url: item.download_url.filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ListFilesPage {
    pub record_count: u64,
    pub page_num: u64,
    pub page_size: u64,
    pub data: Vec<FileItem>,
    pub error_code: Option<String>,
}

impl ListFilesPage {
    pub fn is_last(&self) -> bool {
        self.page_num * self.page_size >= self.record_count
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateFolderReply {
    pub file_id: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CreateUploadFileReply {
    pub res_code: Value,
    pub res_message: String,
    #[serde(rename = "uploadFileId")]
    pub upload_file_id: Value,
    #[serde(rename = "fileUploadUrl")]
    pub file_upload_url: String,
    #[serde(rename = "fileCommitUrl")]
    pub file_commit_url: String,
    #[serde(rename = "fileDataExists")]
    pub file_data_exists: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadUrlReply {
    pub upload_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WebUploadReply {
    pub id: Value,
}

/// Protocol-relative URLs (`//host/path`) get an https scheme
pub fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

/// Pull the file name out of a `Content-Disposition` header value
pub fn disposition_filename(header: &str) -> Option<String> {
    let start = header.find("filename=\"")? + "filename=\"".len();
    let rest = &header[start..];
    let end = rest.rfind('"')?;
    let name = &rest[..end];
    (!name.is_empty()).then(|| name.to_string())
}
