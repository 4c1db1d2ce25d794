//! reqwest-backed `CloudApi` against the live service

use async_trait::async_trait;
use c189_core::config::{ApiConfig, SessionConfig};
use c189_core::FileRecord;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, LOCATION, RANGE, REFERER};
use reqwest::{redirect, Client, Method, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{
    CloudApi, CreateUploadReply, CreateUploadRequest, DownloadResponse, UploadBody,
    UploadCreateInfo, WebUploadTarget,
};
use crate::error::{ApiError, ApiResult};
use crate::sign::{http_date, sign};
use crate::wire::{self, value_to_string};
use crate::xml::{parse_reply, UPLOAD_COMPLETED};

/// Query suffix every client API call carries
pub const CLIENT_SUFFIX: &[(&str, &str)] = &[
    ("clientType", "TELEMAC"),
    ("version", "1.0.0"),
    ("channelId", "web_cloud.189.cn"),
];

const JSON_ACCEPT: &str = "application/json;charset=UTF-8";

#[derive(Debug, Clone)]
struct ClientCredentials {
    session_key: String,
    session_secret: String,
}

/// Authenticated HTTP session.
///
/// Two clients share one cookie jar: the default one follows redirects, the
/// other stops at the first 302 so the zip download URL can be read.
/// Metadata calls are bounded by `timeout`; body transfers are not.
pub struct HttpSession {
    client: Client,
    no_redirect: Client,
    web_url: String,
    api_url: String,
    timeout: Duration,
    credentials: Option<ClientCredentials>,
}

impl HttpSession {
    pub fn new(api: &ApiConfig, session: &SessionConfig) -> ApiResult<Self> {
        let web: url::Url = api
            .web_url
            .parse()
            .map_err(|e| ApiError::Decode(format!("invalid web_url {}: {e}", api.web_url)))?;

        let jar = Arc::new(reqwest::cookie::Jar::default());
        if let Some(cookie) = session.cookie_login_user.as_deref().filter(|c| !c.is_empty()) {
            jar.add_cookie_str(&format!("COOKIE_LOGIN_USER={cookie}; Path=/"), &web);
        }

        let builder = |policy: redirect::Policy| {
            Client::builder()
                .cookie_provider(jar.clone())
                .danger_accept_invalid_certs(api.accept_invalid_certs)
                .connect_timeout(Duration::from_secs(api.timeout_secs))
                .user_agent(api.user_agent.clone())
                .redirect(policy)
                .build()
        };

        let credentials = if session.has_client_credentials() {
            Some(ClientCredentials {
                session_key: session.session_key.clone().unwrap_or_default(),
                session_secret: session.session_secret.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Self {
            client: builder(redirect::Policy::limited(10))?,
            no_redirect: builder(redirect::Policy::none())?,
            web_url: api.web_url.trim_end_matches('/').to_string(),
            api_url: api.api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(api.timeout_secs),
            credentials,
        })
    }

    fn web(&self, path: &str) -> String {
        format!("{}{}", self.web_url, path)
    }

    /// Attach SessionKey/Date/Signature headers for a client API call
    fn signed(&self, method: Method, url: &str) -> ApiResult<RequestBuilder> {
        let creds = self.credentials.as_ref().ok_or(ApiError::NotAuthenticated)?;
        let date = http_date();
        let signature = sign(
            &creds.session_secret,
            &creds.session_key,
            method.as_str(),
            url,
            &date,
        );
        Ok(self
            .client
            .request(method, url)
            .query(CLIENT_SUFFIX)
            .header("SessionKey", &creds.session_key)
            .header("Date", date)
            .header("Signature", signature)
            .header("Accept", JSON_ACCEPT))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<T> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .header("Accept", JSON_ACCEPT)
            .header(REFERER, &self.web_url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{e}: {}", truncate(&text))))
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[async_trait]
impl CloudApi for HttpSession {
    fn has_client_session(&self) -> bool {
        self.credentials.is_some()
    }

    async fn list_folder(&self, folder_id: &str) -> ApiResult<Vec<FileRecord>> {
        let url = self.web("/v2/listFiles.action");
        let page_size = wire::PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page_num = 1u64;

        loop {
            let page_str = page_num.to_string();
            let page: wire::ListFilesPage = self
                .get_json(
                    &url,
                    &[
                        ("fileId", folder_id),
                        ("inGroupSpace", "false"),
                        ("orderBy", "1"),
                        ("order", "ASC"),
                        ("pageNum", page_str.as_str()),
                        ("pageSize", page_size.as_str()),
                    ],
                )
                .await?;

            if let Some(code) = page.error_code.as_deref().filter(|c| !c.is_empty()) {
                return Err(ApiError::Rejected {
                    code: code.to_string(),
                    message: format!("listing folder {folder_id}"),
                });
            }

            let last = page.is_last() || page.data.is_empty();
            records.extend(page.data.into_iter().map(FileRecord::from));
            if last {
                break;
            }
            page_num += 1;
            // Bursts of listing calls get throttled
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        debug!(folder_id, count = records.len(), "listed folder");
        Ok(records)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> ApiResult<String> {
        let url = self.web("/v2/createFolder.action");
        let reply: wire::CreateFolderReply = self
            .get_json(&url, &[("parentId", parent_id), ("fileName", name)])
            .await?;
        let id = value_to_string(&reply.file_id);
        if id.is_empty() {
            return Err(ApiError::Rejected {
                code: "MkdirError".into(),
                message: format!("no folder id for {name} under {parent_id}"),
            });
        }
        debug!(parent_id, name, id = %id, "created folder");
        Ok(id)
    }

    async fn file_info(&self, file_id: &str) -> ApiResult<FileRecord> {
        let url = self.web("/v2/getFileInfo.action");
        let item: wire::FileItem = self.get_json(&url, &[("fileId", file_id)]).await?;
        let record = FileRecord::from(item);
        if record.id.is_empty() {
            return Err(ApiError::Rejected {
                code: "FileNotFound".into(),
                message: format!("no metadata for file {file_id}"),
            });
        }
        Ok(record)
    }

    async fn create_upload(&self, req: &CreateUploadRequest) -> ApiResult<CreateUploadReply> {
        let url = format!("{}/createUploadFile.action", self.api_url);
        let size = req.size.to_string();
        let resp = self
            .signed(Method::POST, &url)?
            .header("Sign-Type", "1")
            .timeout(self.timeout)
            .form(&[
                ("parentFolderId", req.parent_folder_id.as_str()),
                ("baseFileId", ""),
                ("fileName", req.file_name.as_str()),
                ("size", size.as_str()),
                ("md5", req.md5.as_str()),
                ("lastWrite", ""),
                ("localPath", req.local_path.as_str()),
                ("opertype", "1"),
                ("flag", "1"),
                ("resumePolicy", "1"),
                ("isLog", "0"),
            ])
            .send()
            .await?;

        let text = resp.text().await?;
        let reply: wire::CreateUploadFileReply = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) => return Ok(CreateUploadReply::Unrecognized(text)),
        };

        if reply.res_message == "UserDayFlowOverLimited" {
            return Ok(CreateUploadReply::QuotaExhausted);
        }
        if value_to_string(&reply.res_code) == "InfoSecurityErrorCode" {
            return Ok(CreateUploadReply::Illegal);
        }
        let upload_file_id = value_to_string(&reply.upload_file_id);
        if upload_file_id.is_empty() || reply.file_upload_url.is_empty() {
            return Ok(CreateUploadReply::Unrecognized(text));
        }

        let data_exists = match &reply.file_data_exists {
            serde_json::Value::Bool(b) => *b,
            v => value_to_string(v) == "1",
        };
        Ok(CreateUploadReply::Created(UploadCreateInfo {
            upload_file_id,
            upload_url: reply.file_upload_url,
            commit_url: reply.file_commit_url,
            data_exists,
        }))
    }

    async fn upload_data(
        &self,
        info: &UploadCreateInfo,
        size: u64,
        body: UploadBody,
    ) -> ApiResult<()> {
        let resp = self
            .signed(Method::PUT, &info.upload_url)?
            .header("Edrive-UploadFileId", &info.upload_file_id)
            .header("Content-Type", "application/octet-stream")
            .header("Edrive-UploadFileRange", format!("0-{size}"))
            .header("ResumePolicy", "1")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(());
        }
        let reply = parse_reply(&text)?;
        if reply.is_error() && reply.code() != UPLOAD_COMPLETED {
            warn!(code = reply.code(), message = reply.message(), "upload data rejected");
            return Err(ApiError::Rejected {
                code: reply.code().to_string(),
                message: reply.message().to_string(),
            });
        }
        Ok(())
    }

    async fn commit_upload(&self, info: &UploadCreateInfo) -> ApiResult<String> {
        let resp = self
            .signed(Method::POST, &info.commit_url)?
            .timeout(self.timeout)
            .form(&[
                ("uploadFileId", info.upload_file_id.as_str()),
                ("opertype", "1"),
                ("isLog", "0"),
                ("ResumePolicy", "1"),
            ])
            .send()
            .await?;

        let text = resp.text().await?;
        let reply = parse_reply(&text)?;
        if reply.is_error() {
            return Err(ApiError::Rejected {
                code: reply.code().to_string(),
                message: reply.message().to_string(),
            });
        }
        match reply.get("id").filter(|id| !id.is_empty()) {
            Some(id) => {
                debug!(
                    id,
                    name = reply.get("name").unwrap_or_default(),
                    created = reply.get("createDate").unwrap_or_default(),
                    "upload committed"
                );
                Ok(id.to_string())
            }
            None => Err(ApiError::Decode(format!(
                "commit reply without id: {}",
                truncate(&text)
            ))),
        }
    }

    async fn web_upload_target(&self) -> ApiResult<WebUploadTarget> {
        let reply: wire::UploadUrlReply = self
            .get_json(&self.web("/v2/getUserUploadUrl.action"), &[])
            .await?;
        let upload_url = reply
            .upload_url
            .filter(|u| !u.is_empty())
            .map(|u| wire::absolute_url(&u))
            .ok_or_else(|| ApiError::Decode("no upload node in reply".into()))?;

        let page = self
            .client
            .get(self.web("/main.action"))
            .header(REFERER, &self.web_url)
            .timeout(self.timeout)
            .send()
            .await?
            .text()
            .await?;
        let session_key = scrape_session_key(&page)
            .ok_or_else(|| ApiError::Decode("no sessionKey on main page".into()))?;

        Ok(WebUploadTarget {
            upload_url,
            session_key,
        })
    }

    async fn web_upload(
        &self,
        target: &WebUploadTarget,
        parent_id: &str,
        file_name: &str,
        size: u64,
        body: UploadBody,
    ) -> ApiResult<String> {
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), size)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new()
            .text("parentId", parent_id.to_string())
            .text("fname", file_name.to_string())
            .text("sessionKey", target.session_key.clone())
            .text("albumId", "undefined")
            .text("opertype", "1")
            .part("upload_file", part);

        let resp = self
            .client
            .post(&target.upload_url)
            .header(REFERER, &self.web_url)
            .multipart(form)
            .send()
            .await?;
        let text = resp.text().await?;
        let reply: wire::WebUploadReply = serde_json::from_str(&text)?;
        let id = value_to_string(&reply.id);
        if id.is_empty() {
            return Err(ApiError::Rejected {
                code: "WebUploadFailed".into(),
                message: truncate(&text).to_string(),
            });
        }
        Ok(id)
    }

    async fn folder_zip_url(&self, folder_id: &str) -> ApiResult<String> {
        let resp = self
            .no_redirect
            .get(self.web("/downloadMultiFiles.action"))
            .query(&[
                ("fileIdS", folder_id),
                ("downloadType", "1"),
                ("recursive", "1"),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if resp.status() != StatusCode::FOUND {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("302 without Location".into()))
    }

    async fn open_download(&self, url: &str, offset: u64) -> ApiResult<DownloadResponse> {
        let mut req = self.client.get(url);
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let headers = resp.headers();
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .and_then(|d| wire::disposition_filename(&d));
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(DownloadResponse {
            file_name,
            content_length,
            partial: status == StatusCode::PARTIAL_CONTENT,
            body: Box::pin(resp.bytes_stream().map_err(ApiError::from)),
        })
    }
}

fn scrape_session_key(page: &str) -> Option<String> {
    let marker = "sessionKey = '";
    let start = page.find(marker)? + marker.len();
    let end = page[start..].find('\'')?;
    let key = &page[start..start + end];
    (!key.is_empty()).then(|| key.to_string())
}
