//! c189-api: Cloud189 session/transport collaborator
//!
//! - `CloudApi`: the capability the transfer state machines drive
//! - `HttpSession`: reqwest implementation against the live web and client APIs
//! - `sign`: HMAC-SHA1 request signatures for the client API
//! - `xml`: flat XML replies from the upload endpoints

pub mod client;
pub mod error;
pub mod http;
pub mod sign;
pub mod wire;
pub mod xml;

pub use client::{
    CloudApi, CreateUploadReply, CreateUploadRequest, DownloadBody, DownloadResponse,
    UploadBody, UploadCreateInfo, WebUploadTarget,
};
pub use error::{ApiError, ApiResult};
pub use http::HttpSession;
