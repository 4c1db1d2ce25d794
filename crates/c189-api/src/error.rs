use c189_core::TransferCode;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure talking to the service.
///
/// `Timeout` is kept apart from other transport failures so callers can tell
/// a slow node from a refused request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("cannot decode reply: {0}")]
    Decode(String),

    #[error("server rejected request: {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("client API credentials are not configured")]
    NotAuthenticated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout)
    }

    /// Transport-level failures map to `NetworkError`; anything else to
    /// `fallback`, the step-specific code.
    pub fn to_code(&self, fallback: TransferCode) -> TransferCode {
        match self {
            ApiError::Timeout | ApiError::Network(_) => TransferCode::NetworkError,
            _ => fallback,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status(status.as_u16())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<quick_xml::Error> for ApiError {
    fn from(e: quick_xml::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<ApiError> for c189_core::C189Error {
    fn from(e: ApiError) -> Self {
        c189_core::C189Error::Api(e.to_string())
    }
}
