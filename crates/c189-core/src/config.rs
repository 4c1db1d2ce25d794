use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{C189Error, C189Result};

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct C189Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub transfer: TransferConfig,
    pub log: LogConfig,
}

impl C189Config {
    /// Parse a config file body; missing sections and keys take defaults
    pub fn from_toml(text: &str) -> C189Result<Self> {
        toml::from_str(text).map_err(|e| C189Error::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Web API host (listing, folders, web upload)
    pub web_url: String,
    /// Client API host (create/commit upload, signed requests)
    pub api_url: String,
    /// Per-request timeout in seconds; body streaming is not bounded
    pub timeout_secs: u64,
    /// Skip TLS verification (some service nodes use a legacy chain)
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

/// Credentials produced by an external login step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Value of the `COOKIE_LOGIN_USER` web cookie
    pub cookie_login_user: Option<String>,
    pub session_key: Option<String>,
    pub session_secret: Option<String>,
    pub access_token: Option<String>,
}

impl SessionConfig {
    /// Client-API upload needs all three of key, secret and token
    pub fn has_client_credentials(&self) -> bool {
        [&self.session_key, &self.session_secret, &self.access_token]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Local directory downloads are saved into
    pub save_dir: PathBuf,
    /// Send an empty checksum on create-upload (disables quick upload)
    pub skip_checksum: bool,
    /// Remote folder used when a command names none (`-11` is the drive root)
    pub default_folder_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn, keeps the live task board readable)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            web_url: "https://cloud.189.cn".into(),
            api_url: "https://api.cloud.189.cn".into(),
            timeout_secs: 15,
            accept_invalid_certs: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:74.0) Gecko/20100101 Firefox/76.0"
                .into(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./Download"),
            skip_checksum: false,
            default_folder_id: "-11".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}
