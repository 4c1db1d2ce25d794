//! Config file resolution, environment overrides, and redaction for display

use anyhow::{Context, Result};
use c189_core::config::C189Config;
use std::path::{Path, PathBuf};

/// Session fields that may come from the environment instead of the file
const SESSION_ENV: &[&str] = &[
    "C189_SESSION_KEY",
    "C189_SESSION_SECRET",
    "C189_ACCESS_TOKEN",
    "C189_COOKIE",
];

const MASK: &str = "********";

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// Read the config at `path`, or defaults when there is no file
pub async fn load_config(path: &Path) -> Result<C189Config> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        C189Config::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(C189Config::default())
    }
}

/// Overlay session credentials from `lookup` (normally `std::env::var`)
pub fn apply_env_overrides(config: &mut C189Config, lookup: impl Fn(&str) -> Option<String>) {
    for key in SESSION_ENV {
        let Some(value) = lookup(key) else { continue };
        let slot = match *key {
            "C189_SESSION_KEY" => &mut config.session.session_key,
            "C189_SESSION_SECRET" => &mut config.session.session_secret,
            "C189_ACCESS_TOKEN" => &mut config.session.access_token,
            _ => &mut config.session.cookie_login_user,
        };
        *slot = Some(value);
    }
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Copy of `config` safe to print
pub fn masked(config: &C189Config) -> C189Config {
    let mut out = config.clone();
    for field in [
        &mut out.session.cookie_login_user,
        &mut out.session.session_key,
        &mut out.session.session_secret,
        &mut out.session.access_token,
    ] {
        if field.as_deref().is_some_and(|v| !v.is_empty()) {
            *field = Some(MASK.to_string());
        }
    }
    out
}
