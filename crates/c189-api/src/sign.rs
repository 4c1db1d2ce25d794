//! Client API request signing
//!
//! Signature = uppercase hex HMAC-SHA1, keyed by the session secret, over
//! `SessionKey=<k>&Operate=<verb>&RequestURI=<path>&Date=<date>` where
//! `<path>` is the request URL path without its query.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 1123 date in the form the signature and `Date` header use
pub fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Path component of `url`, `/` when it has none or cannot be parsed
pub fn request_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) if !u.path().is_empty() => u.path().to_string(),
        _ => "/".to_string(),
    }
}

pub fn sign(secret: &str, session_key: &str, verb: &str, url: &str, date: &str) -> String {
    let data = format!(
        "SessionKey={}&Operate={}&RequestURI={}&Date={}",
        session_key,
        verb,
        request_path(url),
        date
    );

    // HMAC accepts keys of any length
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC key of any size");
    mac.update(data.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}
