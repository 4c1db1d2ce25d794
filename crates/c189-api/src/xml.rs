//! Flat XML replies from the upload data and commit endpoints
//!
//! Both reply shapes are a root element with text-only children:
//! `<file><id>..</id><name>..</name>..</file>` or
//! `<error><code>..</code><message>..</message></error>`.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};

/// Server code for "data already fully received"; not a failure
pub const UPLOAD_COMPLETED: &str = "UploadFileCompeletedError";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct XmlReply {
    pub root: String,
    pub fields: HashMap<String, String>,
}

impl XmlReply {
    pub fn is_error(&self) -> bool {
        self.root == "error"
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn code(&self) -> &str {
        self.get("code").unwrap_or_default()
    }

    pub fn message(&self) -> &str {
        self.get("message").unwrap_or_default()
    }
}

pub fn parse_reply(text: &str) -> ApiResult<XmlReply> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut reply = XmlReply::default();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match depth {
                    0 => reply.root = name,
                    1 => current = Some(name),
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 0 => {
                reply.root = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
            }
            Event::Text(t) if depth == 2 => {
                if let Some(key) = &current {
                    let value = t.unescape()?.into_owned();
                    reply.fields.insert(key.clone(), value);
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    current = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if reply.root.is_empty() {
        return Err(ApiError::Decode(format!("no XML root element in {text:?}")));
    }
    Ok(reply)
}
