//! Records each decrypted request/response exchange as a HAR (HTTP
//! Archive) entry, the same format browser devtools export, so captured
//! traffic can be opened in any HAR viewer.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

/// Bodies larger than this are recorded truncated; full capture isn't the
/// point, confirming what was sent and received is.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct HarContent {
    pub size: usize,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<HarHeader>,
}

#[derive(Debug, Serialize)]
pub struct HarResponse {
    pub status: u16,
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
}

#[derive(Debug, Serialize)]
pub struct HarEntry {
    #[serde(rename = "startedDateTime")]
    pub started_date_time: String,
    pub request: HarRequest,
    pub response: HarResponse,
}

pub struct HarRecorder {
    entries: Mutex<Vec<HarEntry>>,
    path: Option<PathBuf>,
}

impl HarRecorder {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path,
        }
    }

    /// Caps a body to [`MAX_BODY_BYTES`] and records it as a new entry.
    pub fn record(
        &self,
        started_date_time: String,
        method: String,
        url: String,
        request_headers: Vec<HarHeader>,
        status: u16,
        response_headers: Vec<HarHeader>,
        mime_type: String,
        body: &[u8],
    ) {
        let truncated = &body[..body.len().min(MAX_BODY_BYTES)];
        let entry = HarEntry {
            started_date_time,
            request: HarRequest {
                method,
                url,
                headers: request_headers,
            },
            response: HarResponse {
                status,
                headers: response_headers,
                content: HarContent {
                    size: body.len(),
                    mime_type,
                    text: String::from_utf8_lossy(truncated).into_owned(),
                },
            },
        };
        self.entries.lock().unwrap().push(entry);
    }

    /// Writes the accumulated log to the configured path, if one was given.
    /// A no-op otherwise, so callers don't need to branch on whether HAR
    /// recording was requested.
    pub fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        self.flush_to(path)
    }

    fn flush_to(&self, path: &Path) -> std::io::Result<()> {
        let entries = self.entries.lock().unwrap();
        let document = serde_json::json!({
            "log": {
                "version": "1.2",
                "creator": { "name": "interceptor", "version": env!("CARGO_PKG_VERSION") },
                "entries": *entries,
            }
        });
        let bytes = serde_json::to_vec_pretty(&document)?;
        std::fs::write(path, bytes)
    }
}
