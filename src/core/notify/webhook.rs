//! Webhook wire format (§6) and the low-level HTTP send path. Receiver is
//! Discord-compatible but the shapes are generic. Grounded in the teacher's
//! isahc usage (`proxy_health/client.rs`) for request construction and
//! timeout handling.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use isahc::config::Configurable;
use isahc::{HttpClient, Request};

#[derive(Debug, Clone, Serialize, Default)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub footer: Option<String>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub embeds: Vec<Embed>,
    pub allowed_mentions: AllowedMentions,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("request build failed: {0}")]
    Build(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    #[error("terminal client error: status {0}")]
    Terminal(u16),
}

impl WebhookError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Send(_) | WebhookError::RateLimited(_))
    }
}

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// POST the JSON-only payload (no attachments).
pub async fn post_json(client: &HttpClient, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
    let body = serde_json::to_vec(payload).map_err(|e| WebhookError::Build(e.to_string()))?;
    let request = Request::post(url)
        .timeout(SEND_TIMEOUT)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| WebhookError::Build(e.to_string()))?;
    send_and_classify(client, request).await
}

/// POST `multipart/form-data` with `payload_json` plus one or more file
/// parts (§6: `file` or `file[0]`).
pub async fn post_multipart(
    client: &HttpClient,
    url: &str,
    payload: &WebhookPayload,
    files: &[(String, Vec<u8>)],
) -> Result<(), WebhookError> {
    let payload_json = serde_json::to_string(payload).map_err(|e| WebhookError::Build(e.to_string()))?;
    let boundary = "----monsterinc-boundary";
    let mut body = Vec::new();

    write_field(&mut body, boundary, "payload_json", payload_json.as_bytes());
    for (i, (filename, content)) in files.iter().enumerate() {
        let field_name = if files.len() == 1 {
            "file".to_string()
        } else {
            format!("file[{i}]")
        };
        write_file_field(&mut body, boundary, &field_name, filename, content);
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::post(url)
        .timeout(SEND_TIMEOUT)
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(body)
        .map_err(|e| WebhookError::Build(e.to_string()))?;
    send_and_classify(client, request).await
}

fn write_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &[u8]) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
    body.extend_from_slice(value);
    body.extend_from_slice(b"\r\n");
}

fn write_file_field(body: &mut Vec<u8>, boundary: &str, field_name: &str, filename: &str, content: &[u8]) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
}

async fn send_and_classify(client: &HttpClient, request: Request<Vec<u8>>) -> Result<(), WebhookError> {
    let response = client
        .send_async(request)
        .await
        .map_err(|e| WebhookError::Send(e.to_string()))?;

    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));
        return Err(WebhookError::RateLimited(retry_after));
    }
    if (400..500).contains(&status) {
        return Err(WebhookError::Terminal(status));
    }
    Err(WebhookError::Send(format!("http {status}")))
}

/// Safe attachment size limit (§GLOSSARY): below this, send as-is.
pub const ATTACHMENT_SAFE_LIMIT_BYTES: u64 = 7 * 1024 * 1024;

/// Gzip-compress a file's bytes once. The spec calls this "zip"; no zip
/// crate appears anywhere in the corpus, so this reuses the `flate2` gzip
/// path already load-bearing for history segments (documented in
/// DESIGN.md).
pub fn compress_once(content: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}

pub fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}
