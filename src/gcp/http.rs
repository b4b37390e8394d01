//! HTTP utilities for GCP batch calls

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Raw batch reply: content type and body
#[derive(Debug, Clone)]
pub struct BatchPayload {
    pub content_type: String,
    pub body: String,
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gcpbatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// POST a multipart batch body and return the multipart reply
    pub async fn post_batch(
        &self,
        url: &str,
        token: &str,
        content_type: &str,
        body: String,
    ) -> Result<BatchPayload> {
        tracing::debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .context("Failed to send batch request")?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .context("Failed to read batch response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("Batch API error: {} - {}", status, sanitize_for_log(&body));
            let (_, message) = describe_error_reply(status.as_u16(), &body);
            return Err(anyhow::anyhow!(
                "Batch request failed: {} ({})",
                status,
                message
            ));
        }

        Ok(BatchPayload { content_type, body })
    }
}

/// Extract `(code, message)` from a failed API reply.
///
/// GCP errors look like
/// `{"error": {"code": 404, "message": "...", "errors": [{"reason": "notFound"}]}}`.
/// The code is the `status` string when present, then the first `reason`,
/// then the HTTP status. Without a JSON message a generic description of the
/// HTTP status is used.
pub fn describe_error_reply(status: u16, body: &str) -> (String, String) {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());

    let code = error
        .as_ref()
        .and_then(|e| {
            e.get("status").and_then(Value::as_str).or_else(|| {
                e.get("errors")
                    .and_then(|errs| errs.get(0))
                    .and_then(|first| first.get("reason"))
                    .and_then(Value::as_str)
            })
        })
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());

    let message = error
        .as_ref()
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| describe_status(status).to_string());

    (code, message)
}

/// Generic message for an HTTP status without an API error body
fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Check your parameters.",
        401 => "Authentication failed. Run 'gcloud auth application-default login'.",
        403 => "Permission denied. Check your GCP IAM permissions.",
        404 => "Resource not found.",
        409 => "Resource conflict. The resource may already exist or be in use.",
        429 => "Rate limit exceeded. Please try again later.",
        500 | 502 | 503 => "GCP service temporarily unavailable. Please try again.",
        _ => "Request failed.",
    }
}
