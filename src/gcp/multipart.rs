//! Google batch wire format
//!
//! A batch is one `multipart/mixed` POST whose parts are raw HTTP/1.1
//! requests. Each part carries a `Content-ID` of the form `<{id}+{n}>`
//! (1-based); the reply echoes it as `<response-{id}+{n}>`.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use uuid::Uuid;

/// A single HTTP request inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: String,
    /// Absolute URL including the query string
    pub url: String,
    pub body: Option<Value>,
}

/// A single HTTP response inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Boundary and Content-ID base for one outgoing batch
#[derive(Debug, Clone)]
pub struct BatchEnvelope {
    boundary: String,
    base_id: String,
}

impl Default for BatchEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchEnvelope {
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            boundary: format!("batch_{}", &id[..16]),
            base_id: id,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    /// Encode the calls as a multipart body
    pub fn encode(&self, calls: &[HttpCall]) -> Result<String> {
        let mut out = String::new();
        for (i, call) in calls.iter().enumerate() {
            let url = url::Url::parse(&call.url)
                .with_context(|| format!("Invalid request URL: {}", call.url))?;
            let mut target = url.path().to_string();
            if let Some(query) = url.query() {
                target.push('?');
                target.push_str(query);
            }

            out.push_str(&format!("--{}\r\n", self.boundary));
            out.push_str("Content-Type: application/http\r\n");
            out.push_str("Content-Transfer-Encoding: binary\r\n");
            out.push_str(&format!("Content-ID: <{}+{}>\r\n\r\n", self.base_id, i + 1));

            out.push_str(&format!("{} {} HTTP/1.1\r\n", call.method, target));
            if let Some(host) = url.host_str() {
                out.push_str(&format!("Host: {}\r\n", host));
            }
            match call.body {
                Some(ref body) => {
                    let body = body.to_string();
                    out.push_str("Content-Type: application/json\r\n");
                    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
                    out.push_str(&body);
                    out.push_str("\r\n");
                }
                None => out.push_str("\r\n"),
            }
        }
        out.push_str(&format!("--{}--\r\n", self.boundary));
        Ok(out)
    }
}

/// Extract the `boundary` parameter of a multipart content type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/mixed") {
        return None;
    }
    params
        .filter_map(|p| p.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .find(|b| !b.is_empty())
}

/// Decode a multipart batch reply into `expected` slots.
///
/// Parts are placed by the `+n` suffix of their `Content-ID`, falling back
/// to part order. Slots with no matching part stay `None`.
pub fn decode(content_type: &str, body: &str, expected: usize) -> Result<Vec<Option<HttpReply>>> {
    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| anyhow!("Batch response is not multipart/mixed: {}", content_type))?;
    let delimiter = format!("--{}", boundary);

    let mut replies: Vec<Option<HttpReply>> = vec![None; expected];
    for (position, part) in body.split(delimiter.as_str()).skip(1).enumerate() {
        if part.starts_with("--") {
            break;
        }
        let part = part.trim_start_matches(['\r', '\n']);
        let Some((outer_headers, inner)) = split_head(part) else {
            tracing::warn!("Skipping malformed batch part {}", position + 1);
            continue;
        };

        let index = header_value(outer_headers, "content-id")
            .and_then(content_id_index)
            .unwrap_or(position);
        let reply = match parse_http_response(inner) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Skipping malformed response in batch part {}: {:#}", position + 1, e);
                continue;
            }
        };

        match replies.get_mut(index) {
            Some(slot) => *slot = Some(reply),
            None => tracing::warn!("Batch part {} has out-of-range Content-ID", position + 1),
        }
    }
    Ok(replies)
}

/// Split header block from the rest at the first blank line
fn split_head(text: &str) -> Option<(&str, &str)> {
    if let Some(idx) = text.find("\r\n\r\n") {
        return Some((&text[..idx], &text[idx + 4..]));
    }
    text.find("\n\n").map(|idx| (&text[..idx], &text[idx + 2..]))
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// `<response-abc+3>` -> 2
fn content_id_index(content_id: &str) -> Option<usize> {
    let id = content_id.trim_start_matches('<').trim_end_matches('>');
    let (_, n) = id.rsplit_once('+')?;
    n.parse::<usize>().ok()?.checked_sub(1)
}

fn parse_http_response(inner: &str) -> Result<HttpReply> {
    let (head, body) = split_head(inner).unwrap_or((inner, ""));
    let status_line = head
        .lines()
        .next()
        .ok_or_else(|| anyhow!("missing status line"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| anyhow!("invalid status line: {}", status_line))?;
    Ok(HttpReply {
        status,
        body: body.trim_end_matches(['\r', '\n']).to_string(),
    })
}
