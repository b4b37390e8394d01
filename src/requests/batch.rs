//! Batch Executor
//!
//! Sends a set of heterogeneous requests as batch calls and returns one
//! response slot per request, in input order. Failures are recorded per
//! request and never abort siblings. There are no retries at this layer.

use crate::diagnostics::Diagnostic;
use crate::gcp::http::describe_error_reply;
use crate::gcp::multipart::{HttpCall, HttpReply};
use crate::resource::ApiRequest;
use async_trait::async_trait;
use serde_json::Value;

/// Compute Engine accepts at most this many calls per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Something that can carry a batch of HTTP calls to a batch endpoint.
///
/// Implementations return one slot per call, in call order. A `None` slot
/// means the batch reply had no part for that call. An `Err` means the
/// whole batch failed.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send_batch(
        &self,
        batch_url: &str,
        calls: &[HttpCall],
    ) -> anyhow::Result<Vec<Option<HttpReply>>>;
}

/// Outcome of one batch round
#[derive(Debug, Default)]
pub struct BatchResult {
    /// One slot per input request; `None` for failures and empty bodies
    pub responses: Vec<Option<Value>>,
    /// Failures in request order
    pub errors: Vec<Diagnostic>,
    /// Indices of the requests behind `errors`
    failed: Vec<usize>,
}

impl BatchResult {
    /// Whether request `index` recorded an error. A `None` response
    /// without an error means the reply body was empty.
    pub fn failed(&self, index: usize) -> bool {
        self.failed.binary_search(&index).is_ok()
    }
}

/// Execute `requests` through `transport`, chunked by `max_batch_size`
pub async fn execute_batch<T: BatchTransport + ?Sized>(
    transport: &T,
    batch_url: &str,
    requests: &[ApiRequest],
    max_batch_size: usize,
) -> BatchResult {
    let mut responses: Vec<Option<Value>> = vec![None; requests.len()];
    let mut errors: Vec<(usize, Diagnostic)> = Vec::new();

    let mut indices = Vec::with_capacity(requests.len());
    let mut calls = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        match request.to_http_call() {
            Ok(call) => {
                indices.push(index);
                calls.push(call);
            }
            Err(e) => errors.push((
                index,
                Diagnostic::request_failed(request.context(), None, e.to_string()),
            )),
        }
    }

    let chunk_size = max_batch_size.max(1);
    for (chunk_indices, chunk_calls) in indices.chunks(chunk_size).zip(calls.chunks(chunk_size)) {
        tracing::debug!("Sending batch of {} requests to {}", chunk_calls.len(), batch_url);

        let replies = match transport.send_batch(batch_url, chunk_calls).await {
            Ok(replies) => replies,
            Err(e) => {
                let message = format!("{:#}", e);
                for &index in chunk_indices {
                    errors.push((
                        index,
                        Diagnostic::request_failed(requests[index].context(), None, message.clone()),
                    ));
                }
                continue;
            }
        };

        let mut replies = replies.into_iter();
        for &index in chunk_indices {
            let request = &requests[index];
            match replies.next().flatten() {
                None => errors.push((
                    index,
                    Diagnostic::request_failed(
                        request.context(),
                        None,
                        "Batch response contained no reply for this request",
                    ),
                )),
                Some(reply) if reply.is_success() => match parse_body(&reply.body) {
                    Ok(value) => responses[index] = value,
                    Err(e) => errors.push((
                        index,
                        Diagnostic::request_failed(
                            request.context(),
                            Some(reply.status.to_string()),
                            format!("Failed to parse response JSON: {}", e),
                        ),
                    )),
                },
                Some(reply) => {
                    let (code, message) = describe_error_reply(reply.status, &reply.body);
                    errors.push((
                        index,
                        Diagnostic::request_failed(request.context(), Some(code), message),
                    ));
                }
            }
        }
    }

    errors.sort_by_key(|(index, _)| *index);
    let (failed, errors) = errors.into_iter().unzip();
    BatchResult {
        responses,
        errors,
        failed,
    }
}

/// Empty bodies carry no result
fn parse_body(body: &str) -> serde_json::Result<Option<Value>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(body)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
