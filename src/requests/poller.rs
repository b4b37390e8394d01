//! Operation Poller
//!
//! Polls a group of long-running operations until every one is DONE, one
//! batch per round, then fetches the final resources in one more batch.
//! A failed operation is recorded and dropped; its siblings keep going.

use super::batch::execute_batch;
use super::classifier::OperationHandle;
use super::BatchTransport;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::resource::{ApiRequest, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Progress callback ticked once per poll round
pub trait ProgressTracker: Send + Sync {
    fn tick(&self);

    /// Past-tense completion message, only sent when result logging is on
    fn status(&self, _message: &str) {}
}

impl<F: Fn() + Send + Sync> ProgressTracker for F {
    fn tick(&self) {
        self()
    }
}

/// Backoff between poll rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// Use the server-side `wait` method when the operations service has
    /// one; rounds then skip the client-side sleep
    pub use_wait: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 5000,
            multiplier: 1.5,
            use_wait: true,
        }
    }
}

impl PollSettings {
    /// No sleeping at all (tests, emulators)
    pub fn immediate() -> Self {
        Self {
            initial_interval_ms: 0,
            max_interval_ms: 0,
            multiplier: 1.0,
            use_wait: false,
        }
    }

    /// Sleep before poll round `round` (0-based)
    pub fn interval(&self, round: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(round.min(64) as i32);
        let ms = (self.initial_interval_ms as f64 * factor).min(self.max_interval_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// Round-based poller over a group of operation handles
pub struct OperationPoller<'a, T: ?Sized> {
    transport: &'a T,
    batch_url: String,
    max_batch_size: usize,
    settings: PollSettings,
    progress: Option<&'a dyn ProgressTracker>,
    log_result: bool,
    pending: Vec<OperationHandle>,
    completed: Vec<OperationHandle>,
    rounds: u32,
}

impl<'a, T: BatchTransport + ?Sized> OperationPoller<'a, T> {
    pub fn new(
        transport: &'a T,
        batch_url: impl Into<String>,
        max_batch_size: usize,
        settings: PollSettings,
        handles: Vec<OperationHandle>,
    ) -> Self {
        Self {
            transport,
            batch_url: batch_url.into(),
            max_batch_size,
            settings,
            progress: None,
            log_result: false,
            pending: handles,
            completed: Vec::new(),
            rounds: 0,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_log_result(mut self, log_result: bool) -> Self {
        self.log_result = log_result;
        self
    }

    /// Operations not yet DONE
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Poll rounds sent so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Run one poll round over every pending handle.
    ///
    /// Returns `true` while operations remain pending. Handles that are
    /// already DONE are settled without a network call.
    pub async fn poll_round(&mut self, diagnostics: &mut Diagnostics) -> bool {
        self.settle(diagnostics);
        if self.pending.is_empty() {
            return false;
        }

        if !self.settings.use_wait || !self.pending.iter().all(supports_wait) {
            let interval = self.settings.interval(self.rounds);
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
        if let Some(progress) = self.progress {
            progress.tick();
        }

        let requests: Vec<ApiRequest> = self
            .pending
            .iter()
            .map(|h| h.poll_request(self.settings.use_wait))
            .collect();
        self.rounds += 1;
        tracing::debug!("Poll round {}: {} operations", self.rounds, requests.len());

        let mut result =
            execute_batch(self.transport, &self.batch_url, &requests, self.max_batch_size).await;
        diagnostics.extend(std::mem::take(&mut result.errors));

        let responses = std::mem::take(&mut result.responses);
        let handles = std::mem::take(&mut self.pending);
        for (index, (mut handle, response)) in handles.into_iter().zip(responses).enumerate() {
            match response {
                Some(operation) => {
                    handle.operation = operation;
                    self.pending.push(handle);
                }
                None => {
                    tracing::warn!("Abandoning operation {} after failed poll", handle.name());
                    if !result.failed(index) {
                        diagnostics.push(Diagnostic::request_failed(
                            handle.context(),
                            None,
                            format!("Polling operation {} returned an empty reply", handle.name()),
                        ));
                    }
                }
            }
        }

        self.settle(diagnostics);
        !self.pending.is_empty()
    }

    /// Move DONE handles out of the pending set, recording their
    /// errors and warnings
    fn settle(&mut self, diagnostics: &mut Diagnostics) {
        let (done, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(OperationHandle::is_done);
        self.pending = pending;

        for handle in done {
            let context = handle.context();
            for warning in entries(&handle.operation, "warnings") {
                let (code, message) = code_and_message(warning);
                diagnostics.push(Diagnostic::operation_warning(context.clone(), code, message));
            }

            let error = match handle.operation.get("error") {
                None | Some(Value::Null) => {
                    self.completed.push(handle);
                    continue;
                }
                Some(error) => error,
            };
            let failures = entries(error, "errors");
            if failures.is_empty() {
                let (code, message) = code_and_message(error);
                diagnostics.push(Diagnostic::operation_failed(context, code, message));
                continue;
            }
            for failure in failures {
                let (code, message) = code_and_message(failure);
                diagnostics.push(Diagnostic::operation_failed(context.clone(), code, message));
            }
        }
    }

    /// Fetch the final resources of every successfully completed operation.
    ///
    /// Deletions are narrated but not fetched. Call after polling has
    /// finished; handles still pending are abandoned.
    pub async fn finish(mut self, diagnostics: &mut Diagnostics) -> Vec<Value> {
        if !self.pending.is_empty() {
            tracing::warn!("Abandoning {} unfinished operations", self.pending.len());
        }

        let mut fetches: Vec<(OperationHandle, ApiRequest)> = Vec::new();
        for handle in std::mem::take(&mut self.completed) {
            if handle.is_delete() {
                self.narrate(&handle);
                continue;
            }
            match followup_request(&handle) {
                Ok(request) => fetches.push((handle, request)),
                Err(message) => {
                    diagnostics.push(Diagnostic::request_failed(handle.context(), None, message))
                }
            }
        }
        if fetches.is_empty() {
            return Vec::new();
        }

        let requests: Vec<ApiRequest> = fetches.iter().map(|(_, r)| r.clone()).collect();
        let mut result =
            execute_batch(self.transport, &self.batch_url, &requests, self.max_batch_size).await;
        diagnostics.extend(std::mem::take(&mut result.errors));

        let responses = std::mem::take(&mut result.responses);
        let mut resources = Vec::new();
        for (index, ((handle, _), response)) in fetches.iter().zip(responses).enumerate() {
            match response {
                Some(resource) => {
                    self.narrate(handle);
                    resources.push(resource);
                }
                None if !result.failed(index) => diagnostics.push(Diagnostic::request_failed(
                    handle.context(),
                    None,
                    "Fetching the operation result returned an empty reply",
                )),
                None => {}
            }
        }
        resources
    }

    fn narrate(&self, handle: &OperationHandle) {
        if !self.log_result {
            return;
        }
        let target = handle
            .followup_override
            .as_deref()
            .or_else(|| handle.target_link())
            .unwrap_or_else(|| handle.name());
        let message = format!("{} [{}].", handle.request.method().past_tense(), target);
        tracing::info!("{}", message);
        if let Some(progress) = self.progress {
            progress.status(&message);
        }
    }
}

fn supports_wait(handle: &OperationHandle) -> bool {
    handle.operations_service.supports(&Method::Wait)
}

fn entries<'v>(value: &'v Value, field: &str) -> Vec<&'v Value> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn code_and_message(entry: &Value) -> (Option<String>, String) {
    let code = match entry.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    let message = entry
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    (code, message)
}

/// GET request for the resource an operation produced.
///
/// The target comes from the followup override when set, else the
/// operation's `targetLink`, else the original request's path fields.
fn followup_request(handle: &OperationHandle) -> Result<ApiRequest, String> {
    let service = &handle.resource_service;
    let config = service
        .method_config(&Method::Get)
        .ok_or_else(|| format!("Service {} has no get method to fetch the result", service.name))?;
    let path_params = config.path_params();

    let mut params = handle
        .target_link()
        .and_then(|link| config.match_path(link))
        .unwrap_or_else(|| {
            path_params
                .iter()
                .filter_map(|p| handle.request.payload().get(*p).map(|v| (p.to_string(), v.clone())))
                .collect::<Map<String, Value>>()
        });

    if let Some(ref name) = handle.followup_override {
        if name.contains('/') {
            params = config
                .match_path(name)
                .ok_or_else(|| format!("Cannot resolve followup resource [{}]", name))?;
        } else if let Some(last) = path_params.last() {
            params.insert(last.to_string(), Value::String(name.clone()));
        }
    }

    Ok(service.request(Method::Get, params))
}
