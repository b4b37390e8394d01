//! List Paginator
//!
//! Drives `list` / `aggregatedList` requests through the batch executor,
//! following page tokens round by round and flattening aggregated
//! per-scope results into one lazy sequence of items.

use super::batch::execute_batch;
use super::BatchTransport;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::resource::{ApiRequest, Method};
use serde_json::Value;
use std::collections::VecDeque;

/// Warning code a scoped list carries when its scope could not be reached
pub const UNREACHABLE_WARNING_CODE: &str = "UNREACHABLE";

/// Items and cursor extracted from one list response
#[derive(Debug, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
}

/// Split one list response into its items and next page token.
///
/// Unreachable scopes of an aggregated list are recorded in `diagnostics`;
/// items of healthy scopes are still returned.
pub fn split_list_response(
    request: &ApiRequest,
    response: Value,
    diagnostics: &mut Diagnostics,
) -> ListPage {
    let config = request.service().method_config(request.method());
    let items_field = config.map(|c| c.items_field.as_str()).unwrap_or("items");

    let next_page_token = response
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let items = match request.method() {
        Method::AggregatedList => {
            // The per-scope field is named after the collection,
            // e.g. `projects/{project}/aggregated/disks` -> `disks`
            let scoped_field = config.map(|c| c.collection_name()).unwrap_or("items");
            flatten_aggregated(&response, items_field, scoped_field, diagnostics)
        }
        _ => response
            .get(items_field)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    };

    if let Some(unreachables) = response.get("unreachables").and_then(Value::as_array) {
        for scope in unreachables.iter().filter_map(Value::as_str) {
            diagnostics.push(Diagnostic::unreachable_scope(format!(
                "Scope [{}] is unreachable; results from it are missing",
                scope
            )));
        }
    }

    ListPage {
        items,
        next_page_token,
    }
}

fn flatten_aggregated(
    response: &Value,
    items_field: &str,
    scoped_field: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Value> {
    let Some(scopes) = response.get(items_field).and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for (scope, scoped_list) in scopes {
        let warning = scoped_list.get("warning");
        let code = warning.and_then(|w| w.get("code")).and_then(Value::as_str);
        if code == Some(UNREACHABLE_WARNING_CODE) {
            let message = warning
                .and_then(|w| w.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Scope [{}] is unreachable", scope));
            diagnostics.push(Diagnostic::unreachable_scope(message));
        }
        if let Some(scoped_items) = scoped_list.get(scoped_field).and_then(Value::as_array) {
            items.extend(scoped_items.iter().cloned());
        }
    }
    items
}

/// Lazy, finite, non-restartable sequence of list items
pub struct ListPager<'a, T: ?Sized> {
    transport: &'a T,
    batch_url: String,
    max_batch_size: usize,
    pending: Vec<ApiRequest>,
    buffer: VecDeque<Value>,
    rounds: usize,
}

impl<'a, T: BatchTransport + ?Sized> ListPager<'a, T> {
    pub fn new(
        transport: &'a T,
        batch_url: impl Into<String>,
        max_batch_size: usize,
        requests: Vec<ApiRequest>,
    ) -> Self {
        Self {
            transport,
            batch_url: batch_url.into(),
            max_batch_size,
            pending: requests,
            buffer: VecDeque::new(),
            rounds: 0,
        }
    }

    /// Number of batch rounds sent so far
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Next item, sending further page rounds as needed
    pub async fn next(&mut self, diagnostics: &mut Diagnostics) -> Option<Value> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.pending.is_empty() {
                return None;
            }
            self.fetch_round(diagnostics).await;
        }
    }

    /// Send every pending request once and queue the next pages
    async fn fetch_round(&mut self, diagnostics: &mut Diagnostics) {
        let requests = std::mem::take(&mut self.pending);
        self.rounds += 1;
        tracing::debug!("List round {}: {} requests", self.rounds, requests.len());

        let result =
            execute_batch(self.transport, &self.batch_url, &requests, self.max_batch_size).await;
        diagnostics.extend(result.errors);

        for (request, response) in requests.into_iter().zip(result.responses) {
            let Some(response) = response else {
                continue;
            };
            let page = split_list_response(&request, response, diagnostics);
            self.buffer.extend(page.items);
            if let Some(token) = page.next_page_token {
                self.pending.push(request.with_page_token(&token));
            }
        }
    }
}
