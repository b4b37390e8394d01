//! Request Orchestrator
//!
//! Single entry point for running a batch of requests. List-style batches
//! are paginated; everything else is sent once, classified, and any
//! resulting operations are polled to completion as one group.

use super::batch::{execute_batch, DEFAULT_MAX_BATCH_SIZE};
use super::classifier::{classify_round, CatalogScopePolicy, ScopePolicy};
use super::pager::ListPager;
use super::poller::{OperationPoller, PollSettings, ProgressTracker};
use super::BatchTransport;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::resource::{ApiRequest, Catalog};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;

static DEFAULT_SCOPE_POLICY: CatalogScopePolicy = CatalogScopePolicy;

/// Builder for one orchestrated run
///
/// ```no_run
/// # use gcpbatch::requests::{BatchTransport, MakeRequests, PollSettings};
/// # use gcpbatch::resource::{ApiRequest, Catalog};
/// # async fn run(transport: &dyn BatchTransport, requests: Vec<ApiRequest>) -> anyhow::Result<()> {
/// let catalog = Catalog::builtin();
/// let tick = || eprint!(".");
/// let (resources, diagnostics) = MakeRequests::new(transport, catalog, "https://compute.googleapis.com/batch/compute/v1")
///     .progress(&tick)
///     .log_result(true)
///     .poll_settings(PollSettings::default())
///     .run(requests)?
///     .collect()
///     .await;
/// if !diagnostics.is_empty() {
///     eprintln!("{}", diagnostics.summary("Some requests generated warnings:"));
/// }
/// # let _ = resources;
/// # Ok(())
/// # }
/// ```
pub struct MakeRequests<'a, T: ?Sized> {
    transport: &'a T,
    catalog: &'a Catalog,
    batch_url: String,
    max_batch_size: usize,
    progress: Option<&'a dyn ProgressTracker>,
    followup_overrides: Vec<Option<String>>,
    log_result: bool,
    poll: PollSettings,
    scope_policy: &'a dyn ScopePolicy,
}

impl<'a, T: BatchTransport + ?Sized> MakeRequests<'a, T> {
    pub fn new(transport: &'a T, catalog: &'a Catalog, batch_url: impl Into<String>) -> Self {
        Self {
            transport,
            catalog,
            batch_url: batch_url.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            progress: None,
            followup_overrides: Vec::new(),
            log_result: false,
            poll: PollSettings::default(),
            scope_policy: &DEFAULT_SCOPE_POLICY,
        }
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Ticked once per poll round
    pub fn progress(mut self, progress: &'a dyn ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// One optional alternate resource name per request, used for the final
    /// GET of that request's operation
    pub fn followup_overrides(mut self, overrides: Vec<Option<String>>) -> Self {
        self.followup_overrides = overrides;
        self
    }

    /// Narrate `Created [...]` / `Updated [...]` / `Deleted [...]`
    pub fn log_result(mut self, log_result: bool) -> Self {
        self.log_result = log_result;
        self
    }

    pub fn poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn scope_policy(mut self, policy: &'a dyn ScopePolicy) -> Self {
        self.scope_policy = policy;
        self
    }

    /// Validate the batch and return the lazy result stream.
    ///
    /// Nothing is sent until the stream is polled. Mixing list-style and
    /// other requests fails here, before any network call.
    pub fn run(self, requests: Vec<ApiRequest>) -> Result<RequestStream<'a, T>> {
        let list_count = requests.iter().filter(|r| r.is_list_style()).count();
        if list_count > 0 && list_count < requests.len() {
            return Err(Error::MixedRequestKinds {
                list: list_count,
                other: requests.len() - list_count,
            });
        }
        if !self.followup_overrides.is_empty() && self.followup_overrides.len() != requests.len() {
            return Err(Error::FollowupLengthMismatch {
                expected: requests.len(),
                actual: self.followup_overrides.len(),
            });
        }

        let stage = if requests.is_empty() {
            Stage::Done
        } else if list_count == requests.len() {
            Stage::Listing(ListPager::new(
                self.transport,
                self.batch_url.clone(),
                self.max_batch_size,
                requests,
            ))
        } else {
            Stage::Submitting(Box::new(Submission {
                settings: self,
                requests,
            }))
        };

        Ok(RequestStream {
            stage,
            ready: VecDeque::new(),
            diagnostics: Diagnostics::new(),
        })
    }

    /// Like [`list_json`], with this builder's batch size
    pub fn list(self, requests: Vec<ApiRequest>) -> Result<RequestStream<'a, T>> {
        ensure_list_style(&requests)?;
        self.run(requests)
    }
}

/// Run `requests` with default settings
pub fn make_requests<'a, T: BatchTransport + ?Sized>(
    transport: &'a T,
    catalog: &'a Catalog,
    batch_url: &str,
    requests: Vec<ApiRequest>,
) -> Result<RequestStream<'a, T>> {
    MakeRequests::new(transport, catalog, batch_url).run(requests)
}

/// Paginate list-style requests; any other method is rejected
pub fn list_json<'a, T: BatchTransport + ?Sized>(
    transport: &'a T,
    batch_url: &str,
    requests: Vec<ApiRequest>,
) -> Result<RequestStream<'a, T>> {
    ensure_list_style(&requests)?;

    let stage = if requests.is_empty() {
        Stage::Done
    } else {
        Stage::Listing(ListPager::new(
            transport,
            batch_url,
            DEFAULT_MAX_BATCH_SIZE,
            requests,
        ))
    };
    Ok(RequestStream {
        stage,
        ready: VecDeque::new(),
        diagnostics: Diagnostics::new(),
    })
}

fn ensure_list_style(requests: &[ApiRequest]) -> Result<()> {
    match requests.iter().find(|r| !r.is_list_style()) {
        Some(request) => Err(Error::NotListRequest {
            service: request.service().name.clone(),
            method: request.method().to_string(),
        }),
        None => Ok(()),
    }
}

struct Submission<'a, T: ?Sized> {
    settings: MakeRequests<'a, T>,
    requests: Vec<ApiRequest>,
}

enum Stage<'a, T: ?Sized> {
    Listing(ListPager<'a, T>),
    Submitting(Box<Submission<'a, T>>),
    Polling(OperationPoller<'a, T>),
    Done,
}

/// Lazy sequence of completed resources plus the diagnostics gathered
/// while producing them
pub struct RequestStream<'a, T: ?Sized> {
    stage: Stage<'a, T>,
    ready: VecDeque<Value>,
    diagnostics: Diagnostics,
}

impl<'a, T: BatchTransport + ?Sized> RequestStream<'a, T> {
    /// Next completed resource.
    ///
    /// Advances at most as far as needed: a list round, the initial batch,
    /// or poll rounds until the operation group is resolved.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }

            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Done => return None,
                Stage::Listing(mut pager) => {
                    let item = pager.next(&mut self.diagnostics).await;
                    if item.is_some() {
                        self.stage = Stage::Listing(pager);
                    }
                    return item;
                }
                Stage::Submitting(submission) => {
                    self.stage = self.submit(*submission).await;
                }
                Stage::Polling(mut poller) => {
                    if poller.poll_round(&mut self.diagnostics).await {
                        self.stage = Stage::Polling(poller);
                    } else {
                        let resources = poller.finish(&mut self.diagnostics).await;
                        self.ready.extend(resources);
                    }
                }
            }
        }
    }

    /// Send the initial batch, queue synchronous results and hand any
    /// operations to a poller
    async fn submit(&mut self, submission: Submission<'a, T>) -> Stage<'a, T> {
        let Submission { settings, requests } = submission;

        let result = execute_batch(
            settings.transport,
            &settings.batch_url,
            &requests,
            settings.max_batch_size,
        )
        .await;
        self.diagnostics.extend(result.errors);

        let classification = classify_round(
            settings.catalog,
            settings.scope_policy,
            &requests,
            result.responses,
            &settings.followup_overrides,
            &mut self.diagnostics,
        );
        self.ready.extend(classification.resources);

        if classification.operations.is_empty() {
            return Stage::Done;
        }
        tracing::debug!("Polling {} operations", classification.operations.len());
        Stage::Polling(
            OperationPoller::new(
                settings.transport,
                settings.batch_url,
                settings.max_batch_size,
                settings.poll,
                classification.operations,
            )
            .with_progress(settings.progress)
            .with_log_result(settings.log_result),
        )
    }

    /// Next resource deserialized into `D`
    pub async fn next_as<D: DeserializeOwned>(&mut self) -> Option<serde_json::Result<D>> {
        let value = self.next().await?;
        Some(serde_json::from_value(value))
    }

    /// Diagnostics recorded so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Stop here and hand back the diagnostics. Unfinished operations keep
    /// running server-side.
    pub fn finish(self) -> Diagnostics {
        self.diagnostics
    }

    /// Drain the stream
    pub async fn collect(mut self) -> (Vec<Value>, Diagnostics) {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        (items, self.diagnostics)
    }
}
