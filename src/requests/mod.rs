//! Batch request and operation polling engine
//!
//! Requests are grouped into Google `multipart/mixed` batches, list
//! responses are paginated, and long-running operations are polled until
//! every one of them has settled.
//!
//! # Module Structure
//!
//! - [`batch`] - Batch Executor: one request list in, responses and errors out
//! - [`pager`] - List Paginator: follows page tokens, flattens aggregated lists
//! - [`classifier`] - Operation Classifier: tells operations from resources
//! - [`poller`] - Operation Poller: round-based polling and final GETs
//! - [`orchestrator`] - `MakeRequests`, the single entry point

pub mod batch;
pub mod classifier;
pub mod orchestrator;
pub mod pager;
pub mod poller;

pub use batch::{execute_batch, BatchResult, BatchTransport, DEFAULT_MAX_BATCH_SIZE};
pub use classifier::{
    classify_round, is_operation, CatalogScopePolicy, OperationHandle, ProjectFieldPolicy,
    ScopePolicy,
};
pub use orchestrator::{list_json, make_requests, MakeRequests, RequestStream};
pub use pager::{split_list_response, ListPage, ListPager};
pub use poller::{OperationPoller, PollSettings, ProgressTracker};
