//! gcpbatch
//!
//! Batched Google Cloud API calls with long-running operation polling.
//! Requests are described against an embedded API catalog, sent through
//! the batch endpoint, and their results come back as a lazy stream of
//! resources together with the warnings and errors gathered on the way.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gcp;
pub mod requests;
pub mod resource;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::Error;
pub use requests::{list_json, make_requests, MakeRequests, RequestStream};
pub use resource::{ApiRequest, Catalog, Method};

/// Version injected at compile time via GCPBATCH_VERSION env var,
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCPBATCH_VERSION") {
    Some(v) => v,
    None => "dev",
};
