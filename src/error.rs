//! Fatal errors
//!
//! These are contract violations by the caller and are raised immediately.
//! Per-request failures never show up here; they are collected as
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A batch must be entirely list-style or entirely not.
    #[error(
        "cannot mix list-style and non-list-style requests in one batch ({list} list, {other} other)"
    )]
    MixedRequestKinds { list: usize, other: usize },

    #[error("expected {expected} followup overrides (one per request), got {actual}")]
    FollowupLengthMismatch { expected: usize, actual: usize },

    #[error("list requests only accept list or aggregatedList methods, got {service}.{method}")]
    NotListRequest { service: String, method: String },

    #[error("unknown service `{api}.{service}`")]
    UnknownService { api: String, service: String },

    #[error("method `{method}` is not configured for service `{service}`")]
    UnsupportedMethod { service: String, method: String },

    #[error("missing required parameter `{param}` for {context}")]
    MissingParameter { param: String, context: String },

    #[error("invalid request URL `{0}`")]
    InvalidUrl(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
