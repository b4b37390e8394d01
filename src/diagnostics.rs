//! Error/warning accumulator
//!
//! Every stage of a request run appends here instead of failing the whole
//! run. The caller drains the list once the result stream is exhausted.

use std::fmt;

/// What produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The request failed at the transport or API level
    RequestFailed,
    /// An aggregated list could not reach one of its scopes
    UnreachableScope,
    /// A long-running operation finished with an error
    OperationFailed,
    /// A long-running operation finished with a warning attached
    OperationWarning,
}

impl DiagnosticKind {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::RequestFailed | Self::OperationFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestFailed => "request_failed",
            Self::UnreachableScope => "unreachable_scope",
            Self::OperationFailed => "operation_failed",
            Self::OperationWarning => "operation_warning",
        }
    }
}

/// A single recorded failure or warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Request the diagnostic belongs to, e.g. `instances.insert [vm-1]`.
    /// `None` for scope-level warnings.
    pub context: Option<String>,
    /// HTTP status or API error code, when one was reported
    pub code: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn request_failed(
        context: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::RequestFailed,
            context: Some(context.into()),
            code,
            message: message.into(),
        }
    }

    pub fn unreachable_scope(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::UnreachableScope,
            context: None,
            code: Some("UNREACHABLE".to_string()),
            message: message.into(),
        }
    }

    pub fn operation_failed(
        context: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::OperationFailed,
            context: Some(context.into()),
            code,
            message: message.into(),
        }
    }

    pub fn operation_warning(
        context: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::OperationWarning,
            context: Some(context.into()),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref context) = self.context {
            write!(f, "[{}] ", context)?;
        }
        if let Some(ref code) = self.code {
            write!(f, "{}: ", code)?;
        }
        write!(f, "{}", self.message)
    }
}

/// Ordered, append-only collection of diagnostics for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// True if any entry is a hard failure rather than a warning
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.kind.is_error())
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Render a consolidated multi-line report, one entry per line.
    ///
    /// ```
    /// use gcpbatch::diagnostics::{Diagnostic, Diagnostics};
    ///
    /// let mut diagnostics = Diagnostics::new();
    /// diagnostics.push(Diagnostic::unreachable_scope("zone us-east1-b is unavailable"));
    /// assert_eq!(
    ///     diagnostics.summary("Some requests generated warnings:"),
    ///     "Some requests generated warnings:\n - UNREACHABLE: zone us-east1-b is unavailable"
    /// );
    /// ```
    pub fn summary(&self, title: &str) -> String {
        let mut out = title.to_string();
        for entry in &self.entries {
            out.push_str("\n - ");
            out.push_str(&entry.to_string());
        }
        out
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
