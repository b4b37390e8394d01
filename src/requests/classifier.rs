//! Operation Classifier
//!
//! Partitions one batch round's responses into terminal resources and
//! long-running operation handles, and decides which operations service
//! polls each handle.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::resource::{extract_short_name, ApiRequest, Catalog, Method, OperationScope, Service};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Terminal value of an operation's `status`
pub const OPERATION_DONE: &str = "DONE";

/// Decides the scope of an operation that names neither a zone nor a region.
///
/// Different APIs mark organization-level operations differently, so the
/// rule is supplied by the caller rather than inferred in one place.
pub trait ScopePolicy: Send + Sync {
    fn unlocated_scope(&self, request: &ApiRequest, operation: &Value) -> OperationScope;
}

/// Uses the `organization_scoped` flag of the service catalog. Requests
/// that carry no `project` are organization-level as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogScopePolicy;

impl ScopePolicy for CatalogScopePolicy {
    fn unlocated_scope(&self, request: &ApiRequest, _operation: &Value) -> OperationScope {
        if request.service().organization_scoped || !request.payload().contains_key("project") {
            OperationScope::Organization
        } else {
            OperationScope::Global
        }
    }
}

/// Treats requests without a `project` field as organization-scoped
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectFieldPolicy;

impl ScopePolicy for ProjectFieldPolicy {
    fn unlocated_scope(&self, request: &ApiRequest, _operation: &Value) -> OperationScope {
        if request.payload().contains_key("project") {
            OperationScope::Global
        } else {
            OperationScope::Organization
        }
    }
}

/// A pending long-running operation and everything needed to finish it
#[derive(Debug, Clone)]
pub struct OperationHandle {
    /// Latest known operation resource
    pub operation: Value,
    pub scope: OperationScope,
    /// Service that issued the mutation and serves the final GET
    pub resource_service: Arc<Service>,
    /// Service used to poll the operation
    pub operations_service: Arc<Service>,
    /// The mutating request that produced the operation
    pub request: ApiRequest,
    /// Alternate resource to fetch once done (renames)
    pub followup_override: Option<String>,
}

impl OperationHandle {
    pub fn name(&self) -> &str {
        self.operation
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn status(&self) -> Option<&str> {
        self.operation.get("status").and_then(Value::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.status() == Some(OPERATION_DONE)
    }

    pub fn target_link(&self) -> Option<&str> {
        self.operation.get("targetLink").and_then(Value::as_str)
    }

    /// Label for diagnostics: the target when known, else the operation
    pub fn context(&self) -> String {
        match self.target_link() {
            Some(link) => format!("{} [{}]", self.request.context(), link),
            None => format!("{} [operation {}]", self.request.context(), self.name()),
        }
    }

    /// The mutation deleted its target, so there is nothing to fetch
    pub fn is_delete(&self) -> bool {
        *self.request.method() == Method::Delete
            || self.operation.get("operationType").and_then(Value::as_str) == Some("delete")
    }

    fn project(&self) -> Option<String> {
        self.request.param("project").or_else(|| {
            let link = self.operation.get("selfLink").and_then(Value::as_str)?;
            let mut segments = link.split('/');
            segments.find(|s| *s == "projects")?;
            segments.next().map(str::to_string)
        })
    }

    /// Request that fetches (or waits on) the operation's current state
    pub fn poll_request(&self, use_wait: bool) -> ApiRequest {
        let mut payload = Map::new();
        payload.insert("operation".into(), Value::String(self.name().to_string()));
        match &self.scope {
            OperationScope::Zonal(zone) => {
                payload.insert("zone".into(), Value::String(zone.clone()));
            }
            OperationScope::Regional(region) => {
                payload.insert("region".into(), Value::String(region.clone()));
            }
            OperationScope::Global => {}
            OperationScope::Organization => {
                if let Some(parent) = self.request.param("parentId") {
                    payload.insert("parentId".into(), Value::String(parent));
                }
            }
        }
        if self.scope != OperationScope::Organization {
            if let Some(project) = self.project() {
                payload.insert("project".into(), Value::String(project));
            }
        }

        let method = if use_wait && self.operations_service.supports(&Method::Wait) {
            Method::Wait
        } else {
            Method::Get
        };
        self.operations_service.request(method, payload)
    }
}

/// Output of classifying one round
#[derive(Debug, Default)]
pub struct Classification {
    /// Synchronous results, yielded as-is
    pub resources: Vec<Value>,
    /// Operations still to be polled
    pub operations: Vec<OperationHandle>,
}

/// True if `response` is an operation that still needs polling.
///
/// Responses of operations services are themselves operations; they are
/// never re-classified, which keeps status checks from being polled again.
pub fn is_operation(request: &ApiRequest, response: &Value) -> bool {
    let service = request.service();
    if service.is_operations_service() {
        return false;
    }
    response.get("kind").and_then(Value::as_str) == Some(service.api.operation_kind.as_str())
}

/// Scope of an operation from its `zone` / `region` fields, else the policy
pub fn operation_scope(
    policy: &dyn ScopePolicy,
    request: &ApiRequest,
    operation: &Value,
) -> OperationScope {
    let field = |name: &str| {
        operation
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(extract_short_name)
    };
    if let Some(zone) = field("zone") {
        OperationScope::Zonal(zone)
    } else if let Some(region) = field("region") {
        OperationScope::Regional(region)
    } else {
        policy.unlocated_scope(request, operation)
    }
}

/// Partition a round's `(request, response)` pairs.
///
/// `followups` is either empty or holds one optional override per request.
pub fn classify_round(
    catalog: &Catalog,
    policy: &dyn ScopePolicy,
    requests: &[ApiRequest],
    responses: Vec<Option<Value>>,
    followups: &[Option<String>],
    diagnostics: &mut Diagnostics,
) -> Classification {
    let mut classification = Classification::default();

    for (index, (request, response)) in requests.iter().zip(responses).enumerate() {
        let Some(response) = response else {
            continue;
        };
        if !is_operation(request, &response) {
            classification.resources.push(response);
            continue;
        }

        let scope = operation_scope(policy, request, &response);
        let api = &request.service().api.name;
        let Some(operations_service) = catalog.operations_service(api, &scope) else {
            diagnostics.push(Diagnostic::request_failed(
                request.context(),
                None,
                format!("No {} operations service configured for API {}", scope.as_str(), api),
            ));
            continue;
        };

        let name = response.get("name").and_then(|v| v.as_str()).unwrap_or("?");
        tracing::debug!(
            "{} returned {} operation {}",
            request.context(),
            scope.as_str(),
            name
        );
        classification.operations.push(OperationHandle {
            operation: response,
            scope,
            resource_service: Arc::clone(request.service()),
            operations_service,
            request: request.clone(),
            followup_override: followups.get(index).cloned().flatten(),
        });
    }

    classification
}
