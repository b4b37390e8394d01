//! Typed API requests
//!
//! A request is the triple (service, method, payload). The method is a
//! closed set of well-known REST verbs plus `Custom` for per-collection
//! actions such as `instances.start`.

use super::registry::{scalar_to_string, Service};
use crate::error::Error;
use crate::gcp::multipart::HttpCall;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Name of the request field that carries the page cursor
pub const PAGE_TOKEN_FIELD: &str = "pageToken";

/// API method of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    List,
    AggregatedList,
    Get,
    Insert,
    Update,
    Patch,
    Delete,
    Wait,
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::List => "list",
            Self::AggregatedList => "aggregatedList",
            Self::Get => "get",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Wait => "wait",
            Self::Custom(name) => name,
        }
    }

    /// List-style calls are paginated and never produce operations
    pub fn is_list_style(&self) -> bool {
        matches!(self, Self::List | Self::AggregatedList)
    }

    /// Verb used when narrating a finished mutation
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Insert => "Created",
            Self::Delete => "Deleted",
            _ => "Updated",
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "list" => Self::List,
            "aggregatedList" => Self::AggregatedList,
            "get" => Self::Get,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "patch" => Self::Patch,
            "delete" => Self::Delete,
            "wait" => Self::Wait,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    service: Arc<Service>,
    method: Method,
    payload: Map<String, Value>,
}

impl ApiRequest {
    pub fn new(service: Arc<Service>, method: Method, payload: Map<String, Value>) -> Self {
        Self {
            service,
            method,
            payload,
        }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn is_list_style(&self) -> bool {
        self.method.is_list_style()
    }

    /// String value of a payload field
    pub fn param(&self, key: &str) -> Option<String> {
        self.payload.get(key).and_then(scalar_to_string)
    }

    /// Clone of this request with the page cursor installed
    pub fn with_page_token(&self, token: &str) -> Self {
        let mut next = self.clone();
        next.payload
            .insert(PAGE_TOKEN_FIELD.to_string(), Value::String(token.to_string()));
        next
    }

    /// Short label for diagnostics, e.g. `instances.insert [vm-1]`
    pub fn context(&self) -> String {
        let label = format!("{}.{}", self.service.name, self.method);
        match self.resource_name() {
            Some(name) => format!("{} [{}]", label, name),
            None => label,
        }
    }

    /// Name of the resource the request addresses, if it can be told
    fn resource_name(&self) -> Option<String> {
        let config = self.service.method_config(&self.method)?;
        if let Some(field) = config.request_field.as_deref() {
            if let Some(name) = self
                .payload
                .get(field)
                .and_then(|body| body.get("name"))
                .and_then(Value::as_str)
            {
                return Some(name.to_string());
            }
        }
        if self.is_list_style() || self.method == Method::Insert {
            return None;
        }
        // Custom actions end in a literal verb: `.../instances/{instance}/start`
        let last = *config.path_params().last()?;
        self.param(last)
    }

    /// Encode into a raw HTTP call using the service's method configuration
    pub fn to_http_call(&self) -> Result<HttpCall, Error> {
        let config = self
            .service
            .method_config(&self.method)
            .ok_or_else(|| Error::UnsupportedMethod {
                service: self.service.name.clone(),
                method: self.method.to_string(),
            })?;

        let path = config.expand_path(&self.payload, &self.context())?;
        let mut url = format!("{}{}", self.service.api.base_url(), path);

        let mut query: Vec<String> = Vec::new();
        for name in &config.query_params {
            match self.payload.get(name) {
                Some(Value::Array(values)) => {
                    for value in values.iter().filter_map(scalar_to_string) {
                        query.push(format!("{}={}", name, urlencoding::encode(&value)));
                    }
                }
                Some(value) => {
                    if let Some(value) = scalar_to_string(value) {
                        query.push(format!("{}={}", name, urlencoding::encode(&value)));
                    }
                }
                None => {}
            }
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        let body = config
            .request_field
            .as_deref()
            .and_then(|field| self.payload.get(field))
            .cloned();

        Ok(HttpCall {
            method: config.http_method.clone(),
            url,
            body,
        })
    }
}
