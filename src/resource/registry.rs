//! Service Registry - Load API method configurations from JSON
//!
//! This module loads the service catalog from embedded JSON files and
//! provides lookup of services, method configurations and the
//! operation-polling service for each operation scope.

use super::request::{ApiRequest, Method};
use crate::error::Error;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Embedded service catalog files (compiled into the binary)
const CATALOG_FILES: &[&str] = &[include_str!("../resources/compute.json")];

/// Where a long-running operation lives, fixed once at classification time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationScope {
    Zonal(String),
    Regional(String),
    Global,
    Organization,
}

impl OperationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zonal(_) => "zonal",
            Self::Regional(_) => "regional",
            Self::Global => "global",
            Self::Organization => "organization",
        }
    }
}

/// Whether a service manages resources or polls operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    #[default]
    Resource,
    Operations,
}

/// REST method configuration from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct MethodConfig {
    pub http_method: String,
    /// Path template relative to the API base URL,
    /// e.g. `projects/{project}/zones/{zone}/instances`
    pub relative_path: String,
    /// Payload field that is sent as the request body
    #[serde(default)]
    pub request_field: Option<String>,
    #[serde(default)]
    pub query_params: Vec<String>,
    /// Response field holding list items
    #[serde(default = "default_items_field")]
    pub items_field: String,
}

fn default_items_field() -> String {
    "items".to_string()
}

impl MethodConfig {
    /// Names of the `{param}` placeholders, in path order
    pub fn path_params(&self) -> Vec<&str> {
        self.relative_path
            .split('/')
            .filter_map(placeholder)
            .collect()
    }

    /// Last segment of the relative path.
    ///
    /// For `aggregatedList` this names the per-scope item field
    /// (`projects/{project}/aggregated/instances` -> `instances`).
    pub fn collection_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Substitute path placeholders from a request payload
    pub fn expand_path(&self, payload: &Map<String, Value>, context: &str) -> Result<String, Error> {
        let mut segments = Vec::new();
        for segment in self.relative_path.split('/') {
            match placeholder(segment) {
                Some(name) => {
                    let value = payload
                        .get(name)
                        .and_then(scalar_to_string)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| Error::MissingParameter {
                            param: name.to_string(),
                            context: context.to_string(),
                        })?;
                    segments.push(urlencoding::encode(&value).into_owned());
                }
                None => segments.push(segment.to_string()),
            }
        }
        Ok(segments.join("/"))
    }

    /// Match a resource path or URL against this method's template.
    ///
    /// The template is aligned with the trailing segments of `path`, so full
    /// self links such as
    /// `https://www.googleapis.com/compute/v1/projects/p/zones/z/instances/vm`
    /// match `projects/{project}/zones/{zone}/instances/{instance}`.
    pub fn match_path(&self, path: &str) -> Option<Map<String, Value>> {
        let path = strip_url(path);
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let template: Vec<&str> = self.relative_path.split('/').collect();
        if actual.len() < template.len() {
            return None;
        }

        let tail = &actual[actual.len() - template.len()..];
        let mut params = Map::new();
        for (expected, got) in template.iter().zip(tail) {
            match placeholder(expected) {
                Some(name) => {
                    let decoded = urlencoding::decode(got)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| got.to_string());
                    params.insert(name.to_string(), Value::String(decoded));
                }
                None if expected == got => {}
                None => return None,
            }
        }
        Some(params)
    }
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

fn strip_url(path: &str) -> &str {
    let path = match path.find("://") {
        Some(idx) => {
            let rest = &path[idx + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => path,
    };
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Render a JSON scalar the way it appears in a URL
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// API-level settings shared by all services of one API
#[derive(Debug, Clone)]
pub struct ApiDef {
    pub name: String,
    pub version: String,
    pub root_url: String,
    pub service_path: String,
    pub batch_path: String,
    /// Value of `kind` that marks a response as a long-running operation
    pub operation_kind: String,
    pub operation_services: OperationServiceNames,
}

impl ApiDef {
    pub fn base_url(&self) -> String {
        format!("{}{}", self.root_url, self.service_path)
    }

    pub fn batch_url(&self) -> String {
        format!("{}{}", self.root_url, self.batch_path)
    }
}

/// Operation-polling service names per scope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationServiceNames {
    #[serde(default)]
    pub zonal: Option<String>,
    #[serde(default)]
    pub regional: Option<String>,
    #[serde(default)]
    pub global: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl OperationServiceNames {
    pub fn for_scope(&self, scope: &OperationScope) -> Option<&str> {
        match scope {
            OperationScope::Zonal(_) => self.zonal.as_deref(),
            OperationScope::Regional(_) => self.regional.as_deref(),
            OperationScope::Global => self.global.as_deref(),
            OperationScope::Organization => self.organization.as_deref(),
        }
    }
}

/// A service handle: one REST collection and its configured methods
#[derive(Debug)]
pub struct Service {
    pub api: Arc<ApiDef>,
    pub name: String,
    pub role: ServiceRole,
    /// Resources of this service live under an organization, not a project
    pub organization_scoped: bool,
    methods: HashMap<Method, MethodConfig>,
}

impl Service {
    pub fn method_config(&self, method: &Method) -> Option<&MethodConfig> {
        self.methods.get(method)
    }

    pub fn supports(&self, method: &Method) -> bool {
        self.methods.contains_key(method)
    }

    pub fn is_operations_service(&self) -> bool {
        self.role == ServiceRole::Operations
    }

    /// Build a request against this service
    pub fn request(self: &Arc<Self>, method: Method, payload: Map<String, Value>) -> ApiRequest {
        ApiRequest::new(Arc::clone(self), method, payload)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    apis: HashMap<String, ApiFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiFile {
    version: String,
    root_url: String,
    service_path: String,
    batch_path: String,
    operation_kind: String,
    #[serde(default)]
    operation_services: OperationServiceNames,
    #[serde(default)]
    services: HashMap<String, ServiceFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceFile {
    #[serde(default)]
    role: ServiceRole,
    #[serde(default)]
    organization_scoped: bool,
    methods: HashMap<String, MethodConfig>,
}

/// Loaded service catalog
#[derive(Debug, Default)]
pub struct Catalog {
    apis: HashMap<String, Arc<ApiDef>>,
    services: HashMap<(String, String), Arc<Service>>,
}

/// Global catalog loaded from embedded JSON
static CATALOG: OnceLock<Catalog> = OnceLock::new();

impl Catalog {
    /// Get the built-in catalog (loads from embedded JSON on first access)
    pub fn builtin() -> &'static Catalog {
        CATALOG.get_or_init(|| {
            Self::load_embedded(None)
                .unwrap_or_else(|e| panic!("Failed to parse embedded service catalog: {:#}", e))
        })
    }

    /// Load the embedded catalog with every API rooted at `root_url`
    /// (used to point requests at an emulator or mock server)
    pub fn builtin_with_root_url(root_url: &str) -> Result<Catalog> {
        Self::load_embedded(Some(root_url))
    }

    fn load_embedded(root_url: Option<&str>) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        for content in CATALOG_FILES {
            catalog.merge_json(content, root_url)?;
        }
        Ok(catalog)
    }

    /// Parse a catalog from JSON text
    pub fn from_json(content: &str) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        catalog.merge_json(content, None)?;
        Ok(catalog)
    }

    fn merge_json(&mut self, content: &str, root_url: Option<&str>) -> Result<()> {
        let file: CatalogFile =
            serde_json::from_str(content).context("Failed to parse service catalog JSON")?;

        for (api_name, api) in file.apis {
            let root_url = match root_url {
                Some(root) if root.ends_with('/') => root.to_string(),
                Some(root) => format!("{}/", root),
                None => api.root_url,
            };
            let def = Arc::new(ApiDef {
                name: api_name.clone(),
                version: api.version,
                root_url,
                service_path: api.service_path,
                batch_path: api.batch_path,
                operation_kind: api.operation_kind,
                operation_services: api.operation_services,
            });

            for (service_name, service) in api.services {
                let methods = service
                    .methods
                    .into_iter()
                    .map(|(name, config)| (Method::from(name.as_str()), config))
                    .collect();
                self.services.insert(
                    (api_name.clone(), service_name.clone()),
                    Arc::new(Service {
                        api: Arc::clone(&def),
                        name: service_name,
                        role: service.role,
                        organization_scoped: service.organization_scoped,
                        methods,
                    }),
                );
            }
            tracing::debug!("Loaded API {} {} from {}", def.name, def.version, def.root_url);
            self.apis.insert(api_name, def);
        }
        Ok(())
    }

    pub fn api(&self, name: &str) -> Option<&Arc<ApiDef>> {
        self.apis.get(name)
    }

    /// Get a service by API and collection name
    pub fn service(&self, api: &str, name: &str) -> Option<Arc<Service>> {
        self.services
            .get(&(api.to_string(), name.to_string()))
            .cloned()
    }

    /// Like [`Catalog::service`], failing with [`Error::UnknownService`]
    pub fn require_service(&self, api: &str, name: &str) -> Result<Arc<Service>, Error> {
        self.service(api, name).ok_or_else(|| Error::UnknownService {
            api: api.to_string(),
            service: name.to_string(),
        })
    }

    /// The service that polls operations of `scope` for `api`
    pub fn operations_service(&self, api: &str, scope: &OperationScope) -> Option<Arc<Service>> {
        let def = self.apis.get(api)?;
        let name = def.operation_services.for_scope(scope)?;
        self.service(api, name)
    }

    /// Build a request, checking that the service and method exist
    pub fn request(
        &self,
        api: &str,
        service: &str,
        method: Method,
        payload: Map<String, Value>,
    ) -> Result<ApiRequest, Error> {
        let service = self.require_service(api, service)?;
        if !service.supports(&method) {
            return Err(Error::UnsupportedMethod {
                service: service.name.clone(),
                method: method.to_string(),
            });
        }
        Ok(service.request(method, payload))
    }

    /// Get all service names of an API (for help output)
    pub fn service_names(&self, api: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .services
            .iter()
            .filter(|((a, _), _)| a == api)
            .map(|((_, name), _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_loads_successfully() {
        let catalog = Catalog::builtin();
        assert!(catalog.api("compute").is_some());
        assert!(!catalog.service_names("compute").is_empty());
    }

    #[test]
    fn test_operation_services_are_marked() {
        let catalog = Catalog::builtin();
        for name in [
            "zoneOperations",
            "regionOperations",
            "globalOperations",
            "globalOrganizationOperations",
        ] {
            let service = catalog.service("compute", name).unwrap();
            assert!(service.is_operations_service(), "{} should poll operations", name);
        }
        assert!(!catalog
            .service("compute", "instances")
            .unwrap()
            .is_operations_service());
    }

    #[test]
    fn test_operations_service_per_scope() {
        let catalog = Catalog::builtin();
        let zonal = catalog
            .operations_service("compute", &OperationScope::Zonal("us-central1-a".into()))
            .unwrap();
        assert_eq!(zonal.name, "zoneOperations");
        let org = catalog
            .operations_service("compute", &OperationScope::Organization)
            .unwrap();
        assert_eq!(org.name, "globalOrganizationOperations");
    }

    #[test]
    fn test_aggregated_collection_name_comes_from_path() {
        let catalog = Catalog::builtin();
        let disks = catalog.service("compute", "disks").unwrap();
        let config = disks.method_config(&Method::AggregatedList).unwrap();
        assert_eq!(config.collection_name(), "disks");
    }

    #[test]
    fn test_expand_path_encodes_values() {
        let config = MethodConfig {
            http_method: "GET".into(),
            relative_path: "projects/{project}/zones/{zone}/instances/{instance}".into(),
            request_field: None,
            query_params: vec![],
            items_field: default_items_field(),
        };
        let payload = json!({"project": "p", "zone": "us-central1-a", "instance": "a b"});
        let path = config
            .expand_path(payload.as_object().unwrap(), "instances.get")
            .unwrap();
        assert_eq!(path, "projects/p/zones/us-central1-a/instances/a%20b");
    }

    #[test]
    fn test_expand_path_reports_missing_param() {
        let catalog = Catalog::builtin();
        let instances = catalog.service("compute", "instances").unwrap();
        let config = instances.method_config(&Method::Get).unwrap();
        let payload = json!({"project": "p", "zone": "z"});
        let err = config
            .expand_path(payload.as_object().unwrap(), "instances.get")
            .unwrap_err();
        assert!(err.to_string().contains("`instance`"));
    }

    #[test]
    fn test_match_path_accepts_self_link() {
        let catalog = Catalog::builtin();
        let instances = catalog.service("compute", "instances").unwrap();
        let config = instances.method_config(&Method::Get).unwrap();
        let params = config
            .match_path(
                "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a/instances/vm-1",
            )
            .unwrap();
        assert_eq!(params["project"], "my-project");
        assert_eq!(params["zone"], "us-central1-a");
        assert_eq!(params["instance"], "vm-1");
    }

    #[test]
    fn test_match_path_rejects_other_collection() {
        let catalog = Catalog::builtin();
        let instances = catalog.service("compute", "instances").unwrap();
        let config = instances.method_config(&Method::Get).unwrap();
        assert!(config
            .match_path("projects/p/zones/z/disks/d")
            .is_none());
        assert!(config.match_path("instances/vm").is_none());
    }

    #[test]
    fn test_root_url_override() {
        let catalog = Catalog::builtin_with_root_url("http://127.0.0.1:8080").unwrap();
        let api = catalog.api("compute").unwrap();
        assert_eq!(api.batch_url(), "http://127.0.0.1:8080/batch/compute/v1");
        assert_eq!(api.base_url(), "http://127.0.0.1:8080/compute/v1/");
    }

    #[test]
    fn test_from_json_loads_other_api() {
        let catalog = Catalog::from_json(
            r#"{"apis": {"sqladmin": {
                "version": "v1beta4",
                "root_url": "https://sqladmin.googleapis.com/",
                "service_path": "sql/v1beta4/",
                "batch_path": "batch/sqladmin/v1beta4",
                "operation_kind": "sql#operation",
                "operation_services": {"global": "operations"},
                "services": {
                    "instances": {"methods": {"get": {
                        "http_method": "GET",
                        "relative_path": "projects/{project}/instances/{instance}"
                    }}},
                    "operations": {"role": "operations", "methods": {"get": {
                        "http_method": "GET",
                        "relative_path": "projects/{project}/operations/{operation}"
                    }}}
                }
            }}}"#,
        )
        .unwrap();

        let api = catalog.api("sqladmin").unwrap();
        assert_eq!(api.version, "v1beta4");
        assert_eq!(api.batch_url(), "https://sqladmin.googleapis.com/batch/sqladmin/v1beta4");
        assert!(catalog.api("compute").is_none());
        assert_eq!(
            catalog
                .operations_service("sqladmin", &OperationScope::Global)
                .unwrap()
                .name,
            "operations"
        );
        assert!(catalog
            .operations_service("sqladmin", &OperationScope::Zonal("z".into()))
            .is_none());
        assert!(Catalog::from_json("{\"apis\": 3}").is_err());
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let catalog = Catalog::builtin();
        let err = catalog
            .request("compute", "firewalls", Method::AggregatedList, Map::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_extract_short_name() {
        assert_eq!(
            extract_short_name("https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a"),
            "us-central1-a"
        );
        assert_eq!(extract_short_name("plain"), "plain");
    }
}
