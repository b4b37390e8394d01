//! Resource abstraction layer
//!
//! This module provides a data-driven description of GCP REST services.
//! Method configurations are loaded from JSON files at compile time, so new
//! collections can be batched and polled without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Loads the service catalog from embedded JSON
//! - [`request`] - Typed requests and their encoding into raw HTTP calls
//!
//! # Service Definitions
//!
//! Services are defined in JSON files under `src/resources/`:
//! - `compute.json` - Compute Engine collections and operation services
//!
//! # Example
//!
//! ```no_run
//! use gcpbatch::resource::{Catalog, Method};
//! use serde_json::json;
//!
//! let catalog = Catalog::builtin();
//! let payload = json!({"project": "my-project", "zone": "us-central1-a"});
//! let request = catalog
//!     .request("compute", "instances", Method::List, payload.as_object().unwrap().clone())
//!     .unwrap();
//! assert!(request.is_list_style());
//! ```

pub mod registry;
pub mod request;

pub use registry::{
    extract_short_name, ApiDef, Catalog, MethodConfig, OperationScope, Service, ServiceRole,
};
pub use request::{ApiRequest, Method, PAGE_TOKEN_FIELD};
