//! GCP API interaction module
//!
//! This module provides the wire-level pieces of talking to Google Cloud:
//! authentication, the HTTP client and the batch multipart format.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client, the production batch transport
//! - [`http`] - HTTP utilities for REST API calls
//! - [`multipart`] - Encoding and decoding of `multipart/mixed` batches
//!
//! # Example
//!
//! ```no_run
//! use gcpbatch::gcp::client::GcpClient;
//! use gcpbatch::requests::make_requests;
//! use gcpbatch::resource::{Catalog, Method};
//! use serde_json::json;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new("my-project").await?;
//!     let catalog = Catalog::builtin();
//!     let payload = json!({"project": "my-project", "zone": "us-central1-a", "instance": "vm-1"});
//!     let request = catalog.request(
//!         "compute",
//!         "instances",
//!         Method::Custom("start".into()),
//!         payload.as_object().cloned().unwrap_or_default(),
//!     )?;
//!     let batch_url = catalog.api("compute").unwrap().batch_url();
//!     let (started, diagnostics) = make_requests(&client, catalog, &batch_url, vec![request])?
//!         .collect()
//!         .await;
//!     println!("{} started, {} problems", started.len(), diagnostics.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod multipart;
