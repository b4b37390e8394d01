//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality. It is the production [`BatchTransport`].

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use super::multipart::{self, BatchEnvelope, HttpCall, HttpReply};
use crate::requests::BatchTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub project_id: String,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(project_id: &str) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(project_id, credentials)
    }

    /// Create a client with explicit credentials
    pub fn with_credentials(project_id: &str, credentials: GcpCredentials) -> Result<Self> {
        let http = GcpHttpClient::new()?;

        Ok(Self {
            credentials,
            http,
            project_id: project_id.to_string(),
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }
}

#[async_trait]
impl BatchTransport for GcpClient {
    async fn send_batch(&self, batch_url: &str, calls: &[HttpCall]) -> Result<Vec<Option<HttpReply>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Batch of {} calls for project {} to {}",
            calls.len(),
            self.project_id,
            batch_url
        );
        let envelope = BatchEnvelope::new();
        let body = envelope.encode(calls)?;
        let token = self.get_token().await?;

        let reply = self
            .http
            .post_batch(batch_url, &token, &envelope.content_type(), body)
            .await?;

        multipart::decode(&reply.content_type, &reply.body, calls.len())
            .context("Failed to decode batch response")
    }
}
