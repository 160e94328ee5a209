//! Gist API client
//!
//! GET `{base}/{id}` returns the envelope; PATCH `{base}/{id}` replaces the
//! tracker attachment. Status codes map onto the sync error taxonomy:
//! 401 → `Unauthorized`, 404 → `NotFound`, 422 → `Validation`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::{RemoteSnapshot, RemoteStore};
use crate::config::Config;
use crate::credential::Credential;
use crate::document::{Envelope, EnvelopeUpdate, RemoteDocument};
use crate::error::{SyncError, SyncResult};

const ACCEPT_GIST: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

/// HTTP client for a gist-like document API
#[derive(Debug, Clone)]
pub struct GistClient {
    client: Client,
    base_url: String,
    auth_scheme: String,
}

impl GistClient {
    /// Create a client for the given API base URL
    pub fn new(base_url: &str, auth_scheme: &str, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_scheme: auth_scheme.to_string(),
        })
    }

    /// Create a client from application configuration
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        Self::new(
            &config.api_base_url,
            &config.auth_scheme,
            config.request_timeout(),
        )
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/{}", self.base_url, document_id)
    }
}

#[async_trait]
impl RemoteStore for GistClient {
    async fn fetch_document(&self, document_id: &str) -> SyncResult<RemoteSnapshot> {
        let url = self.document_url(document_id);
        debug!("Fetching remote document from {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, ACCEPT_GIST)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound {
                document_id: document_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Fetch of {} failed with HTTP {}", document_id, status);
            return Err(SyncError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(network_error)?;
        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| SyncError::MalformedResponse(format!("envelope is not valid: {}", e)))?;
        let document = envelope.document().map_err(SyncError::MalformedResponse)?;

        info!(
            "Fetched remote document: {} users, {} tasks",
            document.users.len(),
            document.total_tasks()
        );

        Ok(RemoteSnapshot {
            document,
            envelope_id: envelope.id,
            html_url: envelope.html_url,
        })
    }

    async fn write_document(
        &self,
        document_id: &str,
        credential: &Credential,
        document: &RemoteDocument,
    ) -> SyncResult<()> {
        let url = self.document_url(document_id);
        let update = EnvelopeUpdate::replace_attachment(document)
            .map_err(|e| SyncError::InvalidInput(format!("Failed to encode document: {}", e)))?;

        debug!(
            "Writing remote document {}: {} users, {} tasks",
            document_id,
            document.users.len(),
            document.total_tasks()
        );

        let response = self
            .client
            .patch(&url)
            .header(ACCEPT, ACCEPT_GIST)
            .header(
                AUTHORIZATION,
                format!("{} {}", self.auth_scheme, credential.expose()),
            )
            .json(&update)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            info!("Remote document {} written", document_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Write to {} rejected with HTTP {}", document_id, status);
        Err(match status {
            StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
            StatusCode::NOT_FOUND => SyncError::NotFound {
                document_id: document_id.to_string(),
            },
            StatusCode::UNPROCESSABLE_ENTITY => SyncError::Validation(body),
            _ => SyncError::Http {
                status: status.as_u16(),
                body,
            },
        })
    }
}

fn network_error(error: reqwest::Error) -> SyncError {
    SyncError::Network(error.to_string())
}
