//! Remote document store
//!
//! The coordinator talks to the shared document through the [`RemoteStore`]
//! trait. [`GistClient`] is the HTTP implementation; tests and alternative
//! strategies (e.g. optimistic-concurrency tokens) plug in behind the same
//! trait.
//!
//! No retries happen at this layer.

mod gist;

use async_trait::async_trait;

use crate::credential::Credential;
use crate::document::RemoteDocument;
use crate::error::SyncResult;

pub use gist::GistClient;

/// A fetched document plus the envelope fields the store exposes
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub document: RemoteDocument,
    /// Envelope id as reported by the store
    pub envelope_id: Option<String>,
    /// Sharing link for the document
    pub html_url: Option<String>,
}

impl RemoteSnapshot {
    pub fn new(document: RemoteDocument) -> Self {
        Self {
            document,
            envelope_id: None,
            html_url: None,
        }
    }
}

/// Read/replace access to one remote document
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the document
    ///
    /// Fails with `NotFound`, `Network`, `MalformedResponse` or `Http`.
    async fn fetch_document(&self, document_id: &str) -> SyncResult<RemoteSnapshot>;

    /// Replace the whole document
    ///
    /// Fails with `Unauthorized`, `NotFound`, `Validation`, `Network` or `Http`.
    async fn write_document(
        &self,
        document_id: &str,
        credential: &Credential,
        document: &RemoteDocument,
    ) -> SyncResult<()>;
}
