//! Remote document wire format
//!
//! The shared state is stored as one JSON attachment inside a gist-like
//! envelope:
//!
//! ```text
//! {
//!   "id": "b5a7...",
//!   "html_url": "https://gist.github.com/...",
//!   "files": {
//!     "accountability-data.json": { "content": "{ \"users\": ..., ... }" }
//!   }
//! }
//! ```
//!
//! The attachment content is a [`RemoteDocument`]. Reading it replaces the
//! local state wholesale; there is no field-level merge.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::models::{Task, User};

/// Name of the attachment that carries the tracker data
pub const ATTACHMENT_NAME: &str = "accountability-data.json";

/// Full snapshot of tracker state as persisted remotely
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub tasks_data: BTreeMap<String, Vec<Task>>,
    #[serde(default = "default_next_user_id")]
    pub next_user_id: u64,
    #[serde(default)]
    pub current_task_id: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: String,
}

impl RemoteDocument {
    /// Parse the attachment content
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Parse an exported tracker file
    ///
    /// Stricter than [`from_json`](Self::from_json): both `users` and
    /// `tasksData` must be present as objects, so an unrelated JSON file is
    /// not mistaken for an empty tracker.
    pub fn from_export_json(content: &str) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| SyncError::InvalidInput(format!("not valid JSON: {}", e)))?;

        let missing: Vec<&str> = ["users", "tasksData"]
            .into_iter()
            .filter(|key| !value.get(key).is_some_and(serde_json::Value::is_object))
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "invalid file format: missing {}",
                missing.join(" and ")
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| SyncError::InvalidInput(format!("invalid file format: {}", e)))
    }

    /// Render the attachment content (pretty-printed, like the web client)
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks_data.values().map(Vec::len).sum()
    }
}

fn default_next_user_id() -> u64 {
    1
}

/// One file inside the envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeFile {
    #[serde(default)]
    pub content: Option<String>,
}

/// The remote store's wrapper around the attachment
///
/// Envelope fields other than the attachment are carried through but not
/// interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, EnvelopeFile>,
}

impl Envelope {
    /// Extract and parse the tracker attachment
    ///
    /// Returns a description of the problem when the attachment is missing,
    /// has no content, or does not parse.
    pub fn document(&self) -> Result<RemoteDocument, String> {
        let file = self
            .files
            .get(ATTACHMENT_NAME)
            .ok_or_else(|| format!("attachment '{}' not found", ATTACHMENT_NAME))?;
        let content = file
            .content
            .as_deref()
            .ok_or_else(|| format!("attachment '{}' has no content", ATTACHMENT_NAME))?;
        RemoteDocument::from_json(content)
            .map_err(|e| format!("attachment '{}' is not valid: {}", ATTACHMENT_NAME, e))
    }
}

/// PATCH body that replaces the tracker attachment
#[derive(Debug, Serialize)]
pub struct EnvelopeUpdate {
    pub files: BTreeMap<String, EnvelopeFile>,
}

impl EnvelopeUpdate {
    pub fn replace_attachment(document: &RemoteDocument) -> serde_json::Result<Self> {
        let mut files = BTreeMap::new();
        files.insert(
            ATTACHMENT_NAME.to_string(),
            EnvelopeFile {
                content: Some(document.to_json()?),
            },
        );
        Ok(Self { files })
    }
}
