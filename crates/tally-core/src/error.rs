//! Sync error taxonomy
//!
//! Every failure the coordinator, credential cache or remote store can
//! report. Errors are returned unchanged to the presentation layer, which
//! decides how to show them.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure; retry by re-invoking the operation
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected by the remote store (HTTP 401)
    #[error("Credential rejected by the remote store")]
    Unauthorized,

    /// Document id unknown to the remote store (HTTP 404)
    #[error("Remote document '{document_id}' not found")]
    NotFound { document_id: String },

    /// Remote store rejected the payload (HTTP 422)
    #[error("Remote store rejected the document: {0}")]
    Validation(String),

    /// Any other non-success HTTP status
    #[error("Remote store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No credential could be obtained (prompt cancelled or empty)
    #[error("A credential is required to write to the remote document")]
    CredentialRequired,

    /// Another persist or pull holds the single-flight lock
    #[error("Another sync operation is in progress")]
    OperationInProgress,

    /// Refused to delete the only remaining user
    #[error("Cannot delete the last user")]
    LastUser,

    /// Remote data does not match the expected shape
    #[error("Malformed remote document: {0}")]
    MalformedResponse(String),

    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("Unknown task {task_id} for user '{user_id}'")]
    UnknownTask { user_id: String, task_id: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local snapshot could not be read or written
    #[error(transparent)]
    Local(#[from] StorageError),
}

impl SyncError {
    /// Whether re-invoking the same operation may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::OperationInProgress => true,
            SyncError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Network(_) => Some("Check your internet connection and try again."),
            SyncError::Unauthorized => {
                Some("The token was cleared. Provide a valid token with gist scope.")
            }
            SyncError::NotFound { .. } => Some("Check the document_id setting."),
            SyncError::CredentialRequired => {
                Some("Enter a token when prompted, or set TALLY_TOKEN.")
            }
            SyncError::OperationInProgress => Some("Wait a moment and try again."),
            SyncError::LastUser => Some("Add another user before deleting this one."),
            SyncError::Local(err) => err.recovery_suggestion(),
            _ => None,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
