//! Tally Core Library
//!
//! This crate provides the core functionality for Tally, a small
//! accountability tracker: users, their tasks, and a shared JSON document
//! that every participant reads and writes.
//!
//! # Architecture
//!
//! - **SyncCoordinator**: owns the state; every mutation is applied in
//!   memory, persisted, and rolled back if the persist fails
//! - **RemoteStore**: whole-document read/replace against a gist-like API
//! - **CredentialCache**: short-lived session token with a fixed TTL
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let coordinator = SyncCoordinator::from_config(&config, prompt, notifier)?;
//! coordinator.load().await?;
//!
//! let task = coordinator
//!     .add_task("person1", TaskFields::new("Write report"))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - `coordinator`: state ownership, persist/rollback, pulls
//! - `state`: in-memory users, tasks and counters
//! - `models`: users, tasks, filters and stats
//! - `document`: the wire document and its envelope
//! - `remote`: remote store trait and HTTP client
//! - `credential`: credential cache and prompt seam
//! - `storage`: local snapshot persistence
//! - `sync`: periodic auto-sync task
//! - `config`: application configuration

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod document;
pub mod error;
pub mod models;
pub mod notify;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use coordinator::{LoadOutcome, SyncCoordinator, SyncMode, SyncStatus};
pub use credential::{Credential, CredentialCache, CredentialPrompt, CredentialSource, NoPrompt};
pub use document::{RemoteDocument, ATTACHMENT_NAME};
pub use error::{SyncError, SyncResult};
pub use models::{Priority, Task, TaskFields, TaskFilter, TaskStats, TaskStatus, User};
pub use notify::{LogNotifier, Notifier, Severity};
pub use remote::{GistClient, RemoteSnapshot, RemoteStore};
pub use state::{IntegrityReport, TrackerState};
pub use storage::{LocalStore, StorageError};
pub use sync::{spawn_auto_sync, AutoSyncCommand, AutoSyncEvent, AutoSyncHandle};
