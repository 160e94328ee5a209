//! Storage layer
//!
//! Handles the local snapshot used when no remote document is configured.

pub mod error;
pub mod persistence;

pub use error::{SnapshotStep, StorageError, StorageResult};
pub use persistence::LocalStore;
