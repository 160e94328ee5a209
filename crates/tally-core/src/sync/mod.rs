//! Background synchronization
//!
//! The coordinator persists after every mutation; this module adds the
//! periodic pull that picks up changes made by other writers.
//!
//! ## Usage
//!
//! ```ignore
//! let mut handle = spawn_auto_sync(coordinator.clone(), config.sync_interval());
//! while let Some(event) = handle.event_rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod periodic;

pub use periodic::{spawn_auto_sync, AutoSyncCommand, AutoSyncEvent, AutoSyncHandle};
