//! Periodic auto-sync
//!
//! A background task that pulls the shared document on a fixed interval so
//! long-running sessions see other writers' changes. A tick that lands while
//! a mutation or pull is in flight is skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::coordinator::{LoadOutcome, SyncCoordinator};

/// Commands sent to the auto-sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSyncCommand {
    /// Pull now, waiting briefly for any in-flight operation
    PullNow,
    /// Stop the task
    Shutdown,
}

/// Events emitted by the auto-sync task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSyncEvent {
    /// State replaced from the shared document
    Pulled { users: usize, tasks: usize },
    /// The shared document has no users
    Empty,
    /// Tick skipped because another operation was in flight
    Skipped,
    /// Pull failed; state is unchanged
    Error(String),
    /// The task has stopped
    Stopped,
}

/// Handle to control the auto-sync task
pub struct AutoSyncHandle {
    /// Send commands to the task
    pub command_tx: mpsc::Sender<AutoSyncCommand>,
    /// Receive events from the task
    pub event_rx: mpsc::Receiver<AutoSyncEvent>,
}

impl AutoSyncHandle {
    /// Ask the task to stop; it emits `Stopped` and exits
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(AutoSyncCommand::Shutdown).await;
    }
}

/// Spawn the auto-sync task
///
/// The first pull happens one `interval` after spawning. With no interval
/// the task only answers `PullNow`.
pub fn spawn_auto_sync(
    coordinator: Arc<SyncCoordinator>,
    interval: Option<Duration>,
) -> AutoSyncHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);

    tokio::spawn(auto_sync_loop(coordinator, interval, command_rx, event_tx));

    AutoSyncHandle {
        command_tx,
        event_rx,
    }
}

async fn auto_sync_loop(
    coordinator: Arc<SyncCoordinator>,
    interval: Option<Duration>,
    mut command_rx: mpsc::Receiver<AutoSyncCommand>,
    event_tx: mpsc::Sender<AutoSyncEvent>,
) {
    let mut ticker = interval.map(|every| {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    debug!("Auto-sync started, interval {:?}", interval);

    loop {
        let result = tokio::select! {
            _ = next_tick(&mut ticker) => coordinator.auto_pull().await,
            cmd = command_rx.recv() => match cmd {
                Some(AutoSyncCommand::PullNow) => coordinator.sync_pull().await,
                Some(AutoSyncCommand::Shutdown) | None => break,
            },
        };

        let event = match result {
            Ok(LoadOutcome::Loaded { users, tasks }) => AutoSyncEvent::Pulled { users, tasks },
            Ok(LoadOutcome::Empty) => AutoSyncEvent::Empty,
            Ok(LoadOutcome::Skipped) => AutoSyncEvent::Skipped,
            Err(e) => {
                warn!("Auto-sync pull failed: {}", e);
                AutoSyncEvent::Error(e.to_string())
            }
        };
        let _ = event_tx.send(event).await;
    }

    debug!("Auto-sync stopped");
    let _ = event_tx.send(AutoSyncEvent::Stopped).await;
}

/// Wait for the next tick, or forever when periodic pulls are off
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
