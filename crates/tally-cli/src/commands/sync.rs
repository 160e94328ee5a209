//! Sync command handlers

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use tally_core::{spawn_auto_sync, AutoSyncCommand, AutoSyncEvent, LoadOutcome, SyncCoordinator};

use crate::output::Output;

/// Pull the shared document now
pub async fn pull(coordinator: &SyncCoordinator, output: &Output) -> Result<()> {
    output.message("Pulling shared document...");

    match coordinator.sync_pull().await.context("Sync failed")? {
        LoadOutcome::Loaded { users, tasks } => {
            output.success(&format!(
                "Sync complete - {} user(s), {} task(s)",
                users, tasks
            ));
        }
        LoadOutcome::Empty | LoadOutcome::Skipped => {
            output.message("The shared document has no users yet. Run `tally init` to add defaults.");
        }
    }
    Ok(())
}

/// Write the current state to the shared document
pub async fn push(coordinator: &SyncCoordinator, output: &Output) -> Result<()> {
    coordinator.persist().await.context("Push failed")?;
    output.success("Pushed current state");
    Ok(())
}

/// Keep pulling in the background until the user quits
///
/// Reads single-line commands from stdin: `p` pulls now, `f` forgets the
/// session token, `q` quits. With no interval only `p` pulls.
pub async fn watch(
    coordinator: Arc<SyncCoordinator>,
    interval: Option<Duration>,
    output: &Output,
) -> Result<()> {
    let mut handle = spawn_auto_sync(coordinator.clone(), interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    output.message(&format!(
        "{}. Commands: p = pull now, f = forget token, q = quit",
        watch_banner(interval)
    ));

    loop {
        tokio::select! {
            event = handle.event_rx.recv() => match event {
                Some(AutoSyncEvent::Stopped) | None => break,
                Some(event) => report_event(&event, output),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "p" | "pull" => {
                        let _ = handle.command_tx.send(AutoSyncCommand::PullNow).await;
                    }
                    "f" | "forget" => coordinator.forget_credential(),
                    "q" | "quit" => handle.shutdown().await,
                    "" => {}
                    other => output.message(&format!("Unknown command: {}", other)),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => handle.shutdown().await,
        }
    }

    output.message("Stopped watching.");
    Ok(())
}

fn watch_banner(interval: Option<Duration>) -> String {
    match interval {
        Some(every) => format!("Watching for changes every {} min", every.as_secs().div_ceil(60)),
        None => "Periodic pulls are disabled (sync_interval_minutes = 0)".to_string(),
    }
}

fn report_event(event: &AutoSyncEvent, output: &Output) {
    match event {
        AutoSyncEvent::Pulled { users, tasks } => {
            output.message(&format!("Pulled: {} user(s), {} task(s)", users, tasks))
        }
        AutoSyncEvent::Empty => output.message("Shared document has no users"),
        AutoSyncEvent::Skipped => output.message("Skipped pull, another sync is running"),
        AutoSyncEvent::Error(e) => eprintln!("⚠ Auto-sync failed: {}", e),
        AutoSyncEvent::Stopped => {}
    }
}
