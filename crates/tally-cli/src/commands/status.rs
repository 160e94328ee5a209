//! Status and share command handlers

use anyhow::{bail, Context, Result};

use tally_core::{Config, CredentialSource, SyncCoordinator, SyncMode};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(coordinator: &SyncCoordinator, config: &Config, output: &Output) -> Result<()> {
    let status = coordinator.sync_status();
    let state = coordinator.state();
    let task_count = state.all_tasks().count();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync": status,
                    "data_dir": config.data_dir,
                    "counts": {
                        "users": state.user_count(),
                        "tasks": task_count
                    },
                    "selected_user": state.selection()
                })
            );
        }
        OutputFormat::Quiet => match &status.mode {
            SyncMode::RemoteEnabled { document_id } => println!("{}", document_id),
            SyncMode::LocalOnly => println!("local"),
        },
        OutputFormat::Human => {
            println!("Tally Status");
            println!("============");
            println!();
            println!("Sync:");
            match &status.mode {
                SyncMode::RemoteEnabled { document_id } => {
                    println!("  Mode:     remote");
                    println!("  Document: {}", document_id);
                }
                SyncMode::LocalOnly => {
                    println!("  Mode:     local only");
                    println!("  Snapshot: {}", config.snapshot_path().display());
                }
            }
            let credential = match status.credential_source {
                CredentialSource::Static => "configured token".to_string(),
                CredentialSource::Session => match status.credential_remaining_secs {
                    Some(secs) => format!("session token ({} min left)", secs.div_ceil(60)),
                    None => "session token".to_string(),
                },
                CredentialSource::None => "none (you will be asked on first write)".to_string(),
            };
            println!("  Token:    {}", credential);
            println!(
                "  Synced:   {}",
                status
                    .last_synced
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            if let Some(ref url) = status.share_url {
                println!("  Share:    {}", url);
            }
            println!();
            println!("Contents:");
            println!("  Users: {}", state.user_count());
            println!("  Tasks: {}", task_count);
            if let Some(selected) = state.selection() {
                println!("  Selected user: {}", selected);
            }
        }
    }

    Ok(())
}

/// Print the share link, optionally opening it in a browser
pub fn share(coordinator: &SyncCoordinator, open_browser: bool, output: &Output) -> Result<()> {
    let status = coordinator.sync_status();
    let Some(url) = status.share_url else {
        bail!(
            "No share link available. Configure a shared document with:\n  \
             tally config set document_id <gist-id>"
        );
    };

    output.print_value(&serde_json::json!({ "share_url": url }), &url);

    if open_browser {
        open::that(&url).with_context(|| format!("Failed to open {}", url))?;
    }
    Ok(())
}
