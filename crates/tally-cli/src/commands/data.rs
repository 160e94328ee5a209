//! Init, export and import handlers

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use tally_core::{RemoteDocument, SyncCoordinator};

use crate::output::Output;

/// Seed the default users into an empty tracker
pub async fn init(coordinator: &SyncCoordinator, output: &Output) -> Result<()> {
    let state = coordinator.state();
    if !state.is_empty() {
        output.message(&format!(
            "Already initialized with {} user(s).",
            state.user_count()
        ));
        return Ok(());
    }

    coordinator
        .seed_defaults()
        .await
        .context("Failed to create default users")?;

    let names: Vec<_> = coordinator
        .state()
        .users()
        .values()
        .map(|u| format!("{} ({})", u.name, u.id))
        .collect();
    output.success(&format!("Created users: {}", names.join(", ")));
    Ok(())
}

/// Write the current document as JSON to a file or stdout
pub fn export(coordinator: &SyncCoordinator, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let document = coordinator.export_document();
    let json = document.to_json().context("Failed to encode document")?;

    match path {
        Some(path) => {
            fs::write(&path, json)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            output.success(&format!(
                "Exported {} user(s) and {} task(s) to {}",
                document.users.len(),
                document.total_tasks(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Merge an exported document into the tracker
pub async fn import(coordinator: &SyncCoordinator, path: PathBuf, output: &Output) -> Result<()> {
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read import file: {:?}", path))?;
    let document = RemoteDocument::from_export_json(&content)
        .with_context(|| format!("Invalid tracker data in {:?}", path))?;
    let users = document.users.len();
    let tasks = document.total_tasks();

    let report = coordinator
        .import_document(document)
        .await
        .context("Failed to import data")?;

    output.success(&format!("Imported {} user(s) and {} task(s)", users, tasks));
    for id in &report.orphaned_lists {
        output.message(&format!("  Task list '{}' has no matching user", id));
    }
    Ok(())
}
