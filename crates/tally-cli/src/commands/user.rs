//! User command handlers

use anyhow::{Context, Result};

use tally_core::SyncCoordinator;

use super::find_user_id;
use crate::editor::confirm;
use crate::output::{Output, UserSummary};

/// Add a user
pub async fn add(coordinator: &SyncCoordinator, name: String, output: &Output) -> Result<()> {
    let user = coordinator
        .add_user(&name)
        .await
        .context("Failed to add user")?;

    output.success(&format!("Added user: {} ({})", user.name, user.id));
    Ok(())
}

/// Delete a user and all of their tasks
pub async fn delete(coordinator: &SyncCoordinator, key: String, output: &Output) -> Result<()> {
    let state = coordinator.state();
    let user_id = find_user_id(&state, &key)?;

    if output.should_prompt() {
        let task_count = state.tasks(&user_id).len();
        let name = state.user(&user_id).map(|u| u.name.as_str()).unwrap_or("");
        println!("Delete user: {} ({}) and {} task(s)", name, user_id, task_count);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let user = coordinator
        .delete_user(&user_id)
        .await
        .context("Failed to delete user")?;

    output.success(&format!("Deleted user: {} ({})", user.name, user.id));
    Ok(())
}

/// List users with task counts
pub fn list(coordinator: &SyncCoordinator, output: &Output) -> Result<()> {
    let state = coordinator.state();
    let summaries: Vec<_> = state
        .users()
        .values()
        .map(|user| UserSummary {
            user,
            selected: state.selection() == Some(user.id.as_str()),
            stats: state.stats(&user.id),
        })
        .collect();

    output.print_users(&summaries);
    Ok(())
}
