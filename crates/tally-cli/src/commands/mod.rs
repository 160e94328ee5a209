//! Command handlers

pub mod config;
pub mod data;
pub mod status;
pub mod sync;
pub mod task;
pub mod user;

use anyhow::{anyhow, bail, Result};

use tally_core::{SyncCoordinator, TrackerState};

/// Find a user by id, or by name ignoring case
pub fn find_user_id(state: &TrackerState, key: &str) -> Result<String> {
    if state.user(key).is_some() {
        return Ok(key.to_string());
    }

    let matches: Vec<_> = state
        .users()
        .values()
        .filter(|u| u.name.eq_ignore_ascii_case(key))
        .collect();

    match matches.len() {
        0 => bail!("No user found matching: {}", key),
        1 => Ok(matches[0].id.clone()),
        _ => {
            eprintln!("Multiple users are named '{}':", key);
            for user in &matches {
                eprintln!("  {} - {}", user.id, user.name);
            }
            bail!("Ambiguous name. Use the user id instead.");
        }
    }
}

/// The user a task command acts on: `--user` if given, otherwise the
/// current selection
pub fn resolve_user(coordinator: &SyncCoordinator, user: Option<&str>) -> Result<String> {
    if let Some(key) = user {
        let id = find_user_id(&coordinator.state(), key)?;
        coordinator.select_user(&id)?;
    }

    coordinator
        .state()
        .selection()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No users yet. Run `tally init` first."))
}
