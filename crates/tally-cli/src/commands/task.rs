//! Task command handlers

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};

use tally_core::{Priority, SyncCoordinator, TaskFields, TaskFilter, TaskStatus};

use super::resolve_user;
use crate::editor::confirm;
use crate::output::Output;

/// Field changes given on the command line
#[derive(Debug, Clone, Default)]
pub struct TaskEdits {
    pub name: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<NaiveDate>,
    pub clear_deadline: bool,
    pub update: Option<String>,
}

impl TaskEdits {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.deadline.is_none()
            && !self.clear_deadline
            && self.update.is_none()
    }

    /// Overlay the given changes on existing fields
    pub fn apply_to(self, mut fields: TaskFields) -> TaskFields {
        if let Some(name) = self.name {
            fields.name = name;
        }
        if let Some(priority) = self.priority {
            fields.priority = priority;
        }
        if let Some(status) = self.status {
            fields.status = status;
        }
        if self.clear_deadline {
            fields.deadline = None;
        } else if self.deadline.is_some() {
            fields.deadline = self.deadline;
        }
        if let Some(update) = self.update {
            fields.update = update;
        }
        fields
    }
}

/// Add a task for a user
pub async fn add(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    name: String,
    edits: TaskEdits,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let fields = edits.apply_to(TaskFields::new(name));

    let task = coordinator
        .add_task(&user_id, fields)
        .await
        .context("Failed to add task")?;

    output.success(&format!("Added task #{} for {}", task.id, user_id));
    output.print_task(&task);
    Ok(())
}

/// Edit a task's fields
pub async fn edit(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    id: u64,
    edits: TaskEdits,
    output: &Output,
) -> Result<()> {
    if edits.is_empty() {
        bail!("Nothing to change. Pass at least one of --name, --priority, --status, --deadline, --clear-deadline, --update.");
    }

    let user_id = resolve_user(coordinator, user.as_deref())?;
    let current = coordinator
        .state()
        .task(&user_id, id)
        .cloned()
        .ok_or_else(|| anyhow!("Task #{} not found for {}", id, user_id))?;
    let fields = edits.apply_to(TaskFields::from(&current));

    let task = coordinator
        .edit_task(&user_id, id, fields)
        .await
        .context("Failed to update task")?;

    output.success("Task updated");
    output.print_task(&task);
    Ok(())
}

/// Delete a task
pub async fn delete(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    id: u64,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let task = coordinator
        .state()
        .task(&user_id, id)
        .cloned()
        .ok_or_else(|| anyhow!("Task #{} not found for {}", id, user_id))?;

    if output.should_prompt() {
        println!("Delete task: #{} - {}", task.id, task.name);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    coordinator
        .delete_task(&user_id, id)
        .await
        .context("Failed to delete task")?;

    output.success(&format!("Deleted task #{}", id));
    Ok(())
}

/// Show one task
pub fn show(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    id: u64,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let state = coordinator.state();
    let task = state
        .task(&user_id, id)
        .ok_or_else(|| anyhow!("Task #{} not found for {}", id, user_id))?;

    output.print_task(task);
    Ok(())
}

/// List a user's tasks
pub fn list(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    filter: TaskFilter,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let state = coordinator.state();
    output.print_tasks(&state.filtered_tasks(&user_id, filter));
    Ok(())
}

/// Show tasks as status columns
pub fn board(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    filter: TaskFilter,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let state = coordinator.state();
    output.print_board(&state.board(&user_id, filter));
    Ok(())
}

/// Tasks due on a date (today by default)
pub fn due(
    coordinator: &SyncCoordinator,
    user: Option<String>,
    date: Option<NaiveDate>,
    output: &Output,
) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let state = coordinator.state();

    let tasks = state.tasks_due_on(&user_id, date);
    if output.should_prompt() {
        println!("Due {}:", date.format("%A, %B %-d, %Y"));
    }
    output.print_tasks(&tasks);
    Ok(())
}

/// Completion statistics for a user
pub fn stats(coordinator: &SyncCoordinator, user: Option<String>, output: &Output) -> Result<()> {
    let user_id = resolve_user(coordinator, user.as_deref())?;
    let state = coordinator.state();
    let user = state
        .user(&user_id)
        .ok_or_else(|| anyhow!("User not found: {}", user_id))?;

    output.print_stats(user, &state.stats(&user_id));
    Ok(())
}
