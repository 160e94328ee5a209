//! In-memory tracker state
//!
//! `TrackerState` holds users, their task lists, the two id counters and
//! the current selection. Only the coordinator mutates it; every mutation
//! returns an [`Undo`] record that restores the exact previous state when a
//! persist fails.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::document::RemoteDocument;
use crate::error::{SyncError, SyncResult};
use crate::models::{Task, TaskFields, TaskFilter, TaskStats, TaskStatus, User};

/// Users, tasks, counters and selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerState {
    users: BTreeMap<String, User>,
    tasks_data: BTreeMap<String, Vec<Task>>,
    next_user_id: u64,
    current_task_id: u64,
    selection: Option<String>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            tasks_data: BTreeMap::new(),
            next_user_id: 1,
            current_task_id: 0,
            selection: None,
        }
    }
}

/// What integrity validation changed after a load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Users that had no task list; an empty one was created
    pub created_lists: Vec<String>,
    /// Task lists whose key matches no user (kept, not dropped)
    pub orphaned_lists: Vec<String>,
    /// The task counter was behind the highest task id and was raised
    pub raised_task_counter: bool,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.created_lists.is_empty() && self.orphaned_lists.is_empty() && !self.raised_task_counter
    }
}

impl TrackerState {
    /// Build state from a document, repairing what can be repaired
    pub fn from_document(doc: RemoteDocument) -> (Self, IntegrityReport) {
        let mut state = Self {
            users: doc.users,
            tasks_data: doc.tasks_data,
            next_user_id: doc.next_user_id.max(1),
            current_task_id: doc.current_task_id,
            selection: None,
        };
        let report = state.validate();
        state.selection = state.first_user_id();
        (state, report)
    }

    /// Serialize to the wire format with a fresh timestamp
    pub fn to_document(&self, version: &str) -> RemoteDocument {
        RemoteDocument {
            users: self.users.clone(),
            tasks_data: self.tasks_data.clone(),
            next_user_id: self.next_user_id,
            current_task_id: self.current_task_id,
            last_updated: Some(Utc::now()),
            version: version.to_string(),
        }
    }

    /// Replace everything from a document, keeping the selection if that
    /// user still exists
    pub(crate) fn replace_with(&mut self, doc: RemoteDocument) -> IntegrityReport {
        let previous_selection = self.selection.take();
        let (state, report) = Self::from_document(doc);
        *self = state;
        if let Some(id) = previous_selection.filter(|id| self.users.contains_key(id)) {
            self.selection = Some(id);
        }
        report
    }

    fn validate(&mut self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for id in self.users.keys() {
            if !self.tasks_data.contains_key(id) {
                warn!("Initializing empty task list for user {}", id);
                report.created_lists.push(id.clone());
            }
        }
        for id in &report.created_lists {
            self.tasks_data.insert(id.clone(), Vec::new());
        }

        for (id, tasks) in &self.tasks_data {
            if !tasks.is_empty() && !self.users.contains_key(id) {
                warn!("Task list '{}' has {} tasks but no user", id, tasks.len());
                report.orphaned_lists.push(id.clone());
            }
        }

        let max_id = self.all_tasks().map(|t| t.id).max().unwrap_or(0);
        if max_id > self.current_task_id {
            warn!(
                "Task counter {} is behind highest task id {}, raising it",
                self.current_task_id, max_id
            );
            self.current_task_id = max_id;
            report.raised_task_counter = true;
        }

        report
    }

    // ==================== Queries ====================

    pub fn users(&self) -> &BTreeMap<String, User> {
        &self.users
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// No users: the empty state before defaults are seeded
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn first_user_id(&self) -> Option<String> {
        self.users.keys().next().cloned()
    }

    pub fn tasks_data(&self) -> &BTreeMap<String, Vec<Task>> {
        &self.tasks_data
    }

    /// A user's tasks in insertion order
    pub fn tasks(&self, user_id: &str) -> &[Task] {
        self.tasks_data
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn task(&self, user_id: &str, task_id: u64) -> Option<&Task> {
        self.tasks(user_id).iter().find(|t| t.id == task_id)
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks_data.values().flatten()
    }

    pub fn next_user_id(&self) -> u64 {
        self.next_user_id
    }

    pub fn current_task_id(&self) -> u64 {
        self.current_task_id
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn filtered_tasks(&self, user_id: &str, filter: TaskFilter) -> Vec<&Task> {
        self.tasks(user_id)
            .iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    /// Tasks grouped into kanban columns; every column is present
    pub fn board(&self, user_id: &str, filter: TaskFilter) -> BTreeMap<TaskStatus, Vec<&Task>> {
        let mut board: BTreeMap<TaskStatus, Vec<&Task>> =
            TaskStatus::ALL.into_iter().map(|s| (s, Vec::new())).collect();
        for task in self.filtered_tasks(user_id, filter) {
            board.entry(task.status).or_default().push(task);
        }
        board
    }

    /// Tasks whose deadline falls on `date` (calendar view)
    pub fn tasks_due_on(&self, user_id: &str, date: NaiveDate) -> Vec<&Task> {
        self.tasks(user_id)
            .iter()
            .filter(|t| t.deadline == Some(date))
            .collect()
    }

    pub fn stats(&self, user_id: &str) -> TaskStats {
        TaskStats::from_tasks(self.tasks(user_id))
    }

    // ==================== Mutations ====================

    pub(crate) fn select(&mut self, user_id: &str) -> SyncResult<()> {
        if !self.users.contains_key(user_id) {
            return Err(SyncError::UnknownUser(user_id.to_string()));
        }
        self.selection = Some(user_id.to_string());
        Ok(())
    }

    pub(crate) fn add_user(&mut self, name: &str) -> SyncResult<(User, Undo)> {
        let name = required(name, "user name")?;
        let previous_next_user_id = self.next_user_id;
        let previous_selection = self.selection.clone();

        let id = self.allocate_user_id()?;
        let user = User::new(id.clone(), name);
        self.users.insert(id.clone(), user.clone());
        self.tasks_data.insert(id.clone(), Vec::new());
        if self.selection.is_none() {
            self.selection = Some(id.clone());
        }

        Ok((
            user,
            Undo::AddUser {
                user_id: id,
                previous_next_user_id,
                previous_selection,
            },
        ))
    }

    pub(crate) fn delete_user(&mut self, user_id: &str) -> SyncResult<(User, Undo)> {
        if !self.users.contains_key(user_id) {
            return Err(SyncError::UnknownUser(user_id.to_string()));
        }
        if self.users.len() <= 1 {
            return Err(SyncError::LastUser);
        }

        let previous_selection = self.selection.clone();
        let user = self
            .users
            .remove(user_id)
            .ok_or_else(|| SyncError::UnknownUser(user_id.to_string()))?;
        let tasks = self.tasks_data.remove(user_id);

        if self.selection.as_deref() == Some(user_id) {
            self.selection = self.first_user_id();
        }

        Ok((
            user.clone(),
            Undo::DeleteUser {
                user,
                tasks,
                previous_selection,
            },
        ))
    }

    pub(crate) fn add_task(&mut self, user_id: &str, fields: TaskFields) -> SyncResult<(Task, Undo)> {
        if !self.users.contains_key(user_id) {
            return Err(SyncError::UnknownUser(user_id.to_string()));
        }
        let fields = validate_fields(fields)?;

        let task_id = self
            .current_task_id
            .checked_add(1)
            .ok_or_else(|| counter_exhausted("task"))?;

        let undo = Undo::AddTask {
            user_id: user_id.to_string(),
            previous_task_id: self.current_task_id,
            created_list: !self.tasks_data.contains_key(user_id),
        };

        self.current_task_id = task_id;
        let task = Task::from_fields(task_id, fields);
        self.tasks_data
            .entry(user_id.to_string())
            .or_default()
            .push(task.clone());

        Ok((task, undo))
    }

    pub(crate) fn edit_task(
        &mut self,
        user_id: &str,
        task_id: u64,
        fields: TaskFields,
    ) -> SyncResult<(Task, Undo)> {
        let fields = validate_fields(fields)?;
        let (index, task) = self.find_task_mut(user_id, task_id)?;
        let previous = task.clone();
        task.apply(fields);
        let updated = task.clone();

        Ok((
            updated,
            Undo::EditTask {
                user_id: user_id.to_string(),
                index,
                previous,
            },
        ))
    }

    pub(crate) fn delete_task(&mut self, user_id: &str, task_id: u64) -> SyncResult<(Task, Undo)> {
        let (index, _) = self.find_task_mut(user_id, task_id)?;
        let tasks = self
            .tasks_data
            .get_mut(user_id)
            .ok_or_else(|| SyncError::UnknownUser(user_id.to_string()))?;
        let task = tasks.remove(index);

        Ok((
            task.clone(),
            Undo::DeleteTask {
                user_id: user_id.to_string(),
                index,
                task,
            },
        ))
    }

    /// Populate an empty tracker with the given users
    pub(crate) fn seed(&mut self, defaults: &[User]) -> SyncResult<Undo> {
        if !self.users.is_empty() {
            return Err(SyncError::InvalidInput(
                "defaults can only be seeded into an empty tracker".to_string(),
            ));
        }
        if defaults.is_empty() {
            return Err(SyncError::InvalidInput("no default users configured".to_string()));
        }

        let undo = Undo::Replace(Box::new(self.clone()));
        for user in defaults {
            self.users.insert(user.id.clone(), user.clone());
            self.tasks_data.entry(user.id.clone()).or_default();
        }
        self.next_user_id = self.next_user_id.max(defaults.len() as u64 + 1);
        self.selection = self.first_user_id();
        Ok(undo)
    }

    /// Merge an imported document: imported users and task lists win per
    /// key, counters take the maximum
    pub(crate) fn merge(&mut self, doc: RemoteDocument) -> SyncResult<(IntegrityReport, Undo)> {
        if doc.users.is_empty() && doc.tasks_data.is_empty() {
            return Err(SyncError::InvalidInput(
                "nothing to import: no users or task lists".to_string(),
            ));
        }

        let mut merged = self.clone();
        merged.users.extend(doc.users);
        merged.tasks_data.extend(doc.tasks_data);
        merged.next_user_id = merged.next_user_id.max(doc.next_user_id);
        merged.current_task_id = merged.current_task_id.max(doc.current_task_id);

        let mut seen = BTreeSet::new();
        let duplicates: BTreeSet<u64> = merged
            .all_tasks()
            .filter(|t| !seen.insert(t.id))
            .map(|t| t.id)
            .collect();
        if !duplicates.is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "imported tasks reuse existing task ids: {:?}",
                duplicates
            )));
        }

        let report = merged.validate();
        if merged.selection.is_none() {
            merged.selection = merged.first_user_id();
        }

        let previous = std::mem::replace(self, merged);
        Ok((report, Undo::Replace(Box::new(previous))))
    }

    /// Counter only advances once a free id is found
    fn allocate_user_id(&mut self) -> SyncResult<String> {
        let mut next = self.next_user_id;
        loop {
            let id = format!("person{}", next);
            next = next.checked_add(1).ok_or_else(|| counter_exhausted("user"))?;
            if !self.users.contains_key(&id) && !self.tasks_data.contains_key(&id) {
                self.next_user_id = next;
                return Ok(id);
            }
        }
    }

    fn find_task_mut(&mut self, user_id: &str, task_id: u64) -> SyncResult<(usize, &mut Task)> {
        if !self.users.contains_key(user_id) {
            return Err(SyncError::UnknownUser(user_id.to_string()));
        }
        self.tasks_data
            .get_mut(user_id)
            .and_then(|tasks| tasks.iter_mut().enumerate().find(|(_, t)| t.id == task_id))
            .ok_or_else(|| SyncError::UnknownTask {
                user_id: user_id.to_string(),
                task_id,
            })
    }
}

/// Minimal record needed to reverse one mutation
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    AddUser {
        user_id: String,
        previous_next_user_id: u64,
        previous_selection: Option<String>,
    },
    DeleteUser {
        user: User,
        tasks: Option<Vec<Task>>,
        previous_selection: Option<String>,
    },
    AddTask {
        user_id: String,
        previous_task_id: u64,
        created_list: bool,
    },
    EditTask {
        user_id: String,
        index: usize,
        previous: Task,
    },
    DeleteTask {
        user_id: String,
        index: usize,
        task: Task,
    },
    Replace(Box<TrackerState>),
}

impl Undo {
    /// Restore the state captured before the mutation
    pub(crate) fn revert(self, state: &mut TrackerState) {
        match self {
            Undo::AddUser {
                user_id,
                previous_next_user_id,
                previous_selection,
            } => {
                state.users.remove(&user_id);
                state.tasks_data.remove(&user_id);
                state.next_user_id = previous_next_user_id;
                state.selection = previous_selection;
            }
            Undo::DeleteUser {
                user,
                tasks,
                previous_selection,
            } => {
                if let Some(tasks) = tasks {
                    state.tasks_data.insert(user.id.clone(), tasks);
                }
                state.users.insert(user.id.clone(), user);
                state.selection = previous_selection;
            }
            Undo::AddTask {
                user_id,
                previous_task_id,
                created_list,
            } => {
                if created_list {
                    state.tasks_data.remove(&user_id);
                } else if let Some(tasks) = state.tasks_data.get_mut(&user_id) {
                    tasks.pop();
                }
                state.current_task_id = previous_task_id;
            }
            Undo::EditTask {
                user_id,
                index,
                previous,
            } => {
                if let Some(slot) = state
                    .tasks_data
                    .get_mut(&user_id)
                    .and_then(|tasks| tasks.get_mut(index))
                {
                    *slot = previous;
                }
            }
            Undo::DeleteTask {
                user_id,
                index,
                task,
            } => {
                let tasks = state.tasks_data.entry(user_id).or_default();
                let index = index.min(tasks.len());
                tasks.insert(index, task);
            }
            Undo::Replace(previous) => *state = *previous,
        }
    }
}

fn required(value: &str, what: &str) -> SyncResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn counter_exhausted(what: &str) -> SyncError {
    SyncError::InvalidInput(format!("{} id counter is exhausted", what))
}

fn validate_fields(mut fields: TaskFields) -> SyncResult<TaskFields> {
    fields.name = required(&fields.name, "task name")?;
    fields.update = fields.update.trim().to_string();
    Ok(fields)
}
