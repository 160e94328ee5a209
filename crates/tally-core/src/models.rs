//! Data models for Tally
//!
//! Defines the core data structures: User, Task and the enums that
//! describe a task's priority and progress. Field names on the wire follow
//! the shared remote document (`dateLogged`, `not-started`, ...).

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// A person whose tasks are tracked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Stable identifier (e.g. `person3`)
    pub id: String,
    /// Display name
    pub name: String,
}

impl User {
    /// Create a user with the given id and display name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown priority '{}'. Use low, medium or high.", s))
    }
}

/// Task progress
///
/// The order of `ALL` is the column order of a kanban board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Human-readable column title
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "Not Started",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '_'], "-");
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown status '{}'. Use not-started, in-progress or completed.",
                    s
                )
            })
    }
}

/// A tracked task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// System-wide unique id
    pub id: u64,
    pub name: String,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Optional due date
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub deadline: Option<NaiveDate>,
    /// Free-text progress update
    #[serde(default)]
    pub update: String,
    /// Day the task was logged
    pub date_logged: NaiveDate,
}

impl Task {
    /// Build a task from submitted fields, logged today
    pub fn from_fields(id: u64, fields: TaskFields) -> Self {
        Self {
            id,
            name: fields.name,
            priority: fields.priority,
            status: fields.status,
            deadline: fields.deadline,
            update: fields.update,
            date_logged: Local::now().date_naive(),
        }
    }

    /// Replace the editable fields, keeping the id
    ///
    /// An edit re-stamps `date_logged` with today, so boards show when the
    /// task was last updated.
    pub fn apply(&mut self, fields: TaskFields) {
        self.name = fields.name;
        self.priority = fields.priority;
        self.status = fields.status;
        self.deadline = fields.deadline;
        self.update = fields.update;
        self.date_logged = Local::now().date_naive();
    }

    /// Whether the deadline has passed and the task is not completed
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.deadline.is_some_and(|d| d < today)
    }
}

/// The editable fields of a task, as submitted by a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub name: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub deadline: Option<NaiveDate>,
    pub update: String,
}

impl TaskFields {
    /// Fields for a new task with medium priority, not started
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: Priority::Medium,
            status: TaskStatus::NotStarted,
            deadline: None,
            update: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<NaiveDate>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_update(mut self, update: impl Into<String>) -> Self {
        self.update = update.into();
        self
    }
}

impl From<&Task> for TaskFields {
    fn from(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            priority: task.priority,
            status: task.status,
            deadline: task.deadline,
            update: task.update.clone(),
        }
    }
}

/// Priority/status filter used by list and board views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.priority.is_none_or(|p| task.priority == p)
            && self.status.is_none_or(|s| task.status == s)
    }
}

/// Summary counts for one user's tasks
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

impl TaskStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            match task.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::NotStarted => stats.not_started += 1,
            }
            stats
        })
    }

    /// Completed share, rounded to the nearest whole percent
    pub fn completion_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Accept `null`, a missing field, or an empty string as "no date"
fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
