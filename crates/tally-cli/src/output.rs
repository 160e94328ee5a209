//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use tally_core::{Notifier, Severity, Task, TaskStats, TaskStatus, User};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// A user row with task counts
#[derive(Debug, Serialize)]
pub struct UserSummary<'a> {
    #[serde(flatten)]
    pub user: &'a User,
    pub selected: bool,
    pub stats: TaskStats,
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single task
    pub fn print_task(&self, task: &Task) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", task.id);
                println!("Name:      {}", task.name);
                println!("Priority:  {}", task.priority);
                println!("Status:    {}", task.status.label());
                println!("Deadline:  {}", format_deadline(task));
                if !task.update.is_empty() {
                    println!("Update:    {}", task.update);
                }
                println!("Updated:   {}", task.date_logged.format("%Y-%m-%d"));
            }
            OutputFormat::Json => print_json(task),
            OutputFormat::Quiet => println!("{}", task.id),
        }
    }

    /// Print a list of tasks
    pub fn print_tasks(&self, tasks: &[&Task]) {
        match self.format {
            OutputFormat::Human => {
                if tasks.is_empty() {
                    println!("No tasks found.");
                    return;
                }
                for task in tasks {
                    println!(
                        "{:>4} | {:<6} | {:<11} | {:<10} | {}",
                        task.id,
                        task.priority,
                        task.status.label(),
                        format_deadline(task),
                        truncate(&task.name, 40)
                    );
                }
                println!("\n{} task(s)", tasks.len());
            }
            OutputFormat::Json => print_json(&tasks),
            OutputFormat::Quiet => {
                for task in tasks {
                    println!("{}", task.id);
                }
            }
        }
    }

    /// Print users with their task counts
    pub fn print_users(&self, users: &[UserSummary<'_>]) {
        match self.format {
            OutputFormat::Human => {
                if users.is_empty() {
                    println!("No users. Run `tally init` to add the default users.");
                    return;
                }
                for summary in users {
                    println!(
                        "{} {:<10} | {:<20} | {} task(s), {}% done",
                        if summary.selected { "*" } else { " " },
                        summary.user.id,
                        truncate(&summary.user.name, 20),
                        summary.stats.total,
                        summary.stats.completion_percent()
                    );
                }
                println!("\n{} user(s)", users.len());
            }
            OutputFormat::Json => print_json(&users),
            OutputFormat::Quiet => {
                for summary in users {
                    println!("{}", summary.user.id);
                }
            }
        }
    }

    /// Print tasks grouped into status columns
    pub fn print_board(&self, board: &BTreeMap<TaskStatus, Vec<&Task>>) {
        match self.format {
            OutputFormat::Human => {
                for (status, tasks) in board {
                    println!("── {} ({}) ──", status.label(), tasks.len());
                    for task in tasks {
                        println!(
                            "  #{} [{}] {}",
                            task.id,
                            task.priority,
                            truncate(&task.name, 50)
                        );
                    }
                    println!();
                }
            }
            OutputFormat::Json => {
                let columns: BTreeMap<&str, &Vec<&Task>> =
                    board.iter().map(|(s, t)| (s.as_str(), t)).collect();
                print_json(&columns);
            }
            OutputFormat::Quiet => {
                for (status, tasks) in board {
                    println!("{} {}", status, tasks.len());
                }
            }
        }
    }

    /// Print completion statistics
    pub fn print_stats(&self, user: &User, stats: &TaskStats) {
        match self.format {
            OutputFormat::Human => {
                println!("{} ({})", user.name, user.id);
                println!("  Total:        {}", stats.total);
                println!("  Completed:    {}", stats.completed);
                println!("  In progress:  {}", stats.in_progress);
                println!("  Not started:  {}", stats.not_started);
                println!("  Completion:   {}%", stats.completion_percent());
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "user": user,
                "stats": stats,
                "percentage": stats.completion_percent(),
            })),
            OutputFormat::Quiet => println!("{}", stats.completion_percent()),
        }
    }

    /// Print any serializable value as JSON, or a message otherwise
    pub fn print_value<T: Serialize>(&self, value: &T, human: &str) {
        match self.format {
            OutputFormat::Json => print_json(value),
            OutputFormat::Human | OutputFormat::Quiet => println!("{}", human),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Notifications from the core, written to stderr
pub struct ConsoleNotifier {
    quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            quiet: format == OutputFormat::Quiet,
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => eprintln!("✗ {}", message),
            _ if self.quiet => {}
            Severity::Warning => eprintln!("⚠ {}", message),
            Severity::Success => eprintln!("✓ {}", message),
            Severity::Info => eprintln!("{}", message),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// Deadline with an overdue marker
fn format_deadline(task: &Task) -> String {
    format_deadline_on(task, Local::now().date_naive())
}

fn format_deadline_on(task: &Task, today: NaiveDate) -> String {
    match task.deadline {
        Some(deadline) if task.is_overdue(today) => format!("{}!", deadline),
        Some(deadline) => deadline.to_string(),
        None => "-".to_string(),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Priority, TaskFields};

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_deadline_marks_overdue() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut task = Task::from_fields(
            1,
            TaskFields::new("late")
                .with_priority(Priority::High)
                .with_deadline(NaiveDate::from_ymd_opt(2024, 5, 1)),
        );
        assert_eq!(format_deadline_on(&task, today), "2024-05-01!");

        task.status = TaskStatus::Completed;
        assert_eq!(format_deadline_on(&task, today), "2024-05-01");

        task.deadline = None;
        assert_eq!(format_deadline_on(&task, today), "-");
    }
}
