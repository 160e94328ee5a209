//! Tally CLI
//!
//! Command-line interface for Tally - a shared accountability tracker.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_core::{Config, Priority, SyncCoordinator, SyncError, TaskFilter, TaskStatus};

mod commands;
mod editor;
mod output;

use commands::task::TaskEdits;
use editor::TerminalPrompt;
use output::{ConsoleNotifier, Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - Shared accountability tracker")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default users in an empty tracker
    Init,
    /// Show status (sync mode, token, counts)
    Status,
    /// Pull the latest shared document
    Sync,
    /// Write the current state to the shared document
    Push,
    /// Keep pulling in the background until quit
    Watch,
    /// Print the share link for the shared document
    Share {
        /// Open the link in a browser
        #[arg(long)]
        open: bool,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show tasks as status columns
    Board {
        #[command(flatten)]
        target: UserArg,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List tasks due on a date (default today)
    Due {
        /// Date (YYYY-MM-DD)
        date: Option<NaiveDate>,
        #[command(flatten)]
        target: UserArg,
    },
    /// Show completion statistics
    Stats {
        #[command(flatten)]
        target: UserArg,
    },
    /// Export all data as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge data from an exported JSON file
    Import {
        /// File to import
        path: PathBuf,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// Display name
        name: String,
    },
    /// List users
    #[command(alias = "ls")]
    List,
    /// Delete a user and their tasks
    #[command(alias = "rm")]
    Delete {
        /// User id or name
        user: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task
    Add {
        /// Task name
        name: String,
        #[command(flatten)]
        target: UserArg,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// List tasks
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        target: UserArg,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show task details
    Show {
        /// Task ID
        id: u64,
        #[command(flatten)]
        target: UserArg,
    },
    /// Edit a task
    Edit {
        /// Task ID
        id: u64,
        /// New name
        #[arg(short, long)]
        name: Option<String>,
        /// Remove the deadline
        #[arg(long, conflicts_with = "deadline")]
        clear_deadline: bool,
        #[command(flatten)]
        target: UserArg,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task ID
        id: u64,
        #[command(flatten)]
        target: UserArg,
    },
}

#[derive(Args)]
struct UserArg {
    /// User id or name (default: first user)
    #[arg(short, long)]
    user: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Only tasks with this priority (low, medium, high)
    #[arg(short, long)]
    priority: Option<Priority>,
    /// Only tasks with this status (not-started, in-progress, completed)
    #[arg(short, long)]
    status: Option<TaskStatus>,
}

impl From<FilterArgs> for TaskFilter {
    fn from(args: FilterArgs) -> Self {
        TaskFilter {
            priority: args.priority,
            status: args.status,
        }
    }
}

#[derive(Args)]
struct FieldArgs {
    /// Priority (low, medium, high)
    #[arg(short, long)]
    priority: Option<Priority>,
    /// Status (not-started, in-progress, completed)
    #[arg(short, long)]
    status: Option<TaskStatus>,
    /// Deadline (YYYY-MM-DD)
    #[arg(short, long)]
    deadline: Option<NaiveDate>,
    /// Progress update text
    #[arg(long)]
    update: Option<String>,
}

impl FieldArgs {
    fn into_edits(self, name: Option<String>, clear_deadline: bool) -> TaskEdits {
        TaskEdits {
            name,
            priority: self.priority,
            status: self.status,
            deadline: self.deadline,
            clear_deadline,
            update: self.update,
        }
    }
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (document_id, token, sync_interval_minutes, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, &output).await {
        eprintln!("Error: {:#}", e);
        if let Some(hint) = e
            .downcast_ref::<SyncError>()
            .and_then(SyncError::recovery_suggestion)
        {
            eprintln!("  {}", hint);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    // Config commands don't need the tracker
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), output);
    }

    let config =
        Config::load_with_cli_override(cli.config.as_ref()).context("Failed to load configuration")?;
    init_logging(&config);

    let coordinator = Arc::new(
        SyncCoordinator::from_config(
            &config,
            Arc::new(TerminalPrompt),
            Arc::new(ConsoleNotifier::new(output.format)),
        )
        .context("Failed to set up sync")?,
    );

    // Every command starts from the latest persisted state
    coordinator
        .load()
        .await
        .context("Failed to load tracker data")?;

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Init => commands::data::init(&coordinator, output).await,
        Commands::Status => commands::status::show(&coordinator, &config, output),
        Commands::Sync => commands::sync::pull(&coordinator, output).await,
        Commands::Push => commands::sync::push(&coordinator, output).await,
        Commands::Watch => {
            commands::sync::watch(coordinator.clone(), config.sync_interval(), output).await
        }
        Commands::Share { open } => commands::status::share(&coordinator, open, output),
        Commands::User { command } => handle_user_command(command, &coordinator, output).await,
        Commands::Task { command } => handle_task_command(command, &coordinator, output).await,
        Commands::Board { target, filter } => {
            commands::task::board(&coordinator, target.user, filter.into(), output)
        }
        Commands::Due { date, target } => {
            commands::task::due(&coordinator, target.user, date, output)
        }
        Commands::Stats { target } => commands::task::stats(&coordinator, target.user, output),
        Commands::Export { output: path } => commands::data::export(&coordinator, path, output),
        Commands::Import { path } => commands::data::import(&coordinator, path, output).await,
    }
}

async fn handle_user_command(
    command: UserCommands,
    coordinator: &SyncCoordinator,
    output: &Output,
) -> Result<()> {
    match command {
        UserCommands::Add { name } => commands::user::add(coordinator, name, output).await,
        UserCommands::List => commands::user::list(coordinator, output),
        UserCommands::Delete { user } => commands::user::delete(coordinator, user, output).await,
    }
}

async fn handle_task_command(
    command: TaskCommands,
    coordinator: &SyncCoordinator,
    output: &Output,
) -> Result<()> {
    match command {
        TaskCommands::Add {
            name,
            target,
            fields,
        } => {
            let edits = fields.into_edits(None, false);
            commands::task::add(coordinator, target.user, name, edits, output).await
        }
        TaskCommands::List { target, filter } => {
            commands::task::list(coordinator, target.user, filter.into(), output)
        }
        TaskCommands::Show { id, target } => {
            commands::task::show(coordinator, target.user, id, output)
        }
        TaskCommands::Edit {
            id,
            name,
            clear_deadline,
            target,
            fields,
        } => {
            let edits = fields.into_edits(name, clear_deadline);
            commands::task::edit(coordinator, target.user, id, edits, output).await
        }
        TaskCommands::Delete { id, target } => {
            commands::task::delete(coordinator, target.user, id, output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize file logging
///
/// Only initializes if TALLY_LOG environment variable is set.
/// Logs to file (config.log_file or default {data_dir}/debug.log).
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("TALLY_LOG") else {
        return;
    };

    let log_path = config
        .log_file
        .clone()
        .unwrap_or_else(|| config.data_dir.join("debug.log"));

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "tally_core={},tally_cli={}",
        log_level, log_level
    ));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
