//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tally_core::{TaskId, TaskState};

/// Task and time tracker.
///
/// Organizes work into projects and tasks, and records time against tasks
/// with start, pause, resume and stop.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectAction),

    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskAction),

    /// Start a time session for a task.
    Start {
        /// Task ID (e.g., 3 or #3).
        task: TaskId,

        /// When the session started (ISO 8601 or relative, e.g., '15 minutes ago').
        #[arg(long)]
        at: Option<String>,
    },

    /// Pause the open session.
    Pause(SessionTarget),

    /// Resume a paused session.
    Resume(SessionTarget),

    /// Stop the open session.
    Stop(SessionTarget),

    /// Show open sessions and their running time.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List recorded sessions, newest first.
    Log {
        /// Only sessions for this task.
        #[arg(long)]
        task: Option<TaskId>,

        /// Maximum number of sessions to show.
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate reports.
    #[command(subcommand)]
    Report(ReportKind),
}

/// Selects which open session a pause/resume/stop applies to.
#[derive(Debug, Args)]
pub struct SessionTarget {
    /// Task whose open session to act on (required when several are open).
    #[arg(long)]
    pub task: Option<TaskId>,

    /// When the transition happened (ISO 8601 or relative, e.g., '5 minutes ago').
    #[arg(long)]
    pub at: Option<String>,
}

/// Project subcommands.
#[derive(Debug, Subcommand)]
pub enum ProjectAction {
    /// Create a project.
    Add {
        /// Unique project name.
        name: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// List projects.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Task subcommands.
#[derive(Debug, Subcommand)]
pub enum TaskAction {
    /// Create a task in a project.
    Add {
        /// Project name.
        project: String,

        /// Task title.
        title: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,

        /// Relative size in story points.
        #[arg(long)]
        size: Option<u32>,

        /// Time estimate (e.g., 90m, 2h, 1h30m).
        #[arg(long)]
        estimate: Option<String>,

        /// Tag to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List tasks.
    List {
        /// Only tasks in this project.
        #[arg(long)]
        project: Option<String>,

        /// Only tasks in this state.
        #[arg(long)]
        state: Option<TaskState>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a task with its tracked time.
    Show {
        task: TaskId,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Change a task's title, description, size or estimate.
    Edit {
        task: TaskId,

        #[arg(long)]
        title: Option<String>,

        /// New description; pass an empty string to clear it.
        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        size: Option<u32>,

        /// Time estimate (e.g., 90m, 2h, 1h30m).
        #[arg(long)]
        estimate: Option<String>,
    },

    /// Move a task to another state (todo, in_progress, done, cancelled).
    State { task: TaskId, state: TaskState },

    /// Attach a tag to a task.
    Tag { task: TaskId, tag: String },

    /// Remove a tag from a task.
    Untag { task: TaskId, tag: String },
}

/// Report types.
#[derive(Debug, Subcommand)]
pub enum ReportKind {
    /// Time spent per project and task.
    Spent {
        #[command(flatten)]
        period: PeriodArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Story points completed per week.
    Velocity {
        /// Number of weeks to include, ending with the current one.
        #[arg(long, default_value = "4")]
        weeks: u32,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Estimated against tracked time for done tasks.
    Estimates {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Period selection for time reports.
#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct PeriodArgs {
    /// Report on the current week (default).
    #[arg(long)]
    pub week: bool,

    /// Report on the previous week.
    #[arg(long)]
    pub last_week: bool,

    /// Report on today.
    #[arg(long)]
    pub day: bool,

    /// Report on yesterday.
    #[arg(long)]
    pub last_day: bool,
}
