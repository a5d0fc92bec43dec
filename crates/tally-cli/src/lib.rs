//! Task and time tracker CLI library.
//!
//! This crate provides the CLI interface for the tally time tracker.

mod cli;
pub mod commands;
mod config;
pub mod exit;

pub use cli::{Cli, Commands, PeriodArgs, ProjectAction, ReportKind, SessionTarget, TaskAction};
pub use config::Config;
