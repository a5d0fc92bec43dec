//! CLI subcommand implementations.

pub mod log;
pub mod project;
pub mod report;
pub mod session;
pub mod status;
pub mod task;
pub mod util;
