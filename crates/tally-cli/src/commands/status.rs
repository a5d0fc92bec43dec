//! Status command for showing open sessions and their running time.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{Clock, SessionEngine, SessionState, TaskId, TimeSession};
use tally_db::{Database, TaskFilter};

use super::util::{format_duration, format_timestamp, short_id};
use crate::Config;

/// An open session as shown by `status --json`.
#[derive(Debug, Serialize)]
pub struct OpenSession<'a> {
    #[serde(flatten)]
    pub session: &'a TimeSession,
    pub state: &'static str,
    pub task_title: Option<&'a str>,
    pub current_duration_seconds: i64,
}

pub fn run<W: Write, C: Clock>(
    writer: &mut W,
    db: &Database,
    engine: &SessionEngine<C>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let sessions = db
        .list_open_sessions()
        .context("failed to load open sessions")?;
    let titles: HashMap<TaskId, String> = db
        .list_tasks(TaskFilter::default())
        .context("failed to load tasks")?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect();

    let open: Vec<OpenSession<'_>> = sessions
        .iter()
        .map(|session| OpenSession {
            session,
            state: session.state().name(),
            task_title: titles.get(&session.task_id()).map(String::as_str),
            current_duration_seconds: engine.current_duration(session),
        })
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&open)?)?;
    } else {
        write!(writer, "{}", format_status(&open, config))?;
    }
    Ok(())
}

fn format_status(open: &[OpenSession<'_>], config: &Config) -> String {
    let mut output = String::new();
    writeln!(output, "Database: {}", config.database_path.display()).unwrap();

    if open.is_empty() {
        writeln!(output, "No open session.").unwrap();
        writeln!(output, "Hint: Run 'tally start <task-id>' to begin tracking.").unwrap();
        return output;
    }

    for entry in open {
        let session = entry.session;
        let since = match session.state() {
            SessionState::Active { since } | SessionState::Paused { since } => since,
            SessionState::Stopped { .. } => session.started_at(),
        };
        writeln!(
            output,
            "{}  #{} {}",
            short_id(session.id().as_str()),
            session.task_id(),
            entry.task_title.unwrap_or("(unknown task)")
        )
        .unwrap();
        writeln!(
            output,
            "  {} since {}, {} tracked",
            entry.state,
            format_timestamp(since),
            format_duration(entry.current_duration_seconds)
        )
        .unwrap();
    }
    output
}
