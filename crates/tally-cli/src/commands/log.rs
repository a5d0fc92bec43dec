//! Log command listing recorded sessions, newest first.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{TaskId, TimeSession};
use tally_db::{Database, TaskFilter};

use super::util::{format_duration, format_timestamp, short_id};

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    #[serde(flatten)]
    session: &'a TimeSession,
    state: &'static str,
    task_title: Option<&'a str>,
    current_duration_seconds: i64,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    task: Option<TaskId>,
    limit: usize,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let sessions = db
        .list_sessions(task, Some(limit))
        .context("failed to load sessions")?;
    let titles: HashMap<TaskId, String> = db
        .list_tasks(TaskFilter::default())
        .context("failed to load tasks")?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect();

    let entries: Vec<LogEntry<'_>> = sessions
        .iter()
        .map(|session| LogEntry {
            session,
            state: session.state().name(),
            task_title: titles.get(&session.task_id()).map(String::as_str),
            current_duration_seconds: session.current_duration(now),
        })
        .collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else {
        write!(writer, "{}", format_log(&entries))?;
    }
    Ok(())
}

fn format_log(entries: &[LogEntry<'_>]) -> String {
    let mut output = String::new();
    if entries.is_empty() {
        writeln!(output, "No sessions recorded.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<20}  {:<7}  {:>8}  TASK",
        "SESSION", "STARTED", "STATE", "TRACKED"
    )
    .unwrap();
    for entry in entries {
        let session = entry.session;
        let task = format!(
            "#{} {}",
            session.task_id(),
            entry.task_title.unwrap_or("(unknown task)")
        );
        writeln!(
            output,
            "{:<8}  {:<20}  {:<7}  {:>8}  {task}",
            short_id(session.id().as_str()),
            format_timestamp(session.started_at()),
            entry.state,
            format_duration(entry.current_duration_seconds),
        )
        .unwrap();
    }
    output
}
