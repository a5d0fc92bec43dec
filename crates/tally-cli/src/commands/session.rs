//! `tally start`, `pause`, `resume` and `stop`.
//!
//! Each command runs in its own `IMMEDIATE` transaction so the engine's
//! read-check-write cannot interleave with another `tally` process.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tally_core::{
    Clock, CoreError, SessionEngine, SessionId, SessionStore, TaskId, TaskState, TimeSession,
    Transition,
};
use tally_db::{Database, SessionTx};

use super::util::{format_duration, format_timestamp, short_id};

/// Opens a session for `task_id` and moves a `todo` task to `in_progress`.
pub fn start<W: Write, C: Clock>(
    writer: &mut W,
    db: &mut Database,
    engine: &SessionEngine<C>,
    task_id: TaskId,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    let mut tx = db.begin_session_tx().context("failed to begin transaction")?;
    let session = engine.start(&mut tx, task_id, at)?;
    let now = engine.clock().now();
    if tx
        .transition_task(task_id, TaskState::Todo, TaskState::InProgress, now)
        .context("failed to update task state")?
    {
        tracing::debug!(task_id = %task_id, "task moved to in_progress");
    }
    tx.commit().context("failed to commit session")?;

    writeln!(
        writer,
        "Started session {} on task #{task_id} at {}",
        short_id(session.id().as_str()),
        format_timestamp(session.started_at())
    )?;
    Ok(())
}

/// Pauses, resumes or stops the open session selected by `task`.
pub fn transition<W: Write, C: Clock>(
    writer: &mut W,
    db: &mut Database,
    engine: &SessionEngine<C>,
    transition: Transition,
    task: Option<TaskId>,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    let mut tx = db.begin_session_tx().context("failed to begin transaction")?;
    let session_id = resolve_open_session(&tx, task)?;
    let session = match transition {
        Transition::Pause => engine.pause(&mut tx, &session_id, at)?,
        Transition::Resume => engine.resume(&mut tx, &session_id, at)?,
        Transition::Stop => engine.stop(&mut tx, &session_id, at)?,
    };
    tx.commit().context("failed to commit session")?;

    write!(writer, "{}", format_transition(transition, &session))?;
    Ok(())
}

/// Finds the session a pause/resume/stop should act on.
///
/// With `--task`, that task's open session; otherwise the only open session.
fn resolve_open_session(tx: &SessionTx<'_>, task: Option<TaskId>) -> Result<SessionId> {
    if let Some(task_id) = task {
        let session = tx
            .load_open_session_for_task(task_id)
            .context("failed to load open session")?
            .ok_or_else(|| CoreError::NotFound {
                entity: "open session for task",
                id: task_id.to_string(),
            })?;
        return Ok(session.id().clone());
    }

    let open = tx
        .list_open_sessions()
        .context("failed to load open sessions")?;
    match open.as_slice() {
        [] => Err(CoreError::NotFound {
            entity: "open session",
            id: "any task".to_string(),
        }
        .into()),
        [session] => Ok(session.id().clone()),
        _ => {
            let tasks: Vec<String> = open.iter().map(|s| format!("#{}", s.task_id())).collect();
            anyhow::bail!(
                "{} sessions are open (tasks {}); pass --task to choose one",
                open.len(),
                tasks.join(", ")
            )
        }
    }
}

fn format_transition(transition: Transition, session: &TimeSession) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    let id = short_id(session.id().as_str());
    let task_id = session.task_id();
    match transition {
        Transition::Pause => writeln!(
            output,
            "Paused session {id} on task #{task_id} ({} tracked)",
            format_duration(session.duration_seconds())
        ),
        Transition::Resume => writeln!(output, "Resumed session {id} on task #{task_id}"),
        Transition::Stop => writeln!(
            output,
            "Stopped session {id} on task #{task_id}: {} tracked",
            format_duration(session.duration_seconds())
        ),
    }
    .unwrap();
    output
}
