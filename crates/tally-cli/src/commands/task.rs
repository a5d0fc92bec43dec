//! `tally task` subcommands.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{CoreError, NewTask, Project, Task, TaskId, TaskState, TaskUpdate, validate};
use tally_db::{Database, TaskFilter};

use super::util::{format_duration, format_estimate, format_timestamp, parse_estimate};

/// Raw `task add` arguments as given on the command line.
#[derive(Debug, Default)]
pub struct AddArgs<'a> {
    pub project: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub size: Option<u32>,
    pub estimate: Option<&'a str>,
    pub tags: &'a [String],
}

/// Raw `task edit` arguments as given on the command line.
#[derive(Debug, Default)]
pub struct EditArgs<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub size: Option<u32>,
    pub estimate: Option<&'a str>,
}

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    args: &AddArgs<'_>,
    now: DateTime<Utc>,
) -> Result<()> {
    let project = find_project(db, args.project)?;
    let new_task = NewTask {
        project_id: project.id,
        title: validate::task_title(args.title)?,
        description: validate::task_description(args.description)?,
        size: args.size.map(validate::size).transpose()?,
        estimate_minutes: args.estimate.map(parse_estimate).transpose()?,
        tags: validate::tags(args.tags)?,
    };

    let task = db
        .create_task(&new_task, now)
        .context("failed to create task")?;
    writeln!(
        writer,
        "Created task #{} in {}: {}",
        task.id, project.name, task.title
    )?;
    Ok(())
}

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    project: Option<&str>,
    state: Option<TaskState>,
    json: bool,
) -> Result<()> {
    let project_id = project
        .map(|name| find_project(db, name).map(|p| p.id))
        .transpose()?;
    let tasks = db
        .list_tasks(TaskFilter { project_id, state })
        .context("failed to list tasks")?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&tasks)?)?;
    } else {
        write!(writer, "{}", format_task_list(&tasks))?;
    }
    Ok(())
}

/// Task details plus tracked time, for `task show --json`.
#[derive(Debug, Serialize)]
struct TaskDetail<'a> {
    #[serde(flatten)]
    task: &'a Task,
    project: &'a str,
    tracked_seconds: i64,
    sessions: usize,
}

pub fn show<W: Write>(
    writer: &mut W,
    db: &Database,
    id: TaskId,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let task = get_task(db, id)?;
    let project = db
        .get_project(task.project_id)
        .context("failed to load project")?
        .map_or_else(|| task.project_id.to_string(), |p| p.name);
    let sessions = db
        .list_sessions(Some(id), None)
        .context("failed to load sessions")?;
    let detail = TaskDetail {
        task: &task,
        project: &project,
        tracked_seconds: sessions.iter().map(|s| s.current_duration(now)).sum(),
        sessions: sessions.len(),
    };

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&detail)?)?;
    } else {
        write!(writer, "{}", format_task_detail(&detail))?;
    }
    Ok(())
}

pub fn edit<W: Write>(
    writer: &mut W,
    db: &mut Database,
    id: TaskId,
    args: &EditArgs<'_>,
    now: DateTime<Utc>,
) -> Result<()> {
    let update = TaskUpdate {
        title: args.title.map(validate::task_title).transpose()?,
        description: args
            .description
            .map(|d| validate::task_description(Some(d)))
            .transpose()?,
        size: args.size.map(validate::size).transpose()?,
        estimate_minutes: args.estimate.map(parse_estimate).transpose()?,
    };
    if update.is_empty() {
        anyhow::bail!("nothing to change; pass --title, --description, --size or --estimate");
    }

    let task = db
        .update_task(id, &update, now)
        .context("failed to update task")?
        .ok_or_else(|| task_not_found(id))?;
    writeln!(writer, "Updated task #{}: {}", task.id, task.title)?;
    Ok(())
}

pub fn set_state<W: Write>(
    writer: &mut W,
    db: &mut Database,
    id: TaskId,
    state: TaskState,
    now: DateTime<Utc>,
) -> Result<()> {
    let task = db
        .set_task_state(id, state, now)
        .context("failed to update task state")?
        .ok_or_else(|| task_not_found(id))?;
    writeln!(writer, "Task #{} is now {}", task.id, task.state)?;
    Ok(())
}

pub fn tag<W: Write>(writer: &mut W, db: &mut Database, id: TaskId, tag: &str) -> Result<()> {
    let tag = validate::tag(tag)?;
    if !db.add_task_tag(id, &tag).context("failed to add tag")? {
        return Err(task_not_found(id).into());
    }
    writeln!(writer, "Tagged task #{id} with {tag}")?;
    Ok(())
}

pub fn untag<W: Write>(writer: &mut W, db: &mut Database, id: TaskId, tag: &str) -> Result<()> {
    let tag = validate::tag(tag)?;
    get_task(db, id)?;
    if db.remove_task_tag(id, &tag).context("failed to remove tag")? {
        writeln!(writer, "Removed tag {tag} from task #{id}")?;
    } else {
        writeln!(writer, "Task #{id} was not tagged {tag}")?;
    }
    Ok(())
}

fn find_project(db: &Database, name: &str) -> Result<Project> {
    db.find_project_by_name(name.trim())
        .context("failed to look up project")?
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "project",
                id: name.to_string(),
            }
            .into()
        })
}

fn get_task(db: &Database, id: TaskId) -> Result<Task> {
    db.get_task(id)
        .context("failed to load task")?
        .ok_or_else(|| task_not_found(id).into())
}

fn task_not_found(id: TaskId) -> CoreError {
    CoreError::NotFound {
        entity: "task",
        id: id.to_string(),
    }
}

// ========== Rendering ==========

fn format_task_list(tasks: &[Task]) -> String {
    let mut output = String::new();
    if tasks.is_empty() {
        writeln!(output, "No tasks found.").unwrap();
        return output;
    }

    writeln!(output, "{:<6} {:<12} {:>4} {:>6}  TITLE", "ID", "STATE", "SIZE", "EST").unwrap();
    for task in tasks {
        let size = task.size.map_or_else(|| "-".to_string(), |s| s.to_string());
        let estimate = task
            .estimate_minutes
            .map_or_else(|| "-".to_string(), format_estimate);
        let id = format!("#{}", task.id);
        write!(
            output,
            "{id:<6} {:<12} {size:>4} {estimate:>6}  {}",
            task.state, task.title
        )
        .unwrap();
        if !task.tags.is_empty() {
            write!(output, "  [{}]", task.tags.join(", ")).unwrap();
        }
        writeln!(output).unwrap();
    }
    output
}

fn format_task_detail(detail: &TaskDetail<'_>) -> String {
    let task = detail.task;
    let mut output = String::new();
    writeln!(output, "#{} {}", task.id, task.title).unwrap();
    writeln!(output, "Project:   {}", detail.project).unwrap();
    writeln!(output, "State:     {}", task.state).unwrap();
    if let Some(size) = task.size {
        writeln!(output, "Size:      {size}").unwrap();
    }
    if let Some(estimate) = task.estimate_minutes {
        writeln!(output, "Estimate:  {}", format_estimate(estimate)).unwrap();
    }
    if !task.tags.is_empty() {
        writeln!(output, "Tags:      {}", task.tags.join(", ")).unwrap();
    }
    writeln!(
        output,
        "Tracked:   {} over {} session(s)",
        format_duration(detail.tracked_seconds),
        detail.sessions
    )
    .unwrap();
    writeln!(output, "Created:   {}", format_timestamp(task.created_at)).unwrap();
    if let Some(completed_at) = task.completed_at {
        writeln!(output, "Completed: {}", format_timestamp(completed_at)).unwrap();
    }
    if let Some(description) = &task.description {
        writeln!(output).unwrap();
        writeln!(output, "{description}").unwrap();
    }
    output
}
