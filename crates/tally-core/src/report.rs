//! Report aggregation over already-loaded rows.
//!
//! Nothing here touches storage or session state transitions; callers load
//! projects, tasks and sessions, pick the time windows, and hand them in.
//! Open sessions are counted with their live duration as of `now`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::TimeSession;
use crate::task::{Project, Task, TaskState};
use crate::types::{ProjectId, TaskId};

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

// ========== Time Spent ==========

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTime {
    pub task_id: TaskId,
    pub title: String,
    pub project_id: ProjectId,
    pub seconds: i64,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTime {
    pub project_id: ProjectId,
    pub name: String,
    pub seconds: i64,
    pub tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpentReport {
    pub window: Window,
    pub total_seconds: i64,
    pub projects: Vec<ProjectTime>,
    pub tasks: Vec<TaskTime>,
}

/// Sums tracked time per task and project for sessions started in `window`.
pub fn time_spent(
    sessions: &[TimeSession],
    tasks: &[Task],
    projects: &[Project],
    window: Window,
    now: DateTime<Utc>,
) -> SpentReport {
    let task_index: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let mut per_task: HashMap<TaskId, TaskTime> = HashMap::new();

    for session in sessions.iter().filter(|s| window.contains(s.started_at())) {
        let Some(task) = task_index.get(&session.task_id()) else {
            tracing::warn!(
                session_id = %session.id(),
                task_id = %session.task_id(),
                "skipping session for unknown task"
            );
            continue;
        };
        let entry = per_task.entry(task.id).or_insert_with(|| TaskTime {
            task_id: task.id,
            title: task.title.clone(),
            project_id: task.project_id,
            seconds: 0,
            sessions: 0,
        });
        entry.seconds += session.current_duration(now);
        entry.sessions += 1;
    }

    let mut per_project: HashMap<ProjectId, ProjectTime> = HashMap::new();
    for task_time in per_task.values() {
        let entry = per_project
            .entry(task_time.project_id)
            .or_insert_with(|| ProjectTime {
                project_id: task_time.project_id,
                name: projects
                    .iter()
                    .find(|p| p.id == task_time.project_id)
                    .map_or_else(|| format!("project {}", task_time.project_id), |p| p.name.clone()),
                seconds: 0,
                tasks: 0,
            });
        entry.seconds += task_time.seconds;
        entry.tasks += 1;
    }

    let mut tasks: Vec<TaskTime> = per_task.into_values().collect();
    tasks.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.task_id.cmp(&b.task_id)));
    let mut projects: Vec<ProjectTime> = per_project.into_values().collect();
    projects.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.name.cmp(&b.name)));

    SpentReport {
        window,
        total_seconds: tasks.iter().map(|t| t.seconds).sum(),
        projects,
        tasks,
    }
}

// ========== Velocity ==========

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowVelocity {
    pub window: Window,
    pub points: u32,
    pub tasks_completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityReport {
    pub windows: Vec<WindowVelocity>,
    pub average_points: f64,
    pub min_points: u32,
    pub max_points: u32,
    /// Done tasks in range that carry no size and so add no points.
    pub unsized_tasks: usize,
}

/// Story points completed per window.
///
/// A task counts in the window containing its `completed_at`. Only tasks
/// currently in [`TaskState::Done`] count.
#[allow(clippy::cast_precision_loss)]
pub fn velocity(tasks: &[Task], windows: &[Window]) -> VelocityReport {
    let mut unsized_tasks = 0;
    let per_window: Vec<WindowVelocity> = windows
        .iter()
        .map(|window| {
            let done: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.state == TaskState::Done)
                .filter(|t| t.completed_at.is_some_and(|at| window.contains(at)))
                .collect();
            unsized_tasks += done.iter().filter(|t| t.size.is_none()).count();
            WindowVelocity {
                window: *window,
                points: done.iter().filter_map(|t| t.size).sum(),
                tasks_completed: done.len(),
            }
        })
        .collect();

    let total: u32 = per_window.iter().map(|w| w.points).sum();
    let average_points = if per_window.is_empty() {
        0.0
    } else {
        f64::from(total) / per_window.len() as f64
    };

    VelocityReport {
        average_points,
        min_points: per_window.iter().map(|w| w.points).min().unwrap_or(0),
        max_points: per_window.iter().map(|w| w.points).max().unwrap_or(0),
        windows: per_window,
        unsized_tasks,
    }
}

// ========== Estimation Accuracy ==========

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateRow {
    pub task_id: TaskId,
    pub title: String,
    pub estimate_seconds: i64,
    pub actual_seconds: i64,
    /// `(actual - estimate) / estimate * 100`; positive means an overrun.
    pub difference_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub rows: Vec<EstimateRow>,
    pub average_bias_pct: Option<f64>,
    pub min_difference_pct: Option<f64>,
    pub max_difference_pct: Option<f64>,
    pub overruns: usize,
    pub underruns: usize,
    pub on_target: usize,
}

/// Percentage difference of `actual` against `estimate`.
#[allow(clippy::cast_precision_loss)]
pub fn percentage_difference(estimate: i64, actual: i64) -> Option<f64> {
    if estimate <= 0 {
        return None;
    }
    Some((actual - estimate) as f64 / estimate as f64 * 100.0)
}

/// Compares estimated and tracked time for done tasks.
///
/// Tasks without an estimate or without any tracked time are left out.
#[allow(clippy::cast_precision_loss)]
pub fn estimation_accuracy(
    tasks: &[Task],
    sessions: &[TimeSession],
    now: DateTime<Utc>,
) -> AccuracyReport {
    let mut actual: HashMap<TaskId, i64> = HashMap::new();
    for session in sessions {
        *actual.entry(session.task_id()).or_default() += session.current_duration(now);
    }

    let mut rows: Vec<EstimateRow> = tasks
        .iter()
        .filter(|t| t.state == TaskState::Done)
        .filter_map(|task| {
            let estimate_seconds = i64::from(task.estimate_minutes?) * 60;
            let actual_seconds = actual.get(&task.id).copied().filter(|s| *s > 0)?;
            Some(EstimateRow {
                task_id: task.id,
                title: task.title.clone(),
                estimate_seconds,
                actual_seconds,
                difference_pct: percentage_difference(estimate_seconds, actual_seconds)?,
            })
        })
        .collect();
    rows.sort_by_key(|r| r.task_id);

    let diffs: Vec<f64> = rows.iter().map(|r| r.difference_pct).collect();
    let average_bias_pct =
        (!diffs.is_empty()).then(|| diffs.iter().sum::<f64>() / diffs.len() as f64);

    AccuracyReport {
        average_bias_pct,
        min_difference_pct: diffs.iter().copied().reduce(f64::min),
        max_difference_pct: diffs.iter().copied().reduce(f64::max),
        overruns: rows.iter().filter(|r| r.actual_seconds > r.estimate_seconds).count(),
        underruns: rows.iter().filter(|r| r.actual_seconds < r.estimate_seconds).count(),
        on_target: rows.iter().filter(|r| r.actual_seconds == r.estimate_seconds).count(),
        rows,
    }
}
