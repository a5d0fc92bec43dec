//! Report command for generating time, velocity and estimation reports.
//!
//! This module implements `tally report spent` with period options
//! (--week, --last-week, --day, --last-day), `tally report velocity` over
//! the last N weeks, and `tally report estimates`, each in human-readable
//! or JSON form.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;
use tally_core::ValidationError;
use tally_core::report::{self, AccuracyReport, SpentReport, VelocityReport, Window};
use tally_db::{Database, TaskFilter};

use super::util::format_duration;

/// Report period type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    LastWeek,
    Day,
    LastDay,
}

/// Period type for JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Week,
    Day,
}

impl Period {
    const fn period_type(self) -> PeriodType {
        match self {
            Self::Week | Self::LastWeek => PeriodType::Week,
            Self::Day | Self::LastDay => PeriodType::Day,
        }
    }
}

/// Longest velocity history accepted by `--weeks`.
pub const MAX_VELOCITY_WEEKS: u32 = 52;

// ========== Period Date Calculation ==========

/// Converts a local date at midnight to UTC.
/// Handles DST ambiguity by picking the earlier time.
fn local_midnight_to_utc(local_date: NaiveDate) -> DateTime<Utc> {
    let midnight = local_date.and_time(NaiveTime::default());
    match Local.from_local_datetime(&midnight) {
        // Single or ambiguous (DST fall-back): use the earlier time
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // DST spring-forward gap at midnight: 1am local exists
            let one_am = midnight + Duration::hours(1);
            Local.from_local_datetime(&one_am).earliest().map_or_else(
                || Utc.from_utc_datetime(&one_am),
                |dt| dt.with_timezone(&Utc),
            )
        }
    }
}

fn monday_of(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// Half-open window from local midnight of `start` to local midnight of `end`.
fn local_window(start: NaiveDate, end: NaiveDate) -> Window {
    Window {
        start: local_midnight_to_utc(start),
        end: local_midnight_to_utc(end),
    }
}

/// Get the window for a given period, using the provided date as reference.
///
/// Weeks run Monday 00:00 to the next Monday 00:00 local time.
pub fn period_window(period: Period, today: NaiveDate) -> Window {
    let monday = monday_of(today);
    match period {
        Period::Week => local_window(monday, monday + Duration::days(7)),
        Period::LastWeek => local_window(monday - Duration::days(7), monday),
        Period::Day => local_window(today, today + Duration::days(1)),
        Period::LastDay => local_window(today - Duration::days(1), today),
    }
}

/// Weekly windows ending with the week containing `today`, oldest first.
pub fn velocity_windows(weeks: u32, today: NaiveDate) -> Vec<Window> {
    let this_monday = monday_of(today);
    (0..i64::from(weeks))
        .rev()
        .map(|back| {
            let monday = this_monday - Duration::days(7 * back);
            local_window(monday, monday + Duration::days(7))
        })
        .collect()
}

/// Formats the period description for the report header.
fn period_label(window: Window, period_type: PeriodType) -> String {
    let start_date = window.start.with_timezone(&Local).date_naive();
    match period_type {
        // "Week of Jan 27, 2025"
        PeriodType::Week => format!("Week of {}", start_date.format("%b %-d, %Y")),
        // "Wednesday, Jan 29, 2025"
        PeriodType::Day => format!("{}", start_date.format("%A, %b %-d, %Y")),
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 || value <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 {
        1
    } else {
        (ratio * 10.0).round().min(10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

// ========== Commands ==========

pub fn spent<W: Write>(
    writer: &mut W,
    db: &Database,
    period: Period,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let today = now.with_timezone(&Local).date_naive();
    let window = period_window(period, today);

    let sessions = db
        .list_sessions(None, None)
        .context("failed to load sessions")?;
    let tasks = db
        .list_tasks(TaskFilter::default())
        .context("failed to load tasks")?;
    let projects = db.list_projects().context("failed to load projects")?;
    let data = report::time_spent(&sessions, &tasks, &projects, window, now);
    tracing::debug!(
        start = %window.start,
        end = %window.end,
        sessions = sessions.len(),
        total_seconds = data.total_seconds,
        "computed time spent"
    );

    if json {
        let output = JsonReport {
            generated_at: now.to_rfc3339(),
            timezone: local_timezone(),
            period: Some(json_period(window, period.period_type())),
            report: &data,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        let label = period_label(window, period.period_type());
        write!(writer, "{}", format_spent(&data, &label, period.period_type()))?;
    }
    Ok(())
}

pub fn velocity<W: Write>(
    writer: &mut W,
    db: &Database,
    weeks: u32,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if !(1..=MAX_VELOCITY_WEEKS).contains(&weeks) {
        return Err(ValidationError::OutOfRange {
            field: "weeks",
            value: i64::from(weeks),
            min: 1,
            max: i64::from(MAX_VELOCITY_WEEKS),
        }
        .into());
    }

    let today = now.with_timezone(&Local).date_naive();
    let windows = velocity_windows(weeks, today);
    let tasks = db
        .list_tasks(TaskFilter::default())
        .context("failed to load tasks")?;
    let data = report::velocity(&tasks, &windows);

    if json {
        let output = JsonReport {
            generated_at: now.to_rfc3339(),
            timezone: local_timezone(),
            period: None,
            report: &data,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        let labels: Vec<String> = windows
            .iter()
            .map(|w| period_label(*w, PeriodType::Week))
            .collect();
        write!(writer, "{}", format_velocity(&data, &labels))?;
    }
    Ok(())
}

pub fn estimates<W: Write>(
    writer: &mut W,
    db: &Database,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let tasks = db
        .list_tasks(TaskFilter::default())
        .context("failed to load tasks")?;
    let sessions = db
        .list_sessions(None, None)
        .context("failed to load sessions")?;
    let data = report::estimation_accuracy(&tasks, &sessions, now);

    if json {
        let output = JsonReport {
            generated_at: now.to_rfc3339(),
            timezone: local_timezone(),
            period: None,
            report: &data,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        write!(writer, "{}", format_estimates(&data))?;
    }
    Ok(())
}

fn local_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ========== Human-readable Output ==========

/// Formats the time-spent report.
pub fn format_spent(data: &SpentReport, label: &str, period_type: PeriodType) -> String {
    let mut output = String::new();
    writeln!(output, "TIME SPENT: {label}").unwrap();

    if data.total_seconds <= 0 {
        let period_word = match period_type {
            PeriodType::Week => "week",
            PeriodType::Day => "day",
        };
        writeln!(output).unwrap();
        writeln!(output, "No time tracked this {period_word}.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'tally log' to see recorded sessions.").unwrap();
        return output;
    }

    let max_project = data.projects.first().map_or(0, |p| p.seconds);

    writeln!(output).unwrap();
    writeln!(output, "BY PROJECT").unwrap();
    writeln!(output, "──────────").unwrap();
    for project in &data.projects {
        writeln!(
            output,
            "{:<32} {:>8}  {}",
            project.name,
            format_duration(project.seconds),
            progress_bar(project.seconds, max_project)
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "BY TASK").unwrap();
    writeln!(output, "───────").unwrap();
    for task in &data.tasks {
        let id = format!("#{}", task.task_id);
        writeln!(
            output,
            "{id:<6} {:<25} {:>8}  ({} session{})",
            task.title,
            format_duration(task.seconds),
            task.sessions,
            if task.sessions == 1 { "" } else { "s" }
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    writeln!(output, "Total tracked:  {}", format_duration(data.total_seconds)).unwrap();
    writeln!(output, "Tasks worked:   {}", data.tasks.len()).unwrap();
    output
}

/// Formats the velocity report; `labels` names each window in order.
pub fn format_velocity(data: &VelocityReport, labels: &[String]) -> String {
    let mut output = String::new();
    writeln!(output, "VELOCITY: last {} week(s)", data.windows.len()).unwrap();
    writeln!(output).unwrap();

    let max_points = i64::from(data.max_points);
    for (window, label) in data.windows.iter().zip(labels) {
        writeln!(
            output,
            "{label:<24} {:>4} pts  {}  ({} done)",
            window.points,
            progress_bar(i64::from(window.points), max_points),
            window.tasks_completed
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(
        output,
        "Average: {:.1} pts/week (min {}, max {})",
        data.average_points, data.min_points, data.max_points
    )
    .unwrap();
    if data.unsized_tasks > 0 {
        writeln!(
            output,
            "Note: {} done task(s) have no size and add no points.",
            data.unsized_tasks
        )
        .unwrap();
    }
    output
}

/// Formats the estimation accuracy report.
pub fn format_estimates(data: &AccuracyReport) -> String {
    let mut output = String::new();
    writeln!(output, "ESTIMATION ACCURACY").unwrap();
    writeln!(output).unwrap();

    if data.rows.is_empty() {
        writeln!(
            output,
            "No done tasks with both an estimate and tracked time."
        )
        .unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<6} {:<25} {:>8} {:>8} {:>8}",
        "TASK", "TITLE", "EST", "ACTUAL", "DIFF"
    )
    .unwrap();
    for row in &data.rows {
        let id = format!("#{}", row.task_id);
        writeln!(
            output,
            "{id:<6} {:<25} {:>8} {:>8} {:>8}",
            row.title,
            format_duration(row.estimate_seconds),
            format_duration(row.actual_seconds),
            format!("{:+.1}%", row.difference_pct)
        )
        .unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    if let Some(bias) = data.average_bias_pct {
        writeln!(output, "Average bias:  {bias:+.1}%").unwrap();
    }
    if let (Some(min), Some(max)) = (data.min_difference_pct, data.max_difference_pct) {
        writeln!(output, "Range:         {min:+.1}% to {max:+.1}%").unwrap();
    }
    writeln!(
        output,
        "Overruns: {}  Underruns: {}  On target: {}",
        data.overruns, data.underruns, data.on_target
    )
    .unwrap();
    output
}

// ========== JSON Output ==========

/// JSON report envelope.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a, T: Serialize> {
    pub generated_at: String,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<JsonPeriod>,
    #[serde(flatten)]
    pub report: &'a T,
}

#[derive(Debug, Serialize)]
pub struct JsonPeriod {
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub period_type: PeriodType,
}

/// Local calendar dates covered by `window`, end inclusive.
fn json_period(window: Window, period_type: PeriodType) -> JsonPeriod {
    let local_start = window.start.with_timezone(&Local);
    let local_end = window.end.with_timezone(&Local);

    // period end is the first moment of the next period, so step back a day
    let end_date = local_end.date_naive() - Duration::days(1);

    JsonPeriod {
        start: local_start.date_naive().format("%Y-%m-%d").to_string(),
        end: end_date.format("%Y-%m-%d").to_string(),
        period_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tally_core::report::{EstimateRow, ProjectTime, TaskTime, WindowVelocity};
    use tally_core::{
        FixedClock, NewTask, ProjectId, SessionEngine, StartPolicy, TaskId, TaskState,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local_dates(window: Window) -> (NaiveDate, NaiveDate) {
        (
            window.start.with_timezone(&Local).date_naive(),
            window.end.with_timezone(&Local).date_naive(),
        )
    }

    fn utc_window() -> Window {
        Window {
            start: Utc.with_ymd_and_hms(2025, 1, 27, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 2, 3, 0, 0, 0).unwrap(),
        }
    }

    // ========== Period Date Calculation Tests ==========

    #[test]
    fn test_week_window_for_known_date() {
        // Jan 29, 2025 is a Wednesday
        let window = period_window(Period::Week, date(2025, 1, 29));
        assert_eq!(local_dates(window), (date(2025, 1, 27), date(2025, 2, 3)));
    }

    #[test]
    fn test_week_window_on_monday_and_sunday() {
        for today in [date(2025, 1, 27), date(2025, 2, 2)] {
            let window = period_window(Period::Week, today);
            assert_eq!(local_dates(window), (date(2025, 1, 27), date(2025, 2, 3)));
        }
    }

    #[test]
    fn test_last_week_window() {
        let window = period_window(Period::LastWeek, date(2025, 1, 29));
        assert_eq!(local_dates(window), (date(2025, 1, 20), date(2025, 1, 27)));
    }

    #[test]
    fn test_day_windows() {
        let today = date(2025, 1, 29);
        assert_eq!(
            local_dates(period_window(Period::Day, today)),
            (date(2025, 1, 29), date(2025, 1, 30))
        );
        assert_eq!(
            local_dates(period_window(Period::LastDay, today)),
            (date(2025, 1, 28), date(2025, 1, 29))
        );
    }

    #[test]
    fn test_velocity_windows_are_consecutive_weeks_oldest_first() {
        let windows = velocity_windows(3, date(2025, 1, 29));
        assert_eq!(windows.len(), 3);
        assert_eq!(local_dates(windows[0]).0, date(2025, 1, 13));
        assert_eq!(local_dates(windows[2]), (date(2025, 1, 27), date(2025, 2, 3)));
        assert_eq!(windows[0].end, windows[1].start);
        assert_eq!(windows[1].end, windows[2].start);
    }

    // ========== Progress Bar Tests ==========

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(100, 100), "██████████");
        assert_eq!(progress_bar(50, 100), "█████░░░░░");
        assert_eq!(progress_bar(4, 100), "█░░░░░░░░░");
        assert_eq!(progress_bar(0, 100), "░░░░░░░░░░");
        assert_eq!(progress_bar(5, 0), "░░░░░░░░░░");
    }

    // ========== Formatting Tests ==========

    #[test]
    fn test_format_spent_report() {
        let data = SpentReport {
            window: utc_window(),
            total_seconds: 9300,
            projects: vec![
                ProjectTime {
                    project_id: ProjectId::new(2),
                    name: "infra".to_string(),
                    seconds: 5400,
                    tasks: 1,
                },
                ProjectTime {
                    project_id: ProjectId::new(1),
                    name: "web".to_string(),
                    seconds: 3900,
                    tasks: 1,
                },
            ],
            tasks: vec![
                TaskTime {
                    task_id: TaskId::new(3),
                    title: "Rotate keys".to_string(),
                    project_id: ProjectId::new(2),
                    seconds: 5400,
                    sessions: 2,
                },
                TaskTime {
                    task_id: TaskId::new(1),
                    title: "Build login".to_string(),
                    project_id: ProjectId::new(1),
                    seconds: 3900,
                    sessions: 1,
                },
            ],
        };

        assert_snapshot!(format_spent(&data, "Week of Jan 27, 2025", PeriodType::Week), @r"
        TIME SPENT: Week of Jan 27, 2025

        BY PROJECT
        ──────────
        infra                              1h 30m  ██████████
        web                                 1h 5m  ███████░░░

        BY TASK
        ───────
        #3     Rotate keys                 1h 30m  (2 sessions)
        #1     Build login                  1h 5m  (1 session)

        SUMMARY
        ───────
        Total tracked:  2h 35m
        Tasks worked:   2
        ");
    }

    #[test]
    fn test_format_spent_empty() {
        let data = SpentReport {
            window: utc_window(),
            total_seconds: 0,
            projects: Vec::new(),
            tasks: Vec::new(),
        };
        assert_snapshot!(format_spent(&data, "Wednesday, Jan 29, 2025", PeriodType::Day), @r"
        TIME SPENT: Wednesday, Jan 29, 2025

        No time tracked this day.

        Hint: Run 'tally log' to see recorded sessions.
        ");
    }

    #[test]
    fn test_format_velocity() {
        let window = utc_window();
        let data = VelocityReport {
            windows: vec![
                WindowVelocity {
                    window,
                    points: 8,
                    tasks_completed: 3,
                },
                WindowVelocity {
                    window,
                    points: 2,
                    tasks_completed: 1,
                },
            ],
            average_points: 5.0,
            min_points: 2,
            max_points: 8,
            unsized_tasks: 1,
        };
        let labels = vec![
            "Week of Jan 20, 2025".to_string(),
            "Week of Jan 27, 2025".to_string(),
        ];
        assert_snapshot!(format_velocity(&data, &labels), @r"
        VELOCITY: last 2 week(s)

        Week of Jan 20, 2025        8 pts  ██████████  (3 done)
        Week of Jan 27, 2025        2 pts  ███░░░░░░░  (1 done)

        Average: 5.0 pts/week (min 2, max 8)
        Note: 1 done task(s) have no size and add no points.
        ");
    }

    #[test]
    fn test_format_estimates() {
        let data = AccuracyReport {
            rows: vec![
                EstimateRow {
                    task_id: TaskId::new(1),
                    title: "Build login".to_string(),
                    estimate_seconds: 5400,
                    actual_seconds: 6300,
                    difference_pct: 16.666_666_666_666_668,
                },
                EstimateRow {
                    task_id: TaskId::new(2),
                    title: "Write docs".to_string(),
                    estimate_seconds: 3600,
                    actual_seconds: 2700,
                    difference_pct: -25.0,
                },
            ],
            average_bias_pct: Some(-4.166_666_666_666_666),
            min_difference_pct: Some(-25.0),
            max_difference_pct: Some(16.666_666_666_666_668),
            overruns: 1,
            underruns: 1,
            on_target: 0,
        };
        assert_snapshot!(format_estimates(&data), @r"
        ESTIMATION ACCURACY

        TASK   TITLE                          EST   ACTUAL     DIFF
        #1     Build login                 1h 30m   1h 45m   +16.7%
        #2     Write docs                   1h 0m   45m 0s   -25.0%

        SUMMARY
        ───────
        Average bias:  -4.2%
        Range:         -25.0% to +16.7%
        Overruns: 1  Underruns: 1  On target: 0
        ");
    }

    // ========== Command Tests ==========

    fn seeded() -> (Database, DateTime<Utc>) {
        let now = Utc::now();
        let mut db = Database::open_in_memory().unwrap();
        let project = db.create_project("web", None, now).unwrap();
        db.create_task(
            &NewTask {
                project_id: project.id,
                title: "Build login".to_string(),
                description: None,
                size: Some(5),
                estimate_minutes: Some(60),
                tags: Vec::new(),
            },
            now,
        )
        .unwrap();
        (db, now)
    }

    #[test]
    fn test_spent_json_includes_period_and_totals() {
        let (mut db, now) = seeded();
        let engine = SessionEngine::new(FixedClock(now), StartPolicy::SingleFocus);
        let session = engine
            .start(&mut db, TaskId::new(1), Some(now - Duration::seconds(90)))
            .unwrap();
        engine.stop(&mut db, session.id(), None).unwrap();

        // The session may straddle local midnight, so report on both days.
        let mut total = 0;
        for period in [Period::Day, Period::LastDay] {
            let mut output = Vec::new();
            spent(&mut output, &db, period, true, now).unwrap();
            let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
            assert_eq!(value["period"]["type"], "day");
            total += value["total_seconds"].as_i64().unwrap();
        }
        assert_eq!(total, 90);
    }

    #[test]
    fn test_velocity_rejects_zero_weeks() {
        let (db, now) = seeded();
        let err = velocity(&mut Vec::new(), &db, 0, false, now).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::OutOfRange { field: "weeks", .. })
        ));
    }

    #[test]
    fn test_velocity_counts_task_completed_now() {
        let (mut db, now) = seeded();
        db.set_task_state(TaskId::new(1), TaskState::Done, now)
            .unwrap();

        let mut output = Vec::new();
        velocity(&mut output, &db, 2, true, now).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["windows"].as_array().unwrap().len(), 2);
        assert_eq!(value["windows"][1]["points"], 5);
        assert_eq!(value["max_points"], 5);
        assert!(value.get("period").is_none());
    }

    #[test]
    fn test_estimates_compare_done_tasks() {
        let (mut db, now) = seeded();
        let engine = SessionEngine::new(FixedClock(now), StartPolicy::SingleFocus);
        let session = engine
            .start(&mut db, TaskId::new(1), Some(now - Duration::minutes(75)))
            .unwrap();
        engine.stop(&mut db, session.id(), None).unwrap();
        db.set_task_state(TaskId::new(1), TaskState::Done, now)
            .unwrap();

        let mut output = Vec::new();
        estimates(&mut output, &db, true, now).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["rows"][0]["estimate_seconds"], 3600);
        assert_eq!(value["rows"][0]["actual_seconds"], 4500);
        assert_eq!(value["rows"][0]["difference_pct"], 25.0);
        assert_eq!(value["overruns"], 1);
    }
}
