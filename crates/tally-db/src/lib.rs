//! Storage layer for the tally time tracker.
//!
//! Provides persistence for projects, tasks, tags and time sessions using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Atomic session updates
//!
//! Session commands go through [`SessionTx`], an `IMMEDIATE` transaction that
//! takes SQLite's write lock before the engine reads anything. Two CLI
//! processes racing on the same task therefore serialize: the second one sees
//! the first one's committed session. The partial unique index
//! `idx_sessions_open_task` additionally guarantees at most one open session
//! per task at the schema level.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with whole seconds
//! (e.g., `2025-01-15T10:30:00Z`), so that:
//! - Lexicographic ordering matches chronological ordering
//! - Values are human-readable in the database
//! - Values are timezone-aware (always UTC)

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use thiserror::Error;

use tally_core::{
    NewTask, Project, ProjectId, SessionId, SessionStore, Task, TaskId, TaskState, TaskUpdate,
    TimeSession,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {record}: {timestamp}")]
    TimestampParse {
        record: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned into a domain value.
    #[error("invalid stored {record}: {message}")]
    InvalidRecord { record: String, message: String },
    /// A project with this name already exists.
    #[error("project already exists: {name}")]
    ProjectExists { name: String },
    /// The schema rejected a second open session for the task.
    #[error("task {task_id} already has an open session")]
    OpenSessionExists { task_id: TaskId },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Filters for [`Database::list_tasks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    pub state: Option<TaskState>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.busy_timeout(std::time::Duration::from_secs(5))?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                state TEXT NOT NULL DEFAULT 'todo',
                size INTEGER,
                estimate_minutes INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);

            CREATE TABLE IF NOT EXISTS task_tags (
                task_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (task_id, tag),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_task_tags_tag ON task_tags(tag);

            -- Time sessions: state is derived from which timestamps are set
            -- duration_seconds: active seconds banked at the last transition
            CREATE TABLE IF NOT EXISTS time_sessions (
                id TEXT PRIMARY KEY,
                task_id INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                paused_at TEXT,
                resumed_at TEXT,
                stopped_at TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_task ON time_sessions(task_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON time_sessions(started_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_task
                ON time_sessions(task_id) WHERE stopped_at IS NULL;
            ",
        )?;
        Ok(())
    }

    /// Begins an `IMMEDIATE` transaction for a session read-modify-write.
    pub fn begin_session_tx(&mut self) -> Result<SessionTx<'_>, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SessionTx { tx })
    }

    // ========== Projects ==========

    /// Creates a project. Names are unique.
    pub fn create_project(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Project, DbError> {
        let created_at = format_timestamp(now);
        self.conn
            .execute(
                "INSERT INTO projects (name, description, created_at) VALUES (?, ?, ?)",
                params![name, description, created_at],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    DbError::ProjectExists {
                        name: name.to_string(),
                    }
                } else {
                    DbError::Sqlite(err)
                }
            })?;
        let id = ProjectId::new(self.conn.last_insert_rowid());
        tracing::debug!(project_id = %id, name, "created project");
        Ok(Project {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: parse_timestamp(&created_at, "project")?,
        })
    }

    /// Lists projects ordered by name.
    pub fn list_projects(&self) -> Result<Vec<Project>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at FROM projects ORDER BY name ASC, id ASC",
        )?;
        let rows = stmt.query_map([], ProjectRow::from_row)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?.into_project()?);
        }
        Ok(projects)
    }

    /// Looks up a project by ID.
    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>, DbError> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM projects WHERE id = ?",
                [id.get()],
                ProjectRow::from_row,
            )
            .optional()?
            .map(ProjectRow::into_project)
            .transpose()
    }

    /// Looks up a project by exact name.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, DbError> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM projects WHERE name = ?",
                [name],
                ProjectRow::from_row,
            )
            .optional()?
            .map(ProjectRow::into_project)
            .transpose()
    }

    // ========== Tasks ==========

    /// Creates a task in `todo` state along with its tags.
    pub fn create_task(&mut self, task: &NewTask, now: DateTime<Utc>) -> Result<Task, DbError> {
        let timestamp = format_timestamp(now);
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO tasks
            (project_id, title, description, state, size, estimate_minutes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                task.project_id.get(),
                task.title,
                task.description,
                TaskState::Todo.as_str(),
                task.size,
                task.estimate_minutes,
                timestamp,
                timestamp,
            ],
        )?;
        let id = TaskId::new(tx.last_insert_rowid());
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?, ?)")?;
            for tag in &task.tags {
                stmt.execute(params![id.get(), tag])?;
            }
        }
        tx.commit()?;
        tracing::debug!(task_id = %id, project_id = %task.project_id, "created task");

        self.get_task(id)?.ok_or_else(|| DbError::InvalidRecord {
            record: format!("task {id}"),
            message: "task vanished after insert".to_string(),
        })
    }

    /// Looks up a task by ID, including its tags.
    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                [id.get()],
                TaskRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let tags = self.task_tags(id)?;
        row.into_task(tags).map(Some)
    }

    /// Lists tasks matching `filter`, ordered by ID.
    pub fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR state = ?2)
            ORDER BY id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                filter.project_id.map(ProjectId::get),
                filter.state.map(|s| s.as_str()),
            ],
            TaskRow::from_row,
        )?;
        let mut tags = self.all_task_tags()?;
        let mut tasks = Vec::new();
        for row in rows {
            let row = row?;
            let task_tags = tags.remove(&row.id).unwrap_or_default();
            tasks.push(row.into_task(task_tags)?);
        }
        Ok(tasks)
    }

    /// Applies a partial update. Returns `None` if the task does not exist.
    pub fn update_task(
        &mut self,
        id: TaskId,
        update: &TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, DbError> {
        let changed = self.conn.execute(
            "
            UPDATE tasks SET
                title = COALESCE(?1, title),
                description = CASE WHEN ?2 THEN ?3 ELSE description END,
                size = COALESCE(?4, size),
                estimate_minutes = COALESCE(?5, estimate_minutes),
                updated_at = ?6
            WHERE id = ?7
            ",
            params![
                update.title,
                update.description.is_some(),
                update.description.as_ref().and_then(Option::as_deref),
                update.size,
                update.estimate_minutes,
                format_timestamp(now),
                id.get(),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_task(id)
    }

    /// Moves a task to `state`. Returns `None` if the task does not exist.
    pub fn set_task_state(
        &mut self,
        id: TaskId,
        state: TaskState,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, DbError> {
        if set_task_state_on(&self.conn, id, state, None, now)? == 0 {
            return Ok(None);
        }
        self.get_task(id)
    }

    /// Adds a tag, ignoring duplicates. Returns `false` if the task does not exist.
    pub fn add_task_tag(&mut self, id: TaskId, tag: &str) -> Result<bool, DbError> {
        if !task_exists_on(&self.conn, id)? {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?, ?)",
            params![id.get(), tag],
        )?;
        Ok(true)
    }

    /// Removes a tag. Returns whether a tag was removed.
    pub fn remove_task_tag(&mut self, id: TaskId, tag: &str) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM task_tags WHERE task_id = ? AND tag = ?",
            params![id.get(), tag],
        )?;
        Ok(removed > 0)
    }

    fn task_tags(&self, id: TaskId) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM task_tags WHERE task_id = ? ORDER BY tag ASC")?;
        let rows = stmt.query_map([id.get()], |row| row.get::<_, String>(0))?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    fn all_task_tags(&self) -> Result<HashMap<i64, Vec<String>>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT task_id, tag
            FROM task_tags
            ORDER BY task_id ASC, tag ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            let task_id: i64 = row.get(0)?;
            let tag: String = row.get(1)?;
            Ok((task_id, tag))
        })?;
        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            let (task_id, tag) = row?;
            tags.entry(task_id).or_default().push(tag);
        }
        Ok(tags)
    }

    // ========== Sessions ==========

    /// Lists sessions, most recently started first.
    pub fn list_sessions(
        &self,
        task_id: Option<TaskId>,
        limit: Option<usize>,
    ) -> Result<Vec<TimeSession>, DbError> {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        query_sessions(
            &self.conn,
            "WHERE (?1 IS NULL OR task_id = ?1) ORDER BY started_at DESC, id ASC LIMIT ?2",
            params![task_id.map(TaskId::get), limit],
        )
    }

    /// Lists every open session, most recently started first.
    pub fn list_open_sessions(&self) -> Result<Vec<TimeSession>, DbError> {
        query_sessions(
            &self.conn,
            "WHERE stopped_at IS NULL ORDER BY started_at DESC, id ASC",
            [],
        )
    }
}

/// An `IMMEDIATE` transaction used as the engine's storage collaborator.
///
/// Dropping it without [`SessionTx::commit`] rolls back every write.
pub struct SessionTx<'a> {
    tx: Transaction<'a>,
}

impl SessionTx<'_> {
    /// Lists every open session, most recently started first.
    pub fn list_open_sessions(&self) -> Result<Vec<TimeSession>, DbError> {
        query_sessions(
            &self.tx,
            "WHERE stopped_at IS NULL ORDER BY started_at DESC, id ASC",
            [],
        )
    }

    /// Moves a task from `from` to `to`; a no-op if it is in another state.
    pub fn transition_task(
        &self,
        id: TaskId,
        from: TaskState,
        to: TaskState,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        Ok(set_task_state_on(&self.tx, id, to, Some(from), now)? > 0)
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl SessionStore for SessionTx<'_> {
    type Error = DbError;

    fn task_exists(&self, task_id: TaskId) -> Result<bool, Self::Error> {
        task_exists_on(&self.tx, task_id)
    }

    fn load_session(&self, id: &SessionId) -> Result<Option<TimeSession>, Self::Error> {
        load_session_on(&self.tx, id)
    }

    fn load_open_session_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<TimeSession>, Self::Error> {
        load_open_session_for_task_on(&self.tx, task_id)
    }

    fn load_open_session(&self) -> Result<Option<TimeSession>, Self::Error> {
        Ok(self.list_open_sessions()?.into_iter().next())
    }

    fn latest_stop(&self, task_id: Option<TaskId>) -> Result<Option<DateTime<Utc>>, Self::Error> {
        latest_stop_on(&self.tx, task_id)
    }

    fn save_session(&mut self, session: &TimeSession) -> Result<(), Self::Error> {
        save_session_on(&self.tx, session)
    }
}

/// Autocommit store: each call runs on its own, so a check and the write that
/// follows it are not atomic. Commands go through [`SessionTx`]; this impl
/// serves tests and seeding, where nothing else touches the database.
impl SessionStore for Database {
    type Error = DbError;

    fn task_exists(&self, task_id: TaskId) -> Result<bool, Self::Error> {
        task_exists_on(&self.conn, task_id)
    }

    fn load_session(&self, id: &SessionId) -> Result<Option<TimeSession>, Self::Error> {
        load_session_on(&self.conn, id)
    }

    fn load_open_session_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<TimeSession>, Self::Error> {
        load_open_session_for_task_on(&self.conn, task_id)
    }

    fn load_open_session(&self) -> Result<Option<TimeSession>, Self::Error> {
        Ok(self.list_open_sessions()?.into_iter().next())
    }

    fn latest_stop(&self, task_id: Option<TaskId>) -> Result<Option<DateTime<Utc>>, Self::Error> {
        latest_stop_on(&self.conn, task_id)
    }

    fn save_session(&mut self, session: &TimeSession) -> Result<(), Self::Error> {
        save_session_on(&self.conn, session)
    }
}

// ========== Shared statements ==========

const TASK_COLUMNS: &str = "id, project_id, title, description, state, size, estimate_minutes, \
                            created_at, updated_at, completed_at";

const SESSION_COLUMNS: &str =
    "id, task_id, started_at, paused_at, resumed_at, stopped_at, duration_seconds";

fn task_exists_on(conn: &Connection, id: TaskId) -> Result<bool, DbError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)",
        [id.get()],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

/// Updates task state; `completed_at` follows entry into and exit from `done`.
fn set_task_state_on(
    conn: &Connection,
    id: TaskId,
    state: TaskState,
    only_from: Option<TaskState>,
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let now = format_timestamp(now);
    let changed = conn.execute(
        "
        UPDATE tasks SET
            state = ?1,
            updated_at = ?2,
            completed_at = CASE
                WHEN ?1 != 'done' THEN NULL
                WHEN state = 'done' THEN completed_at
                ELSE ?2
            END
        WHERE id = ?3 AND (?4 IS NULL OR state = ?4)
        ",
        params![state.as_str(), now, id.get(), only_from.map(|s| s.as_str())],
    )?;
    Ok(changed)
}

fn load_session_on(conn: &Connection, id: &SessionId) -> Result<Option<TimeSession>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE id = ?"),
            [id.as_str()],
            SessionRow::from_row,
        )
        .optional()?;
    row.map(SessionRow::into_session).transpose()
}

fn load_open_session_for_task_on(
    conn: &Connection,
    task_id: TaskId,
) -> Result<Option<TimeSession>, DbError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM time_sessions WHERE task_id = ? AND stopped_at IS NULL"
            ),
            [task_id.get()],
            SessionRow::from_row,
        )
        .optional()?;
    row.map(SessionRow::into_session).transpose()
}

/// Text comparison orders timestamps correctly since all are stored as
/// second-precision UTC RFC 3339.
fn latest_stop_on(
    conn: &Connection,
    task_id: Option<TaskId>,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(stopped_at) FROM time_sessions WHERE ?1 IS NULL OR task_id = ?1",
        params![task_id.map(TaskId::get)],
        |row| row.get(0),
    )?;
    latest
        .map(|ts| parse_timestamp(&ts, "latest session stop"))
        .transpose()
}

fn query_sessions<P: rusqlite::Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> Result<Vec<TimeSession>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM time_sessions {clause}"
    ))?;
    let rows = stmt.query_map(params, SessionRow::from_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?.into_session()?);
    }
    Ok(sessions)
}

fn save_session_on(conn: &Connection, session: &TimeSession) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO time_sessions
        (id, task_id, started_at, paused_at, resumed_at, stopped_at, duration_seconds)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            paused_at = excluded.paused_at,
            resumed_at = excluded.resumed_at,
            stopped_at = excluded.stopped_at,
            duration_seconds = excluded.duration_seconds
        ",
        params![
            session.id().as_str(),
            session.task_id().get(),
            format_timestamp(session.started_at()),
            session.paused_at().map(format_timestamp),
            session.resumed_at().map(format_timestamp),
            session.stopped_at().map(format_timestamp),
            session.duration_seconds(),
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            DbError::OpenSessionExists {
                task_id: session.task_id(),
            }
        } else {
            DbError::Sqlite(err)
        }
    })?;
    tracing::debug!(session_id = %session.id(), state = %session.state(), "saved session");
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn parse_timestamp(timestamp: &str, record: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record: record.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn parse_optional_timestamp(
    timestamp: Option<&str>,
    record: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    timestamp.map(|t| parse_timestamp(t, record)).transpose()
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ========== Row mapping ==========

#[derive(Debug)]
struct ProjectRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_project(self) -> Result<Project, DbError> {
        let record = format!("project {}", self.id);
        Ok(Project {
            id: ProjectId::new(self.id),
            name: self.name,
            description: self.description,
            created_at: parse_timestamp(&self.created_at, &record)?,
        })
    }
}

#[derive(Debug)]
struct TaskRow {
    id: i64,
    project_id: i64,
    title: String,
    description: Option<String>,
    state: String,
    size: Option<u32>,
    estimate_minutes: Option<u32>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            state: row.get(4)?,
            size: row.get(5)?,
            estimate_minutes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    fn into_task(self, tags: Vec<String>) -> Result<Task, DbError> {
        let record = format!("task {}", self.id);
        let state = self.state.parse().map_err(|err: tally_core::ValidationError| {
            DbError::InvalidRecord {
                record: record.clone(),
                message: err.to_string(),
            }
        })?;
        Ok(Task {
            id: TaskId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            title: self.title,
            description: self.description,
            state,
            size: self.size,
            estimate_minutes: self.estimate_minutes,
            tags,
            created_at: parse_timestamp(&self.created_at, &record)?,
            updated_at: parse_timestamp(&self.updated_at, &record)?,
            completed_at: parse_optional_timestamp(self.completed_at.as_deref(), &record)?,
        })
    }
}

#[derive(Debug)]
struct SessionRow {
    id: String,
    task_id: i64,
    started_at: String,
    paused_at: Option<String>,
    resumed_at: Option<String>,
    stopped_at: Option<String>,
    duration_seconds: i64,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            started_at: row.get(2)?,
            paused_at: row.get(3)?,
            resumed_at: row.get(4)?,
            stopped_at: row.get(5)?,
            duration_seconds: row.get(6)?,
        })
    }

    fn into_session(self) -> Result<TimeSession, DbError> {
        let record = format!("session {}", self.id);
        let invalid = |err: tally_core::ValidationError| DbError::InvalidRecord {
            record: record.clone(),
            message: err.to_string(),
        };
        let id = SessionId::new(self.id.clone()).map_err(invalid)?;
        TimeSession::from_parts(
            id,
            TaskId::new(self.task_id),
            parse_timestamp(&self.started_at, &record)?,
            parse_optional_timestamp(self.paused_at.as_deref(), &record)?,
            parse_optional_timestamp(self.resumed_at.as_deref(), &record)?,
            parse_optional_timestamp(self.stopped_at.as_deref(), &record)?,
            self.duration_seconds,
        )
        .map_err(invalid)
    }
}
