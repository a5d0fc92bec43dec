//! Time sessions and their pause/resume state machine.
//!
//! A session's state is never stored directly. It is derived from which
//! timestamp fields are populated:
//!
//! | `stopped_at` | `paused_at` | `resumed_at` | state     |
//! |--------------|-------------|--------------|-----------|
//! | set          | any         | any          | `Stopped` |
//! | unset        | set         | unset        | `Paused`  |
//! | unset        | otherwise   |              | `Active`  |
//!
//! Only the most recent pause/resume pair is kept on the record. A second
//! pause overwrites `paused_at` and clears `resumed_at`; time worked before
//! that point already lives in `duration_seconds`, which is brought up to
//! date on every transition out of an active interval.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, Transition};
use crate::types::{SessionId, TaskId, ValidationError};

/// Derived state of a session, computed from its timestamp fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Tracking is running; `since` is the start of the current active interval.
    Active { since: DateTime<Utc> },
    /// Tracking is suspended since `since`.
    Paused { since: DateTime<Utc> },
    /// Terminal; `total_seconds` is the finalized duration.
    Stopped { total_seconds: i64 },
}

impl SessionState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Active { .. } => "active",
            Self::Paused { .. } => "paused",
            Self::Stopped { .. } => "stopped",
        }
    }

    /// Whether the session still accepts transitions.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Stopped { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One contiguous, possibly paused, act of working on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSession {
    id: SessionId,
    task_id: TaskId,
    started_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    resumed_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    duration_seconds: i64,
}

impl TimeSession {
    /// Opens a new active session.
    ///
    /// Fails if `started_at` lies after `now`, or does not come strictly
    /// after `previous_stop`, the end of the session this one follows.
    pub fn start(
        task_id: TaskId,
        started_at: DateTime<Utc>,
        previous_stop: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        check_not_future("started_at", started_at, now)?;
        if let Some(previous) = previous_stop.filter(|&stop| started_at <= stop) {
            return Err(ValidationError::OutOfOrder {
                field: "started_at",
                at: started_at.to_rfc3339(),
                previous_field: "stopped_at",
                previous: previous.to_rfc3339(),
            });
        }
        Ok(Self {
            id: SessionId::generate(),
            task_id,
            started_at,
            paused_at: None,
            resumed_at: None,
            stopped_at: None,
            duration_seconds: 0,
        })
    }

    /// Rebuilds a session from stored fields, re-checking every invariant.
    pub fn from_parts(
        id: SessionId,
        task_id: TaskId,
        started_at: DateTime<Utc>,
        paused_at: Option<DateTime<Utc>>,
        resumed_at: Option<DateTime<Utc>>,
        stopped_at: Option<DateTime<Utc>>,
        duration_seconds: i64,
    ) -> Result<Self, ValidationError> {
        let inconsistent = |message: &str| ValidationError::InconsistentSession {
            session_id: id.to_string(),
            message: message.to_string(),
        };

        if duration_seconds < 0 {
            return Err(inconsistent("negative duration"));
        }
        if paused_at.is_some_and(|p| p <= started_at) {
            return Err(inconsistent("paused_at must be after started_at"));
        }
        match (paused_at, resumed_at) {
            (None, Some(_)) => return Err(inconsistent("resumed_at requires paused_at")),
            (Some(p), Some(r)) if r <= p => {
                return Err(inconsistent("resumed_at must be after paused_at"));
            }
            _ => {}
        }
        if let Some(stopped) = stopped_at {
            let latest = resumed_at.or(paused_at).unwrap_or(started_at);
            if stopped <= latest {
                return Err(inconsistent("stopped_at must be after every other timestamp"));
            }
        }

        Ok(Self {
            id,
            task_id,
            started_at,
            paused_at,
            resumed_at,
            stopped_at,
            duration_seconds,
        })
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    pub const fn resumed_at(&self) -> Option<DateTime<Utc>> {
        self.resumed_at
    }

    pub const fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    /// Accrued active seconds as of the last transition.
    pub const fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    /// Computes the derived state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.stopped_at.is_some() {
            return SessionState::Stopped {
                total_seconds: self.duration_seconds,
            };
        }
        match (self.paused_at, self.resumed_at) {
            (Some(paused_at), None) => SessionState::Paused { since: paused_at },
            (_, resumed_at) => SessionState::Active {
                since: resumed_at.unwrap_or(self.started_at),
            },
        }
    }

    /// Total active seconds as of `now`, without mutating the record.
    ///
    /// For an active session this is the stored duration plus the live
    /// interval since the last active start. A `now` earlier than that start
    /// contributes nothing.
    #[must_use]
    pub fn current_duration(&self, now: DateTime<Utc>) -> i64 {
        match self.state() {
            SessionState::Active { since } => {
                self.duration_seconds + (now - since).num_seconds().max(0)
            }
            SessionState::Paused { .. } => self.duration_seconds,
            SessionState::Stopped { total_seconds } => total_seconds,
        }
    }

    /// Transitions `active -> paused` at `at`, banking the active interval.
    pub fn pause(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), CoreError> {
        let SessionState::Active { since } = self.state() else {
            return Err(self.invalid(Transition::Pause));
        };
        self.check_timestamp("paused_at", at, now)?;

        self.duration_seconds += (at - since).num_seconds();
        self.paused_at = Some(at);
        self.resumed_at = None;
        Ok(())
    }

    /// Transitions `paused -> active` at `at`.
    pub fn resume(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !matches!(self.state(), SessionState::Paused { .. }) {
            return Err(self.invalid(Transition::Resume));
        }
        self.check_timestamp("resumed_at", at, now)?;

        self.resumed_at = Some(at);
        Ok(())
    }

    /// Finalizes an open session at `at`.
    pub fn stop(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), CoreError> {
        let live_since = match self.state() {
            SessionState::Active { since } => Some(since),
            SessionState::Paused { .. } => None,
            SessionState::Stopped { .. } => return Err(self.invalid(Transition::Stop)),
        };
        self.check_timestamp("stopped_at", at, now)?;

        if let Some(since) = live_since {
            self.duration_seconds += (at - since).num_seconds();
        }
        self.stopped_at = Some(at);
        Ok(())
    }

    /// The latest timestamp recorded on the record, with its field name.
    fn last_recorded(&self) -> (&'static str, DateTime<Utc>) {
        self.stopped_at
            .map(|at| ("stopped_at", at))
            .or_else(|| self.resumed_at.map(|at| ("resumed_at", at)))
            .or_else(|| self.paused_at.map(|at| ("paused_at", at)))
            .unwrap_or(("started_at", self.started_at))
    }

    fn check_timestamp(
        &self,
        field: &'static str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        check_not_future(field, at, now)?;
        let (previous_field, previous) = self.last_recorded();
        if at <= previous {
            return Err(ValidationError::OutOfOrder {
                field,
                at: at.to_rfc3339(),
                previous_field,
                previous: previous.to_rfc3339(),
            });
        }
        Ok(())
    }

    fn invalid(&self, attempted: Transition) -> CoreError {
        CoreError::InvalidState {
            session_id: self.id.clone(),
            state: self.state(),
            attempted,
        }
    }
}

fn check_not_future(
    field: &'static str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if at > now {
        return Err(ValidationError::FutureTimestamp {
            field,
            at: at.to_rfc3339(),
            now: now.to_rfc3339(),
        });
    }
    Ok(())
}
