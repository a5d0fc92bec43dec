//! Session lifecycle engine.
//!
//! Each operation loads the relevant record through a [`SessionStore`],
//! applies one transition, and saves the result. All preconditions are
//! checked before `save_session` is called, so a rejected operation never
//! writes. Making the load/save pair atomic across processes is the store's
//! job (see `tally_db::SessionTx`).
//!
//! Timestamps are truncated to whole seconds before use, matching the
//! second granularity of `duration_seconds`.

use chrono::{DateTime, SubsecRound, Utc};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::session::TimeSession;
use crate::types::{SessionId, TaskId};

/// Storage collaborator consumed by the engine.
pub trait SessionStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether a task with this ID exists.
    fn task_exists(&self, task_id: TaskId) -> Result<bool, Self::Error>;

    /// Loads a session by ID.
    fn load_session(&self, id: &SessionId) -> Result<Option<TimeSession>, Self::Error>;

    /// Loads the open (not stopped) session for a task, if any.
    fn load_open_session_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<TimeSession>, Self::Error>;

    /// Loads the most recently started open session across all tasks.
    fn load_open_session(&self) -> Result<Option<TimeSession>, Self::Error>;

    /// Latest `stopped_at` among stopped sessions of one task, or of every
    /// task when `task_id` is `None`.
    fn latest_stop(&self, task_id: Option<TaskId>) -> Result<Option<DateTime<Utc>>, Self::Error>;

    /// Inserts or updates a session.
    fn save_session(&mut self, session: &TimeSession) -> Result<(), Self::Error>;
}

/// Which openness check `start` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPolicy {
    /// At most one open session per task.
    PerTask,
    /// At most one open session overall.
    #[default]
    SingleFocus,
}

/// Applies session transitions against a store, using a clock for "now".
#[derive(Debug, Clone)]
pub struct SessionEngine<C> {
    clock: C,
    policy: StartPolicy,
}

impl<C: Clock> SessionEngine<C> {
    pub const fn new(clock: C, policy: StartPolicy) -> Self {
        Self { clock, policy }
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Opens a new session for `task_id`, starting at `at` or now.
    pub fn start<S: SessionStore>(
        &self,
        store: &mut S,
        task_id: TaskId,
        at: Option<DateTime<Utc>>,
    ) -> Result<TimeSession, CoreError> {
        let now = self.clock.now().trunc_subsecs(0);
        let at = at.map_or(now, |at| at.trunc_subsecs(0));

        if !store.task_exists(task_id).map_err(CoreError::storage)? {
            return Err(CoreError::NotFound {
                entity: "task",
                id: task_id.to_string(),
            });
        }

        let (open, previous_stop) = match self.policy {
            StartPolicy::PerTask => (
                store.load_open_session_for_task(task_id),
                store.latest_stop(Some(task_id)),
            ),
            StartPolicy::SingleFocus => (store.load_open_session(), store.latest_stop(None)),
        };
        let open = open.map_err(CoreError::storage)?;
        let previous_stop = previous_stop.map_err(CoreError::storage)?;
        if let Some(open) = open {
            return Err(CoreError::Conflict {
                task_id,
                open_session: open.id().clone(),
                open_task: open.task_id(),
            });
        }

        let session = TimeSession::start(task_id, at, previous_stop, now)?;
        store.save_session(&session).map_err(CoreError::storage)?;
        tracing::info!(
            session_id = %session.id(),
            task_id = %task_id,
            started_at = %session.started_at(),
            "started session"
        );
        Ok(session)
    }

    /// Pauses an active session.
    pub fn pause<S: SessionStore>(
        &self,
        store: &mut S,
        session_id: &SessionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<TimeSession, CoreError> {
        self.transition(store, session_id, at, TimeSession::pause)
    }

    /// Resumes a paused session.
    pub fn resume<S: SessionStore>(
        &self,
        store: &mut S,
        session_id: &SessionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<TimeSession, CoreError> {
        self.transition(store, session_id, at, TimeSession::resume)
    }

    /// Stops an open session, finalizing its duration.
    pub fn stop<S: SessionStore>(
        &self,
        store: &mut S,
        session_id: &SessionId,
        at: Option<DateTime<Utc>>,
    ) -> Result<TimeSession, CoreError> {
        self.transition(store, session_id, at, TimeSession::stop)
    }

    /// Live duration of a session as of the engine's clock.
    pub fn current_duration(&self, session: &TimeSession) -> i64 {
        session.current_duration(self.clock.now())
    }

    fn transition<S, F>(
        &self,
        store: &mut S,
        session_id: &SessionId,
        at: Option<DateTime<Utc>>,
        apply: F,
    ) -> Result<TimeSession, CoreError>
    where
        S: SessionStore,
        F: FnOnce(&mut TimeSession, DateTime<Utc>, DateTime<Utc>) -> Result<(), CoreError>,
    {
        let now = self.clock.now().trunc_subsecs(0);
        let at = at.map_or(now, |at| at.trunc_subsecs(0));
        let mut session = store
            .load_session(session_id)
            .map_err(CoreError::storage)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "session",
                id: session_id.to_string(),
            })?;
        let from = session.state();

        apply(&mut session, at, now)?;
        store.save_session(&session).map_err(CoreError::storage)?;

        tracing::info!(
            session_id = %session_id,
            task_id = %session.task_id(),
            from = %from,
            to = %session.state(),
            duration_seconds = session.duration_seconds(),
            "session transition"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::Transition;
    use crate::session::SessionState;
    use crate::types::ValidationError;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct FakeStoreError;

    #[derive(Default)]
    struct MemoryStore {
        tasks: HashSet<TaskId>,
        sessions: HashMap<SessionId, TimeSession>,
        saves: usize,
        fail_saves: bool,
    }

    impl MemoryStore {
        fn with_tasks(ids: &[i64]) -> Self {
            Self {
                tasks: ids.iter().copied().map(TaskId::new).collect(),
                ..Self::default()
            }
        }
    }

    impl SessionStore for MemoryStore {
        type Error = FakeStoreError;

        fn task_exists(&self, task_id: TaskId) -> Result<bool, Self::Error> {
            Ok(self.tasks.contains(&task_id))
        }

        fn load_session(&self, id: &SessionId) -> Result<Option<TimeSession>, Self::Error> {
            Ok(self.sessions.get(id).cloned())
        }

        fn load_open_session_for_task(
            &self,
            task_id: TaskId,
        ) -> Result<Option<TimeSession>, Self::Error> {
            Ok(self
                .sessions
                .values()
                .find(|s| s.task_id() == task_id && s.state().is_open())
                .cloned())
        }

        fn load_open_session(&self) -> Result<Option<TimeSession>, Self::Error> {
            Ok(self
                .sessions
                .values()
                .filter(|s| s.state().is_open())
                .max_by_key(|s| s.started_at())
                .cloned())
        }

        fn latest_stop(
            &self,
            task_id: Option<TaskId>,
        ) -> Result<Option<DateTime<Utc>>, Self::Error> {
            Ok(self
                .sessions
                .values()
                .filter(|s| task_id.is_none_or(|id| s.task_id() == id))
                .filter_map(TimeSession::stopped_at)
                .max())
        }

        fn save_session(&mut self, session: &TimeSession) -> Result<(), Self::Error> {
            if self.fail_saves {
                return Err(FakeStoreError);
            }
            self.saves += 1;
            self.sessions.insert(session.id().clone(), session.clone());
            Ok(())
        }
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(seconds)
    }

    /// Engine whose clock is well past every timestamp used in a test.
    fn engine() -> SessionEngine<FixedClock> {
        SessionEngine::new(FixedClock(ts(3600)), StartPolicy::SingleFocus)
    }

    fn engine_at(seconds: i64) -> SessionEngine<FixedClock> {
        SessionEngine::new(FixedClock(ts(seconds)), StartPolicy::SingleFocus)
    }

    enum Step {
        Pause(i64),
        Resume(i64),
        Stop(i64),
    }

    fn run_steps(steps: &[Step]) -> TimeSession {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        let id = session.id().clone();
        let mut current = session;
        for step in steps {
            current = match *step {
                Step::Pause(s) => engine.pause(&mut store, &id, Some(ts(s))),
                Step::Resume(s) => engine.resume(&mut store, &id, Some(ts(s))),
                Step::Stop(s) => engine.stop(&mut store, &id, Some(ts(s))),
            }
            .unwrap();
        }
        current
    }

    #[test]
    fn single_pause_cycle_excludes_paused_interval() {
        let session = run_steps(&[Step::Pause(120), Step::Resume(180), Step::Stop(300)]);
        assert_eq!(session.duration_seconds(), 240);
        assert_eq!(
            session.state(),
            SessionState::Stopped { total_seconds: 240 }
        );
    }

    #[test]
    fn stop_without_pause_counts_whole_span() {
        let session = run_steps(&[Step::Stop(90)]);
        assert_eq!(session.duration_seconds(), 90);
    }

    #[test]
    fn multiple_pause_cycles_accumulate() {
        let session = run_steps(&[
            Step::Pause(50),
            Step::Resume(60),
            Step::Pause(200),
            Step::Resume(210),
            Step::Stop(400),
        ]);
        assert_eq!(session.duration_seconds(), 50 + 140 + 190);
    }

    #[test]
    fn duration_is_sum_of_active_intervals_for_many_cycles() {
        // 10 cycles of 30s active then 15s paused, then a final 30s active.
        let mut steps = Vec::new();
        let mut t = 0;
        for _ in 0..10 {
            t += 30;
            steps.push(Step::Pause(t));
            t += 15;
            steps.push(Step::Resume(t));
        }
        t += 30;
        steps.push(Step::Stop(t));

        let session = run_steps(&steps);
        assert_eq!(session.duration_seconds(), 11 * 30);
    }

    #[test]
    fn start_conflicts_with_open_session_for_same_task() {
        let engine = SessionEngine::new(FixedClock(ts(3600)), StartPolicy::PerTask);
        let mut store = MemoryStore::with_tasks(&[1, 2]);
        let open = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();

        let err = engine
            .start(&mut store, TaskId::new(1), Some(ts(10)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Conflict { ref open_session, .. } if open_session == open.id()
        ));
        assert_eq!(store.sessions.len(), 1);
        assert_eq!(store.load_session(open.id()).unwrap().unwrap(), open);

        // A different task is fine under the per-task policy.
        engine
            .start(&mut store, TaskId::new(2), Some(ts(10)))
            .unwrap();
        assert_eq!(store.sessions.len(), 2);
    }

    #[test]
    fn single_focus_policy_blocks_other_tasks() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1, 2]);
        engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();

        let err = engine
            .start(&mut store, TaskId::new(2), Some(ts(10)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Conflict { task_id, open_task, .. }
                if task_id == TaskId::new(2) && open_task == TaskId::new(1)
        ));
    }

    #[test]
    fn start_after_stop_is_allowed() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let first = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        engine.stop(&mut store, first.id(), Some(ts(60))).unwrap();

        let second = engine
            .start(&mut store, TaskId::new(1), Some(ts(120)))
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(second.duration_seconds(), 0);
    }

    #[test]
    fn start_cannot_overlap_previous_session_of_task() {
        let engine = SessionEngine::new(FixedClock(ts(7200)), StartPolicy::PerTask);
        let mut store = MemoryStore::with_tasks(&[1, 2]);
        let first = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        engine.stop(&mut store, first.id(), Some(ts(3600))).unwrap();
        let saves = store.saves;

        for at in [ts(1800), ts(3600)] {
            let err = engine
                .start(&mut store, TaskId::new(1), Some(at))
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::OutOfOrder {
                    field: "started_at",
                    previous_field: "stopped_at",
                    ..
                })
            ));
        }
        assert_eq!(store.saves, saves);
        assert_eq!(store.sessions.len(), 1);

        // Another task's history does not constrain a per-task start.
        engine
            .start(&mut store, TaskId::new(2), Some(ts(1800)))
            .unwrap();
        engine
            .start(&mut store, TaskId::new(1), Some(ts(3601)))
            .unwrap();
    }

    #[test]
    fn single_focus_start_follows_last_stop_of_any_task() {
        let engine = SessionEngine::new(FixedClock(ts(7200)), StartPolicy::SingleFocus);
        let mut store = MemoryStore::with_tasks(&[1, 2]);
        let first = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        engine.stop(&mut store, first.id(), Some(ts(3600))).unwrap();

        let err = engine
            .start(&mut store, TaskId::new(2), Some(ts(1800)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfOrder { .. })
        ));
        assert_eq!(store.sessions.len(), 1);
    }

    #[test]
    fn start_unknown_task_is_not_found() {
        let mut store = MemoryStore::with_tasks(&[]);
        let err = engine()
            .start(&mut store, TaskId::new(9), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "task not found: 9");
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn start_defaults_to_clock_now() {
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine_at(42)
            .start(&mut store, TaskId::new(1), None)
            .unwrap();
        assert_eq!(session.started_at(), ts(42));
    }

    #[test]
    fn double_pause_is_rejected_without_changing_duration() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        let paused = engine
            .pause(&mut store, session.id(), Some(ts(100)))
            .unwrap();
        let saves = store.saves;

        let err = engine
            .pause(&mut store, session.id(), Some(ts(150)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                attempted: Transition::Pause,
                state: SessionState::Paused { .. },
                ..
            }
        ));
        let stored = store.load_session(session.id()).unwrap().unwrap();
        assert_eq!(stored.duration_seconds(), 100);
        assert_eq!(stored, paused);
        assert_eq!(store.saves, saves);
    }

    #[test]
    fn resume_without_pause_is_invalid() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();

        let err = engine
            .resume(&mut store, session.id(), Some(ts(10)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                attempted: Transition::Resume,
                state: SessionState::Active { .. },
                ..
            }
        ));
    }

    #[test]
    fn stopped_session_rejects_every_transition() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        let stopped = engine
            .stop(&mut store, session.id(), Some(ts(60)))
            .unwrap();

        let attempts = [
            engine.pause(&mut store, session.id(), Some(ts(70))),
            engine.resume(&mut store, session.id(), Some(ts(70))),
            engine.stop(&mut store, session.id(), Some(ts(70))),
        ];
        for result in attempts {
            assert!(matches!(
                result,
                Err(CoreError::InvalidState {
                    state: SessionState::Stopped { total_seconds: 60 },
                    ..
                })
            ));
        }
        assert_eq!(store.load_session(session.id()).unwrap().unwrap(), stopped);
    }

    #[test]
    fn override_earlier_than_last_timestamp_is_rejected() {
        let engine = engine();
        let mut store = MemoryStore::with_tasks(&[1]);
        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(100)))
            .unwrap();
        let saves = store.saves;

        for at in [ts(50), ts(100)] {
            let err = engine
                .pause(&mut store, session.id(), Some(at))
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::OutOfOrder { .. })
            ));
        }
        assert_eq!(store.saves, saves);
        assert_eq!(store.load_session(session.id()).unwrap().unwrap(), session);
    }

    #[test]
    fn future_override_is_rejected() {
        let engine = engine_at(100);
        let mut store = MemoryStore::with_tasks(&[1]);

        let err = engine
            .start(&mut store, TaskId::new(1), Some(ts(101)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::FutureTimestamp { .. })
        ));
        assert!(store.sessions.is_empty());

        let session = engine
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        let err = engine
            .stop(&mut store, session.id(), Some(ts(200)))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::FutureTimestamp { .. })
        ));
        assert!(
            store
                .load_session(session.id())
                .unwrap()
                .unwrap()
                .state()
                .is_open()
        );
    }

    #[test]
    fn timestamps_are_truncated_to_whole_seconds() {
        let mut store = MemoryStore::with_tasks(&[1]);
        let engine = engine();
        let session = engine
            .start(
                &mut store,
                TaskId::new(1),
                Some(ts(10) + Duration::milliseconds(900)),
            )
            .unwrap();
        assert_eq!(session.started_at(), ts(10));

        // 10.9s truncates to 10s, which is not after the start.
        let err = engine
            .pause(
                &mut store,
                session.id(),
                Some(ts(10) + Duration::milliseconds(999)),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn unknown_session_is_not_found() {
        let mut store = MemoryStore::with_tasks(&[1]);
        let err = engine()
            .pause(&mut store, &SessionId::new("missing").unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "session", .. }));
    }

    #[test]
    fn storage_failure_passes_through() {
        let mut store = MemoryStore::with_tasks(&[1]);
        store.fail_saves = true;
        let err = engine()
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(err.to_string(), "storage error: disk on fire");
    }

    #[test]
    fn current_duration_is_live_and_read_only() {
        let mut store = MemoryStore::with_tasks(&[1]);
        let early = engine_at(500);
        let session = early
            .start(&mut store, TaskId::new(1), Some(ts(0)))
            .unwrap();
        let session = early
            .pause(&mut store, session.id(), Some(ts(100)))
            .unwrap();
        let session = early
            .resume(&mut store, session.id(), Some(ts(400)))
            .unwrap();

        let later = engine_at(460);
        assert_eq!(later.current_duration(&session), 100 + 60);
        assert_eq!(session.duration_seconds(), 100);
        assert_eq!(
            store.load_session(session.id()).unwrap().unwrap(),
            session
        );
    }
}
