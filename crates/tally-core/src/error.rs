//! Error kinds surfaced by the session engine.

use thiserror::Error;

use crate::session::SessionState;
use crate::types::{SessionId, TaskId, ValidationError};

/// Boxed error from a storage collaborator, passed through unchanged.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A transition of an existing open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pause,
    Resume,
    Stop,
}

impl Transition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by engine operations.
///
/// Every variant except [`CoreError::Storage`] is detected before any
/// mutation, so a failed operation leaves stored state untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or temporally inconsistent input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An open session already exists where none is allowed.
    #[error(
        "cannot start task {task_id}: session {open_session} is already open for task {open_task}"
    )]
    Conflict {
        task_id: TaskId,
        open_session: SessionId,
        open_task: TaskId,
    },

    /// The requested transition is not legal from the session's state.
    #[error("cannot {attempted} session {session_id}: it is {state}")]
    InvalidState {
        session_id: SessionId,
        state: SessionState,
        attempted: Transition,
    },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl CoreError {
    pub(crate) fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}
