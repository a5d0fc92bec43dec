//! Core domain logic for the tally time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: the start/pause/resume/stop state machine and duration accounting
//! - Engine: applying session transitions against a storage collaborator
//! - Tasks and projects, with input validation
//! - Reports: time spent, velocity and estimation accuracy

pub mod clock;
pub mod engine;
mod error;
pub mod report;
pub mod session;
pub mod task;
pub mod types;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{SessionEngine, SessionStore, StartPolicy};
pub use error::{CoreError, StorageError, Transition};
pub use session::{SessionState, TimeSession};
pub use task::{NewTask, Project, Task, TaskState, TaskUpdate};
pub use types::{ProjectId, SessionId, TaskId, ValidationError};
