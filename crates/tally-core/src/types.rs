//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types and user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The provided value exceeded the maximum length.
    #[error("{field} must be at most {max} characters, got {len}")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    /// The provided value did not match the expected format.
    #[error("invalid {field} '{value}': {expected}")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A numeric value was outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A supplied timestamp is later than the current time.
    #[error("{field} {at} is in the future (now is {now})")]
    FutureTimestamp {
        field: &'static str,
        at: String,
        now: String,
    },

    /// A supplied timestamp does not come strictly after the one it follows.
    #[error("{field} {at} must be after {previous_field} {previous}")]
    OutOfOrder {
        field: &'static str,
        at: String,
        previous_field: &'static str,
        previous: String,
    },

    /// A stored session record breaks the timestamp invariants.
    #[error("inconsistent session {session_id}: {message}")]
    InconsistentSession { session_id: String, message: String },

    /// Unknown task state name.
    #[error("invalid task state: {value}")]
    InvalidTaskState { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Generates a row ID newtype over the storage layer's integer keys.
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row ID.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row ID.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim().trim_start_matches('#');
                trimmed
                    .parse::<i64>()
                    .ok()
                    .filter(|id| *id > 0)
                    .map(Self)
                    .ok_or_else(|| ValidationError::InvalidFormat {
                        field: $field_name,
                        value: s.to_string(),
                        expected: "a positive integer",
                    })
            }
        }
    };
}

define_string_id!(
    /// A validated time session identifier.
    ///
    /// Session IDs are opaque non-empty strings (UUID v4 when generated here).
    SessionId, "session ID"
);

impl SessionId {
    /// Generates a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

define_row_id!(
    /// Identifier of a task row.
    TaskId, "task ID"
);

define_row_id!(
    /// Identifier of a project row.
    ProjectId, "project ID"
);
