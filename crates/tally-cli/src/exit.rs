//! Process exit codes for failed commands.
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | any other failure                         |
//! | 2    | usage error (reported by clap)            |
//! | 3    | validation error                          |
//! | 4    | conflict with an existing record          |
//! | 5    | transition not allowed in current state   |
//! | 6    | referenced record not found               |

use tally_core::{CoreError, ValidationError};
use tally_db::DbError;

pub const FAILURE: u8 = 1;
pub const VALIDATION: u8 = 3;
pub const CONFLICT: u8 = 4;
pub const INVALID_STATE: u8 = 5;
pub const NOT_FOUND: u8 = 6;

/// Picks the exit code for the first recognized error in the chain.
pub fn code_for(err: &anyhow::Error) -> u8 {
    err.chain().find_map(classify).unwrap_or(FAILURE)
}

fn classify(err: &(dyn std::error::Error + 'static)) -> Option<u8> {
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return match core {
            CoreError::Validation(_) => Some(VALIDATION),
            CoreError::Conflict { .. } => Some(CONFLICT),
            CoreError::InvalidState { .. } => Some(INVALID_STATE),
            CoreError::NotFound { .. } => Some(NOT_FOUND),
            // the storage error itself is next in the chain
            CoreError::Storage(_) => None,
        };
    }
    if err.is::<ValidationError>() {
        return Some(VALIDATION);
    }
    match err.downcast_ref::<DbError>() {
        Some(DbError::ProjectExists { .. } | DbError::OpenSessionExists { .. }) => Some(CONFLICT),
        _ => None,
    }
}
