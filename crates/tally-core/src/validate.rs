//! Length, range and format checks for user-supplied fields.
//!
//! Each function returns the normalized value (trimmed, lowercased for tags)
//! so callers store exactly what was validated.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ValidationError;

pub const PROJECT_NAME_MAX: usize = 64;
pub const TITLE_MAX: usize = 128;
pub const PROJECT_DESCRIPTION_MAX: usize = 1024;
pub const TASK_DESCRIPTION_MAX: usize = 4096;
pub const SIZE_RANGE: (u32, u32) = (1, 100);
pub const ESTIMATE_MINUTES_RANGE: (u32, u32) = (1, 10_000);

static PROJECT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._-]*$").unwrap());

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_:-]{0,31}$").unwrap());

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, max, len });
    }
    Ok(())
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    check_length(field, trimmed, max)?;
    Ok(trimmed.to_string())
}

fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    check_length(field, trimmed, max)?;
    Ok(Some(trimmed.to_string()))
}

fn in_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<u32, ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        });
    }
    Ok(value)
}

pub fn project_name(value: &str) -> Result<String, ValidationError> {
    let name = required("project name", value, PROJECT_NAME_MAX)?;
    if !PROJECT_NAME_RE.is_match(&name) {
        return Err(ValidationError::InvalidFormat {
            field: "project name",
            value: name,
            expected: "letters, digits, spaces, '.', '_' or '-', starting with a letter or digit",
        });
    }
    Ok(name)
}

pub fn project_description(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    optional("project description", value, PROJECT_DESCRIPTION_MAX)
}

pub fn task_title(value: &str) -> Result<String, ValidationError> {
    required("task title", value, TITLE_MAX)
}

pub fn task_description(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    optional("task description", value, TASK_DESCRIPTION_MAX)
}

pub fn size(value: u32) -> Result<u32, ValidationError> {
    in_range("size", value, SIZE_RANGE)
}

pub fn estimate_minutes(value: u32) -> Result<u32, ValidationError> {
    in_range("estimate", value, ESTIMATE_MINUTES_RANGE)
}

/// Normalizes a tag to lowercase and checks its format.
pub fn tag(value: &str) -> Result<String, ValidationError> {
    let tag = required("tag", value, 32)?.to_lowercase();
    if !TAG_RE.is_match(&tag) {
        return Err(ValidationError::InvalidFormat {
            field: "tag",
            value: tag,
            expected: "lowercase letters, digits, '_', ':' or '-'",
        });
    }
    Ok(tag)
}

/// Validates a list of tags, dropping duplicates while keeping order.
pub fn tags<S: AsRef<str>>(values: &[S]) -> Result<Vec<String>, ValidationError> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let tag = tag(value.as_ref())?;
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}
