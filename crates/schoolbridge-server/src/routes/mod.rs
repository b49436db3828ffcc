//! HTTP handlers, one module per resource.

pub mod assignments;
pub mod auth;
pub mod dashboard;
pub mod meetings;
pub mod messages;
pub mod students;
pub mod users;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use schoolbridge_shared::api::StudentRef;
use schoolbridge_shared::password::{hash_password, verify_password};
use schoolbridge_shared::{PasswordError, Student};
use schoolbridge_store::{Database, StoreError};

use crate::error::ServerError;

/// Trim an optional text field, treating blank as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a timestamp given as RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC), or
/// a bare `YYYY-MM-DD` (midnight UTC).
pub(crate) fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, ServerError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(ServerError::BadRequest(format!("{field} is not a valid date/time")))
}

/// Hash a password on the blocking pool.
pub(crate) async fn hash_blocking(password: String) -> Result<String, ServerError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(ServerError::from)
}

/// Check a password on the blocking pool. The inner result carries a corrupt
/// stored hash back to the caller.
pub(crate) async fn verify_blocking(
    password: String,
    stored: String,
) -> Result<Result<bool, PasswordError>, ServerError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ServerError::Internal(format!("password check task failed: {e}")))
}

pub(crate) fn load_student(db: &Database, id: Uuid) -> Result<Student, ServerError> {
    db.get_student(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("Student".into()),
        other => other.into(),
    })
}

/// Name references for the given students, keyed by id. Deleted students
/// are simply absent.
pub(crate) fn student_refs(db: &Database, ids: &[Uuid]) -> Result<HashMap<Uuid, StudentRef>, ServerError> {
    Ok(db
        .students_by_ids(ids)?
        .iter()
        .map(|s| (s.id, StudentRef::from(s)))
        .collect())
}
