use std::collections::HashSet;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use schoolbridge_shared::api::{
    AssignTargets, AssignmentSaved, CreateAssignmentRequest, DeleteResponse, GradeEntry, GradeRequest,
};
use schoolbridge_shared::constants::DEFAULT_MAX_MARKS;
use schoolbridge_shared::{Assignment, Grade};
use schoolbridge_store::{AssignmentQuery, Database, StoreError};

use crate::access::Scope;
use crate::api::AppState;
use crate::cascade;
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::{non_blank, parse_timestamp};
use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilters {
    subject: Option<String>,
    student_id: Option<Uuid>,
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<CreateAssignmentRequest>,
) -> Result<(StatusCode, Json<AssignmentSaved>), ServerError> {
    session.require_staff()?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ServerError::BadRequest("title is required".into()));
    }
    let max_marks = req.max_marks.unwrap_or(DEFAULT_MAX_MARKS);
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(ServerError::BadRequest("maxMarks must be greater than 0".into()));
    }
    let due_date = non_blank(req.due_date)
        .map(|raw| parse_timestamp("dueDate", &raw))
        .transpose()?;

    let db = state.db.lock().await;
    let assigned_to = resolve_targets(&db, req.assigned_to)?;

    let now = Utc::now();
    let assignment = Assignment {
        id: Uuid::new_v4(),
        title,
        subject: non_blank(req.subject).unwrap_or_default(),
        description: non_blank(req.description).unwrap_or_default(),
        due_date,
        max_marks,
        assigned_to,
        created_by: session.user_id(),
        grades: vec![],
        created_at: now,
        updated_at: now,
    };
    db.insert_assignment(&assignment)?;

    let mut failed_students = Vec::new();
    for student_id in &assignment.assigned_to {
        if let Err(e) = db.link_assignment(*student_id, assignment.id) {
            warn!(student = %student_id, assignment = %assignment.id, error = %e, "Failed to link assignment");
            failed_students.push(*student_id);
        }
    }
    drop(db);

    info!(
        assignment = %assignment.id,
        targets = assignment.assigned_to.len(),
        failed = failed_students.len(),
        "Created assignment"
    );
    Ok((
        StatusCode::CREATED,
        Json(AssignmentSaved {
            assignment,
            failed_students,
        }),
    ))
}

/// Expand `assignedTo` into a de-duplicated id list, rejecting unknown ids.
fn resolve_targets(db: &Database, targets: Option<AssignTargets>) -> Result<Vec<Uuid>, ServerError> {
    let requested = match targets {
        None => return Ok(vec![]),
        Some(AssignTargets::Keyword(word)) if word.eq_ignore_ascii_case("all") => {
            return Ok(db.all_student_ids()?);
        }
        Some(AssignTargets::Keyword(word)) => {
            return Err(ServerError::BadRequest(format!(
                "assignedTo must be a list of student ids or \"all\", got {word:?}"
            )));
        }
        Some(AssignTargets::Students(ids)) => ids,
    };

    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = requested.into_iter().filter(|id| seen.insert(*id)).collect();

    let known: HashSet<Uuid> = db.students_by_ids(&ids)?.iter().map(|s| s.id).collect();
    let unknown: Vec<String> = ids
        .iter()
        .filter(|id| !known.contains(id))
        .map(Uuid::to_string)
        .collect();
    if !unknown.is_empty() {
        return Err(ServerError::BadRequest(format!(
            "unknown student id(s): {}",
            unknown.join(", ")
        )));
    }
    Ok(ids)
}

pub async fn list(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(filters): ApiQuery<AssignmentFilters>,
) -> Result<Json<Vec<Assignment>>, ServerError> {
    let db = state.db.lock().await;
    let scope = Scope::resolve(&db, &session)?;

    if let Some(student) = filters.student_id {
        if !scope.allows(student) {
            return Ok(Json(vec![]));
        }
    }

    let query = AssignmentQuery {
        subject: non_blank(filters.subject),
        student: filters.student_id,
        any_student: scope.filter().map(|ids| ids.to_vec()),
    };
    Ok(Json(db.list_assignments(&query)?))
}

pub async fn grade(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<GradeRequest>,
) -> Result<Json<AssignmentSaved>, ServerError> {
    session.require_staff()?;
    let entries = req.into_entries();
    if entries.is_empty() {
        return Err(ServerError::BadRequest("grades must not be empty".into()));
    }

    let db = state.db.lock().await;
    let mut assignment = load_assignment(&db, id)?;
    validate_grades(&assignment, &entries)?;

    for entry in &entries {
        let grade = Grade {
            student: entry.student_id,
            score: entry.score,
            remarks: non_blank(entry.remarks.clone()),
        };
        match assignment.grades.iter_mut().find(|g| g.student == entry.student_id) {
            Some(existing) => *existing = grade,
            None => assignment.grades.push(grade),
        }
    }
    db.save_assignment(&mut assignment)?;

    let graded_at = Utc::now();
    let mut failed_students = Vec::new();
    for entry in &entries {
        if let Err(e) = db.record_grade(entry.student_id, id, entry.score, session.user_id(), graded_at) {
            warn!(student = %entry.student_id, assignment = %id, error = %e, "Failed to record progress");
            failed_students.push(entry.student_id);
        }
    }
    drop(db);

    info!(assignment = %id, graded = entries.len(), by = %session.user_id(), "Graded assignment");
    Ok(Json(AssignmentSaved {
        assignment,
        failed_students,
    }))
}

/// Every entry must target an assigned student with a score in `0..=maxMarks`.
fn validate_grades(assignment: &Assignment, entries: &[GradeEntry]) -> Result<(), ServerError> {
    for entry in entries {
        if !entry.score.is_finite() || entry.score < 0.0 {
            return Err(ServerError::BadRequest(format!(
                "score for {} must not be negative",
                entry.student_id
            )));
        }
        if entry.score > assignment.max_marks {
            return Err(ServerError::BadRequest(format!(
                "score {} for {} exceeds maxMarks {}",
                entry.score, entry.student_id, assignment.max_marks
            )));
        }
        if !assignment.assigned_to.contains(&entry.student_id) {
            return Err(ServerError::BadRequest(format!(
                "student {} is not assigned this assignment",
                entry.student_id
            )));
        }
    }
    Ok(())
}

pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DeleteResponse>, ServerError> {
    session.require_staff()?;

    let db = state.db.lock().await;
    if !db.delete_assignment(id)? {
        return Err(ServerError::NotFound("Assignment".into()));
    }
    info!(assignment = %id, by = %session.user_id(), "Deleted assignment");

    let cleanup = cascade::after_assignment_deleted(&db, id);
    Ok(Json(DeleteResponse {
        deleted: true,
        cleanup: Some(cleanup),
    }))
}

fn load_assignment(db: &Database, id: Uuid) -> Result<Assignment, ServerError> {
    db.get_assignment(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("Assignment".into()),
        other => other.into(),
    })
}
