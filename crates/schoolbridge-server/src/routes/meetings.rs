use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use schoolbridge_shared::api::{CreateMeetingRequest, DeleteResponse, MeetingStatusRequest, MeetingView, StudentRef};
use schoolbridge_shared::constants::{MEETING_DEFAULT_MINUTES, MEETING_MAX_MINUTES, MEETING_MIN_MINUTES};
use schoolbridge_shared::{Meeting, MeetingStatus, Student};
use schoolbridge_store::Database;

use crate::access::{can_access_student, Scope};
use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::{load_student, non_blank, parse_timestamp, student_refs};
use crate::session::Session;

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<CreateMeetingRequest>,
) -> Result<(StatusCode, Json<MeetingView>), ServerError> {
    let title = req.title.trim().to_string();
    let student_id = match req.student_id {
        Some(id) if !title.is_empty() && !req.starts_at.trim().is_empty() => id,
        _ => {
            return Err(ServerError::BadRequest(
                "studentId, title and startsAt are required".into(),
            ))
        }
    };
    let starts_at = parse_timestamp("startsAt", &req.starts_at)?;
    let duration_minutes = req.duration_minutes.unwrap_or(MEETING_DEFAULT_MINUTES);
    if !(MEETING_MIN_MINUTES..=MEETING_MAX_MINUTES).contains(&duration_minutes) {
        return Err(ServerError::BadRequest(format!(
            "durationMinutes must be between {MEETING_MIN_MINUTES} and {MEETING_MAX_MINUTES}"
        )));
    }

    let db = state.db.lock().await;
    let student = load_student(&db, student_id)?;
    if !can_access_student(&session, &student) {
        return Err(ServerError::Forbidden("no access to this student".into()));
    }

    let now = Utc::now();
    let meeting = Meeting {
        id: Uuid::new_v4(),
        student: student.id,
        title,
        agenda: non_blank(req.agenda).unwrap_or_default(),
        starts_at,
        duration_minutes,
        status: MeetingStatus::Scheduled,
        created_by: session.user_id(),
        meeting_link: non_blank(req.meeting_link).unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    db.insert_meeting(&meeting)?;
    drop(db);

    info!(meeting = %meeting.id, student = %student.id, by = %session.user_id(), "Scheduled meeting");
    Ok((
        StatusCode::CREATED,
        Json(MeetingView {
            meeting,
            student_info: Some(StudentRef::from(&student)),
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<MeetingView>>, ServerError> {
    let db = state.db.lock().await;
    let scope = Scope::resolve(&db, &session)?;
    let meetings = db.list_meetings(scope.filter())?;
    Ok(Json(with_students(&db, meetings)?))
}

pub async fn update_status(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<MeetingStatusRequest>,
) -> Result<Json<MeetingView>, ServerError> {
    let next: MeetingStatus = req
        .status
        .trim()
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid status {:?}", req.status)))?;

    let db = state.db.lock().await;
    let (meeting, student) = accessible_meeting(&db, &session, id)?;

    if !meeting.status.can_transition_to(next) {
        return Err(ServerError::Conflict(format!(
            "meeting is {} and cannot become {}",
            meeting.status.as_str(),
            next.as_str()
        )));
    }
    if !db.transition_meeting(id, meeting.status, next)? {
        return Err(ServerError::Conflict("meeting status changed concurrently".into()));
    }
    let updated = db.get_meeting(id)?;
    drop(db);

    info!(meeting = %id, from = meeting.status.as_str(), to = next.as_str(), "Meeting status changed");
    Ok(Json(MeetingView {
        meeting: updated,
        student_info: student.as_ref().map(StudentRef::from),
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DeleteResponse>, ServerError> {
    let db = state.db.lock().await;
    let (meeting, _) = accessible_meeting(&db, &session, id)?;

    if !session.is_staff() && meeting.created_by != session.user_id() {
        return Err(ServerError::Forbidden("only staff or the organiser may delete a meeting".into()));
    }
    if !db.delete_meeting(id)? {
        return Err(ServerError::NotFound("Meeting".into()));
    }
    info!(meeting = %id, by = %session.user_id(), "Deleted meeting");
    Ok(Json(DeleteResponse {
        deleted: true,
        cleanup: None,
    }))
}

/// Load a meeting the caller may act on. Meetings of students the caller
/// cannot see are reported as missing.
fn accessible_meeting(
    db: &Database,
    session: &Session,
    id: Uuid,
) -> Result<(Meeting, Option<Student>), ServerError> {
    let meeting = db
        .find_meeting(id)?
        .ok_or_else(|| ServerError::NotFound("Meeting".into()))?;

    let student = match load_student(db, meeting.student) {
        Ok(s) => Some(s),
        Err(ServerError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    let allowed = match &student {
        Some(s) => can_access_student(session, s),
        None => session.is_staff(),
    };
    if !allowed {
        return Err(ServerError::NotFound("Meeting".into()));
    }
    Ok((meeting, student))
}

fn with_students(db: &Database, meetings: Vec<Meeting>) -> Result<Vec<MeetingView>, ServerError> {
    let ids: Vec<Uuid> = meetings.iter().map(|m| m.student).collect();
    let refs = student_refs(db, &ids)?;
    Ok(meetings
        .into_iter()
        .map(|meeting| MeetingView {
            student_info: refs.get(&meeting.student).cloned(),
            meeting,
        })
        .collect())
}
