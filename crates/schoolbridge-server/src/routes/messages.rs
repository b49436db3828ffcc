use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use schoolbridge_shared::api::{SendMessageRequest, StudentRef, ThreadView};
use schoolbridge_shared::ThreadMessage;
use schoolbridge_store::StoreError;

use crate::access::{can_access_student, Scope};
use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath};
use crate::routes::{load_student, student_refs};
use crate::session::Session;

pub async fn send(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<ThreadView>), ServerError> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ServerError::BadRequest("text is required".into()));
    }
    let sender_role = session
        .role()
        .sender_role()
        .ok_or_else(|| ServerError::Forbidden("this account cannot send messages".into()))?;

    let db = state.db.lock().await;
    let student = load_student(&db, req.student_id)?;
    if !can_access_student(&session, &student) {
        return Err(ServerError::Forbidden("no access to this student".into()));
    }

    let message = ThreadMessage {
        sender_role,
        sender: session.user_id(),
        sender_name: session.name().to_string(),
        text,
        created_at: Utc::now(),
    };
    let teacher_name = session.is_staff().then(|| session.name());
    let thread = db.append_message(student.id, teacher_name, message)?;
    drop(db);

    info!(
        thread = %thread.id,
        student = %student.id,
        role = ?sender_role,
        "Message sent"
    );
    Ok((
        StatusCode::CREATED,
        Json(ThreadView {
            thread,
            student_info: Some(StudentRef::from(&student)),
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<ThreadView>>, ServerError> {
    let db = state.db.lock().await;
    let scope = Scope::resolve(&db, &session)?;
    let threads = db.list_threads(scope.filter())?;

    let ids: Vec<Uuid> = threads.iter().map(|t| t.student).collect();
    let refs = student_refs(&db, &ids)?;
    Ok(Json(
        threads
            .into_iter()
            .map(|thread| ThreadView {
                student_info: refs.get(&thread.student).cloned(),
                thread,
            })
            .collect(),
    ))
}

pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ThreadView>, ServerError> {
    let db = state.db.lock().await;
    let thread = db.get_thread(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("Thread".into()),
        other => other.into(),
    })?;

    let student = match load_student(&db, thread.student) {
        Ok(s) => Some(s),
        Err(ServerError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    let allowed = match &student {
        Some(s) => can_access_student(&session, s),
        None => session.is_staff(),
    };
    if !allowed {
        return Err(ServerError::Forbidden("no access to this thread".into()));
    }

    let cleared = db.clear_thread(id)?;
    drop(db);

    info!(thread = %id, by = %session.user_id(), "Thread cleared");
    Ok(Json(ThreadView {
        thread: cleared,
        student_info: student.as_ref().map(StudentRef::from),
    }))
}
