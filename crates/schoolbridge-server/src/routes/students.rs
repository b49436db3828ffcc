use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use schoolbridge_shared::api::{BehaviourNoteRequest, CreateStudentRequest, DeleteResponse, StudentCreated};
use schoolbridge_shared::constants::{MAX_STUDENT_LIST, MIN_PASSWORD_LEN};
use schoolbridge_shared::password::generate_parent_password;
use schoolbridge_shared::{is_plausible_email, normalize_email, BehaviourNote, Role, Student, User};
use schoolbridge_store::StudentQuery;

use crate::access::{can_access_student, Scope};
use crate::api::AppState;
use crate::cascade;
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::{hash_blocking, load_student, non_blank};
use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilters {
    class_name: Option<String>,
    behaviour_tag: Option<String>,
}

/// Parent credential resolved before the student is written.
struct ParentLogin {
    email: String,
    password: String,
    password_hash: String,
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<CreateStudentRequest>,
) -> Result<(StatusCode, Json<StudentCreated>), ServerError> {
    session.require_staff()?;

    let first_name = req.first_name.trim().to_string();
    if first_name.is_empty() {
        return Err(ServerError::BadRequest("firstName is required".into()));
    }
    let dob = non_blank(req.dob).map(|raw| parse_dob(&raw)).transpose()?;
    let parent_name = non_blank(req.parent_name);

    // Hashing happens before the store lock is taken.
    let parent = match non_blank(req.parent_email) {
        Some(raw) => {
            let email = normalize_email(&raw);
            if !is_plausible_email(&email) {
                return Err(ServerError::BadRequest("parentEmail is not valid".into()));
            }
            // Passwords are kept verbatim; only an all-blank one counts as absent.
            let password = req
                .parent_password
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(generate_parent_password);
            if password.len() < MIN_PASSWORD_LEN {
                return Err(ServerError::BadRequest(format!(
                    "parentPassword must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            let password_hash = hash_blocking(password.clone()).await?;
            Some(ParentLogin {
                email,
                password,
                password_hash,
            })
        }
        None => None,
    };

    let now = Utc::now();
    let mut student = Student {
        id: Uuid::new_v4(),
        first_name,
        last_name: non_blank(req.last_name).unwrap_or_default(),
        class_name: non_blank(req.class_name).unwrap_or_default(),
        roll_number: non_blank(req.roll_number).unwrap_or_default(),
        dob,
        parent_name: parent_name.clone(),
        parent_email: parent.as_ref().map(|p| p.email.clone()),
        guardians: vec![],
        assignments: vec![],
        behaviour_notes: vec![],
        assignment_progress: vec![],
        created_at: now,
        updated_at: now,
    };

    let db = state.db.lock().await;

    if let Some(login) = &parent {
        let guardian = match db.find_user_by_email(&login.email)? {
            Some(existing) if existing.role == Role::Parent => {
                db.set_password_hash(existing.id, &login.password_hash)?;
                info!(user = %existing.id, "Re-synced parent credential");
                existing.id
            }
            Some(existing) => {
                return Err(ServerError::Conflict(format!(
                    "{} already belongs to a {} account",
                    login.email, existing.role
                )));
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    name: parent_name.clone().unwrap_or_else(|| login.email.clone()),
                    email: login.email.clone(),
                    password_hash: login.password_hash.clone(),
                    role: Role::Parent,
                    created_at: now,
                };
                db.create_user(&user)?;
                info!(user = %user.id, "Created parent account");
                user.id
            }
        };
        student.guardians.push(guardian);
    }

    db.insert_student(&student)?;
    drop(db);

    info!(
        student = %student.id,
        guardians = student.guardians.len(),
        by = %session.user_id(),
        "Created student"
    );

    Ok((
        StatusCode::CREATED,
        Json(StudentCreated {
            student,
            parent_password: parent.map(|p| p.password),
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    session: Session,
    ApiQuery(filters): ApiQuery<StudentFilters>,
) -> Result<Json<Vec<Student>>, ServerError> {
    let db = state.db.lock().await;

    match db.heal_guardian_links() {
        Ok(0) => {}
        Ok(n) => info!(linked = n, "Healed guardian links"),
        Err(e) => warn!(error = %e, "Guardian auto-heal failed"),
    }

    let guardian = match Scope::resolve(&db, &session)? {
        Scope::All => None,
        Scope::Children(_) => Some(session.user_id()),
    };

    let students = db.list_students(&StudentQuery {
        class_name: non_blank(filters.class_name),
        behaviour_tag: non_blank(filters.behaviour_tag),
        guardian,
        limit: Some(MAX_STUDENT_LIST),
    })?;
    Ok(Json(students))
}

pub async fn get_one(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Student>, ServerError> {
    let db = state.db.lock().await;
    let student = load_student(&db, id)?;
    drop(db);
    if !can_access_student(&session, &student) {
        return Err(ServerError::NotFound("Student".into()));
    }
    Ok(Json(student))
}

pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DeleteResponse>, ServerError> {
    session.require_staff()?;

    let db = state.db.lock().await;
    if !db.delete_student(id)? {
        return Err(ServerError::NotFound("Student".into()));
    }
    info!(student = %id, by = %session.user_id(), "Deleted student");

    let cleanup = cascade::after_student_deleted(&db, id);
    Ok(Json(DeleteResponse {
        deleted: true,
        cleanup: Some(cleanup),
    }))
}

pub async fn add_note(
    State(state): State<AppState>,
    session: Session,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<BehaviourNoteRequest>,
) -> Result<(StatusCode, Json<Student>), ServerError> {
    session.require_staff()?;

    let text = req.note.trim().to_string();
    if text.is_empty() {
        return Err(ServerError::BadRequest("note is required".into()));
    }
    let note = BehaviourNote {
        id: Uuid::new_v4(),
        note: text,
        tag: non_blank(req.tag),
        author: session.user_id(),
        date: Utc::now(),
    };

    let db = state.db.lock().await;
    load_student(&db, id)?;
    let student = db.add_behaviour_note(id, note)?;
    Ok((StatusCode::CREATED, Json(student)))
}

fn parse_dob(raw: &str) -> Result<NaiveDate, ServerError> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| ServerError::BadRequest("dob must be YYYY-MM-DD".into()))
}
