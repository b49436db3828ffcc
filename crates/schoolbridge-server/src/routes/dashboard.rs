use axum::{extract::State, Json};
use chrono::Utc;

use schoolbridge_shared::api::DashboardSummary;
use schoolbridge_shared::MeetingStatus;
use schoolbridge_store::AssignmentQuery;

use crate::access::Scope;
use crate::api::AppState;
use crate::error::ServerError;
use crate::session::Session;

/// Counts of everything visible to the caller.
pub async fn summary(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<DashboardSummary>, ServerError> {
    let db = state.db.lock().await;
    let scope = Scope::resolve(&db, &session)?;
    let now = Utc::now();

    let students = match &scope {
        Scope::All => db.all_student_ids()?.len(),
        Scope::Children(ids) => ids.len(),
    };

    let assignments = db
        .list_assignments(&AssignmentQuery {
            any_student: scope.filter().map(|ids| ids.to_vec()),
            ..Default::default()
        })?
        .len();

    let upcoming_meetings = db
        .list_meetings(scope.filter())?
        .iter()
        .filter(|m| m.status == MeetingStatus::Scheduled && m.starts_at >= now)
        .count();

    let threads = db.list_threads(scope.filter())?.len();

    Ok(Json(DashboardSummary {
        role: session.role(),
        students,
        assignments,
        upcoming_meetings,
        threads,
        generated_at: now,
    }))
}
