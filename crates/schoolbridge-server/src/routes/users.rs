use axum::{
    extract::State,
    Json,
};

use schoolbridge_shared::UserSummary;

use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::ApiPath;
use crate::session::Session;

/// Resolve an email to a user summary. Used by the front end to check a
/// parent account before linking it to a student.
pub async fn by_email(
    State(state): State<AppState>,
    _session: Session,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<UserSummary>, ServerError> {
    let user = state.db.lock().await.find_user_by_email(&email)?;
    user.map(|u| Json(u.summary()))
        .ok_or_else(|| ServerError::NotFound("User".into()))
}
