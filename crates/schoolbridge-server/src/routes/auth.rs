use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use schoolbridge_shared::api::{AuthResponse, LoginRequest, RegisterRequest};
use schoolbridge_shared::constants::MIN_PASSWORD_LEN;
use schoolbridge_shared::{is_plausible_email, normalize_email, Role, User, UserSummary};

use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::routes::{hash_blocking, verify_blocking};
use crate::session::Session;

/// Open registration creates parent and student accounts. Teacher and admin
/// accounts need an admin session.
pub async fn register(
    State(state): State<AppState>,
    session: Option<Session>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest("name, email and password are required".into()));
    }
    if !is_plausible_email(&email) {
        return Err(ServerError::BadRequest("email is not valid".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ServerError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let role = req.role.unwrap_or(Role::Parent);
    if role.is_staff() && session.as_ref().map(Session::role) != Some(Role::Admin) {
        warn!(%email, %role, "Refused staff self-registration");
        return Err(ServerError::Forbidden(format!("only an admin can create {role} accounts")));
    }

    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: hash_blocking(req.password).await?,
        role,
        created_at: Utc::now(),
    };

    state.db.lock().await.create_user(&user)?;
    info!(user = %user.id, role = %user.role, "Registered user");

    let summary = user.summary();
    let token = state.sessions.issue(&summary)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user: summary })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest("email and password are required".into()));
    }

    let user = state.db.lock().await.find_user_by_email(&email)?;
    let Some(user) = user else {
        return Err(invalid_credentials());
    };

    match verify_blocking(req.password, user.password_hash.clone()).await? {
        Ok(true) => {}
        Ok(false) => return Err(invalid_credentials()),
        Err(e) => {
            warn!(user = %user.id, error = %e, "Unusable password hash");
            return Err(invalid_credentials());
        }
    }

    let summary = user.summary();
    let token = state.sessions.issue(&summary)?;
    info!(user = %user.id, role = %user.role, "User logged in");
    Ok(Json(AuthResponse { token, user: summary }))
}

pub async fn me(session: Session) -> Json<UserSummary> {
    Json(session.claims.summary())
}

fn invalid_credentials() -> ServerError {
    ServerError::Unauthorized("Invalid credentials".into())
}
