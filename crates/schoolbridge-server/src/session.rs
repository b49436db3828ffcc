//! Bearer-token authentication for handlers.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;
use uuid::Uuid;

use schoolbridge_shared::session::SessionClaims;
use schoolbridge_shared::Role;

use crate::api::AppState;
use crate::error::ServerError;

/// The verified identity behind a request.
///
/// Adding this extractor to a handler makes the route require a valid
/// `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct Session {
    pub claims: SessionClaims,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn name(&self) -> &str {
        &self.claims.name
    }

    pub fn is_staff(&self) -> bool {
        self.claims.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), ServerError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ServerError::Forbidden("teacher or admin role required".into()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?;

        let claims = state.sessions.verify(token).map_err(|e| {
            debug!(error = %e, "Rejected session token");
            ServerError::from(e)
        })?;

        Ok(Session { claims })
    }
}
