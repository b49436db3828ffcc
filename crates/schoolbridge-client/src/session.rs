//! The signed-in user, owned by [`crate::PortalClient`].

use schoolbridge_shared::api::AuthResponse;
use schoolbridge_shared::{Role, UserSummary};

/// Bearer token plus the account it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub token: String,
    pub user: UserSummary,
}

impl ClientSession {
    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_staff(&self) -> bool {
        self.user.role.is_staff()
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl From<AuthResponse> for ClientSession {
    fn from(resp: AuthResponse) -> Self {
        Self {
            token: resp.token,
            user: resp.user,
        }
    }
}
