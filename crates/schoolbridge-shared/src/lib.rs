//! # schoolbridge-shared
//!
//! Types shared by the store, the API server and the client: portal
//! documents, roles and status enums, session credentials and password
//! hashing.

pub mod api;
pub mod constants;
pub mod error;
pub mod models;
pub mod password;
pub mod session;
pub mod types;

pub use error::{PasswordError, SchoolBridgeError, SessionError};
pub use models::*;
pub use types::{MeetingStatus, ProgressStatus, Role, SenderRole};

/// Normalise an email for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalisation() {
        assert_eq!(normalize_email("  P@X.com "), "p@x.com");
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("p@x.com"));
        assert!(!is_plausible_email("p@x"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("p@@x.com"));
        assert!(!is_plausible_email("p q@x.com"));
    }
}
