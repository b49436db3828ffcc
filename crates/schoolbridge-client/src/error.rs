use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("{message} ({status})")]
    Api { status: StatusCode, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotLoggedIn,
}

impl ClientError {
    /// Build the error for a failed response, surfacing the server's
    /// `{"error": ...}` message when there is one.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        ClientError::Api { status, message }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_kept_verbatim() {
        let err = ClientError::from_response(StatusCode::CONFLICT, br#"{"error":"Email already registered"}"#);
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(message, "Email already registered");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fallback_message_for_non_json_bodies() {
        let err = ClientError::from_response(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(err.to_string(), "Request failed with status 502 (502 Bad Gateway)");
        assert!(!err.is_unauthorized());
        assert!(ClientError::from_response(StatusCode::UNAUTHORIZED, b"{}").is_unauthorized());
    }
}
