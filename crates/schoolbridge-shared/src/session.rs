//! Signed, time-limited session credentials.
//!
//! A token is `base64url(claims JSON) "." base64url(signature)`, signed with
//! an Ed25519 key derived from the server's token secret. Only the server
//! holds the secret, so only the server can mint or check tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::KDF_CONTEXT_SESSION_KEY;
use crate::error::SessionError;
use crate::models::UserSummary;
use crate::types::Role;

/// Identity carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Mints and verifies session tokens.
#[derive(Clone)]
pub struct SessionSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    /// Derive the signing key from an arbitrary-length secret.
    pub fn from_secret(secret: &[u8], ttl: Duration) -> Self {
        let seed = blake3::derive_key(KDF_CONTEXT_SESSION_KEY, secret);
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &UserSummary) -> Result<String, SessionError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &UserSummary, now: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = SessionClaims {
            user_id: user.id,
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };

        let json = serde_json::to_vec(&claims).map_err(|_| SessionError::Encoding)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.signing_key.sign(payload.as_bytes());

        Ok(format!(
            "{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let (payload, sig_b64) = token.trim().split_once('.').ok_or(SessionError::Malformed)?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Malformed)?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|_| SessionError::Malformed)?;

        self.verifying_key
            .verify(payload.as_bytes(), &signature)
            .map_err(|_| SessionError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| SessionError::Malformed)?;

        if now >= claims.expires_at {
            return Err(SessionError::Expired);
        }

        Ok(claims)
    }
}
