//! Password hashing and generated parent passwords.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::Rng;

use crate::constants::{PARENT_PASSWORD_ALPHABET, PARENT_PASSWORD_LEN, PARENT_PASSWORD_PREFIX};
use crate::error::PasswordError;

/// Hash a password into an Argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashFailed)
}

/// Check a password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only an unreadable stored hash is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|_| PasswordError::CorruptHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate a parent password such as `P-7G3K9Q2`.
pub fn generate_parent_password() -> String {
    let mut rng = OsRng;
    let mut out = String::with_capacity(PARENT_PASSWORD_PREFIX.len() + PARENT_PASSWORD_LEN);
    out.push_str(PARENT_PASSWORD_PREFIX);
    for _ in 0..PARENT_PASSWORD_LEN {
        let idx = rng.gen_range(0..PARENT_PASSWORD_ALPHABET.len());
        out.push(PARENT_PASSWORD_ALPHABET[idx] as char);
    }
    out
}
