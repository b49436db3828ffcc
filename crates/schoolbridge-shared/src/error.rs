use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchoolBridgeError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed session token")]
    Malformed,

    #[error("Invalid session signature")]
    BadSignature,

    #[error("Session expired")]
    Expired,

    #[error("Failed to encode session claims")]
    Encoding,
}

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password")]
    HashFailed,

    #[error("Stored password hash is unreadable")]
    CorruptHash,
}
