/// Application name
pub const APP_NAME: &str = "SchoolBridge";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 4000;

/// Session token lifetime in hours (7 days)
pub const SESSION_TTL_HOURS: i64 = 7 * 24;

/// Key derivation context for the session signing key (BLAKE3)
pub const KDF_CONTEXT_SESSION_KEY: &str = "schoolbridge-session-signing-key-v1";

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Alphabet for generated parent passwords (no 0/O/1/I lookalikes)
pub const PARENT_PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Prefix of generated parent passwords
pub const PARENT_PASSWORD_PREFIX: &str = "P-";

/// Number of random characters after the prefix
pub const PARENT_PASSWORD_LEN: usize = 7;

/// Meeting duration bounds in minutes
pub const MEETING_MIN_MINUTES: u32 = 10;
pub const MEETING_MAX_MINUTES: u32 = 180;
pub const MEETING_DEFAULT_MINUTES: u32 = 30;

/// Default maximum marks for an assignment
pub const DEFAULT_MAX_MARKS: f64 = 100.0;

/// Hard cap on rows returned by a student listing
pub const MAX_STUDENT_LIST: u32 = 500;
