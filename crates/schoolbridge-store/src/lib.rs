//! # schoolbridge-store
//!
//! Document storage for the SchoolBridge portal, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every
//! collection. Each helper writes exactly one document; operations that
//! touch several documents (assignment fan-out, cascading cleanup) are
//! sequenced by the caller and are not transactional.

pub mod assignments;
pub mod database;
pub mod meetings;
pub mod migrations;
pub mod students;
pub mod threads;
pub mod users;

mod error;
mod rows;

pub use assignments::AssignmentQuery;
pub use database::Database;
pub use error::{Result, StoreError};
pub use schoolbridge_shared::models::*;
pub use students::StudentQuery;
