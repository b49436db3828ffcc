//! # schoolbridge-client
//!
//! Typed access to the SchoolBridge API for front ends and scripts.
//!
//! [`PortalClient`] wraps every endpoint and carries the signed-in
//! [`ClientSession`]. The [`views`] module turns fetched documents into the
//! role-aware screens a front end renders: teacher and parent dashboards,
//! student detail, the assignments table, the meeting scheduler and the
//! message inbox.

pub mod client;
pub mod error;
pub mod session;
pub mod views;

pub use client::{AssignmentFilter, PortalClient, StudentFilter};
pub use error::ClientError;
pub use session::ClientSession;
