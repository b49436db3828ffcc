//! # schoolbridge-server
//!
//! REST API for the SchoolBridge parent–teacher portal.
//!
//! This crate provides:
//! - **Session authentication** with signed bearer tokens
//! - **Student, assignment, meeting and message** endpoints, scoped so that
//!   parents only ever see their own children's records
//! - **Best-effort cleanup** of references when students or assignments are
//!   deleted
//! - **Per-IP rate limiting** to protect against abuse

pub mod access;
pub mod api;
pub mod cascade;
pub mod config;
pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod routes;
pub mod session;
