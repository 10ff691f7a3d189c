//! Session persistence for the campus helpdesk
//!
//! This crate provides:
//! - SQLite storage for sessions and their ordered turns
//! - Async wrappers that run blocking queries off the runtime threads

pub mod sqlite;

pub use sqlite::{SessionInfo, SessionStore};
