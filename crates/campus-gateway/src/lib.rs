//! campus-gateway: HTTP API for the campus helpdesk
//!
//! Exposes session creation, message exchange, history and reset over JSON
//! for the web frontend. Routing and generation happen in campus-core, turns
//! are persisted through campus-store.

pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::ApiError;
pub use server::{GatewayServer, GatewayState};
