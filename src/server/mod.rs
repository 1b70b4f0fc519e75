//! HTTP server for peer traffic and the client-facing API.
//!
//! - [`peer_api`]: Routers, shared state and route handlers

pub mod peer_api;

pub use peer_api::{build_api_router, build_router, AppState};
