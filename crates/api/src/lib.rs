//! Toonify API server library.
//!
//! Exposes config, state, error handling, routes, the WebSocket
//! infrastructure, and service wiring so integration tests and the binary
//! entrypoint share them.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;
