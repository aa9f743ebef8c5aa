//! Background relay from the orchestrator and event bus to WebSocket
//! clients.

pub mod progress;
