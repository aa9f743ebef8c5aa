//! Toonify in-process event bus.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the job and quota lifecycle event envelope.

pub mod bus;

pub use bus::{EventBus, PlatformEvent};
