//! Clients for Toonify's external collaborators.
//!
//! Provides the generation backend contract with a local simulated
//! implementation and an HTTP client, the live progress feed over
//! WebSocket with reconnection, and the content moderation client.

pub mod api;
pub mod backend;
pub mod feed;
pub mod local;
pub mod messages;
pub mod moderation;
pub mod reconnect;

pub use backend::{GenerationBackend, GenerationError, GenerationTicket};
pub use feed::{FeedError, ProgressFeed, WsProgressFeed};
pub use local::LocalGenerationBackend;
pub use moderation::{HttpModerator, Moderator, PermissiveModerator};
