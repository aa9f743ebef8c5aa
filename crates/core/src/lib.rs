//! Domain types and pure logic for the Toonify job lifecycle tracker.
//!
//! Nothing in this crate performs network I/O or logging. Stateful
//! services (the quota ledger, the progress simulator, the orchestrator)
//! live in `toonify-pipeline` and build on the types defined here.

pub mod clock;
pub mod error;
pub mod generation;
pub mod job;
pub mod job_events;
pub mod moderation;
pub mod phase;
pub mod quota;
pub mod store;
pub mod types;
