//! Job lifecycle services: quota ledger, progress drivers, submission,
//! upload screening, and the orchestrator that wires them together.

pub mod config;
pub mod ledger;
pub mod live;
pub mod orchestrator;
pub mod progress;
pub mod simulator;
pub mod submitter;
pub mod tracking;
pub mod upload;

pub use config::TrackerConfig;
pub use ledger::QuotaLedger;
pub use orchestrator::{Orchestrator, Subscription};
pub use simulator::ProgressSimulator;
pub use submitter::JobSubmitter;
pub use tracking::{SnapshotReceiver, TrackingHandle};
