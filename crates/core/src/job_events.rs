//! Message and event names for job and quota lifecycle updates.
//!
//! `MSG_TYPE_*` values are the `type` field of WebSocket messages sent to
//! clients; `EVENT_*` values are `PlatformEvent` types on the event bus.

/// Progress update while a job runs.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully, results attached.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed (submission, backend, or watchdog).
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled by the user or superseded by a newer job.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// Quota is nearly spent.
pub const MSG_TYPE_QUOTA_WARNING: &str = "quota_warning";

/// Quota is spent until its reset boundary.
pub const MSG_TYPE_QUOTA_EXHAUSTED: &str = "quota_exhausted";

pub const EVENT_JOB_SUBMITTED: &str = "job.submitted";
pub const EVENT_JOB_SUCCEEDED: &str = "job.succeeded";
pub const EVENT_JOB_FAILED: &str = "job.failed";
pub const EVENT_JOB_CANCELLED: &str = "job.cancelled";
pub const EVENT_QUOTA_LOW: &str = "quota.low";
pub const EVENT_QUOTA_EXHAUSTED: &str = "quota.exhausted";
