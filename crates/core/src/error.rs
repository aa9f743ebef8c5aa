use chrono::NaiveDate;

use crate::quota::QuotaKind;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A required request field is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The usage allowance for `kind` is spent until `resets_on`.
    #[error("{kind} quota exhausted, resets on {resets_on}")]
    QuotaExceeded {
        kind: QuotaKind,
        resets_on: NaiveDate,
    },

    /// The generation backend could not create a job.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// A phase table or job duration is malformed. Always a programming
    /// or configuration defect.
    #[error("Simulation fault: {0}")]
    SimulationFault(String),

    /// The quota record could not be written to its store.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
