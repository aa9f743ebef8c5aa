//! Pipeline phase definitions and progress-to-phase lookup.
//!
//! A [`PhaseTable`] is an ordered list of [`PhaseDefinition`]s whose
//! progress ranges tile `[0, 100]` exactly. Ranges are half-open
//! (`[lower, upper)`) except the final one, which is closed at 100.
//! Tables are validated once on construction; lookups never fail.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lowest progress value a table must cover.
pub const PROGRESS_MIN: f64 = 0.0;
/// Highest progress value a table must cover.
pub const PROGRESS_MAX: f64 = 100.0;

/// Phase id for 3D model generation.
pub const PHASE_MODEL: &str = "model";
/// Phase id for final rendering.
pub const PHASE_RENDER: &str = "render";
/// Phase id for character style application.
pub const PHASE_STYLIZE: &str = "stylize";

/// Name of the built-in two-phase pipeline.
pub const PIPELINE_TWO_PHASE: &str = "two_phase";
/// Name of the built-in three-phase pipeline.
pub const PIPELINE_THREE_PHASE: &str = "three_phase";

// ---------------------------------------------------------------------------
// PhaseDefinition
// ---------------------------------------------------------------------------

/// One named sub-range of a job's progress axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub id: String,
    /// Step label shown while the job is inside this phase.
    pub label: String,
    pub progress_lower_bound: f64,
    pub progress_upper_bound: f64,
    /// Expected duration; display granularity only.
    pub nominal_duration_ms: u64,
}

impl PhaseDefinition {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        progress_lower_bound: f64,
        progress_upper_bound: f64,
        nominal_duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            progress_lower_bound,
            progress_upper_bound,
            nominal_duration_ms,
        }
    }

    /// Whether `progress` falls inside this phase's range.
    ///
    /// `closed_upper` is set for the final phase of a table.
    pub fn contains(&self, progress: f64, closed_upper: bool) -> bool {
        progress >= self.progress_lower_bound
            && (progress < self.progress_upper_bound
                || (closed_upper && progress <= self.progress_upper_bound))
    }
}

// ---------------------------------------------------------------------------
// PhaseTable
// ---------------------------------------------------------------------------

/// Validated, immutable ordered list of phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PhaseTable {
    phases: Vec<PhaseDefinition>,
}

impl PhaseTable {
    /// Validate and wrap an ordered list of phases.
    ///
    /// Rejects empty lists, the first phase not starting at 0, the last
    /// not ending at 100, empty or inverted ranges, and gaps or overlaps
    /// between neighbours.
    pub fn new(phases: Vec<PhaseDefinition>) -> Result<Self, CoreError> {
        let (first, last) = match (phases.first(), phases.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(CoreError::SimulationFault(
                    "phase table must contain at least one phase".to_string(),
                ))
            }
        };

        if first.progress_lower_bound != PROGRESS_MIN {
            return Err(CoreError::SimulationFault(format!(
                "first phase '{}' must start at {PROGRESS_MIN}, starts at {}",
                first.id, first.progress_lower_bound
            )));
        }
        if last.progress_upper_bound != PROGRESS_MAX {
            return Err(CoreError::SimulationFault(format!(
                "last phase '{}' must end at {PROGRESS_MAX}, ends at {}",
                last.id, last.progress_upper_bound
            )));
        }

        for phase in &phases {
            if phase.id.trim().is_empty() {
                return Err(CoreError::SimulationFault(
                    "phase id must not be empty".to_string(),
                ));
            }
            if !(phase.progress_lower_bound < phase.progress_upper_bound) {
                return Err(CoreError::SimulationFault(format!(
                    "phase '{}' has non-increasing bounds [{}, {})",
                    phase.id, phase.progress_lower_bound, phase.progress_upper_bound
                )));
            }
        }

        for pair in phases.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.progress_upper_bound != next.progress_lower_bound {
                return Err(CoreError::SimulationFault(format!(
                    "phases '{}' and '{}' are not contiguous ({} vs {})",
                    prev.id, next.id, prev.progress_upper_bound, next.progress_lower_bound
                )));
            }
        }

        Ok(Self { phases })
    }

    /// Two phases: 3D model generation then style application (65 s).
    pub fn two_phase() -> Self {
        Self {
            phases: vec![
                PhaseDefinition::new(PHASE_MODEL, "Generating 3D model", 0.0, 50.0, 25_000),
                PhaseDefinition::new(
                    PHASE_STYLIZE,
                    "Applying character styles",
                    50.0,
                    100.0,
                    40_000,
                ),
            ],
        }
    }

    /// Three phases: model, render, stylize (65 s).
    pub fn three_phase() -> Self {
        Self {
            phases: vec![
                PhaseDefinition::new(PHASE_MODEL, "Generating 3D model", 0.0, 40.0, 25_000),
                PhaseDefinition::new(PHASE_RENDER, "Rendering preview", 40.0, 55.0, 10_000),
                PhaseDefinition::new(
                    PHASE_STYLIZE,
                    "Applying character styles",
                    55.0,
                    100.0,
                    30_000,
                ),
            ],
        }
    }

    /// Look up a built-in table by name.
    pub fn builtin(name: &str) -> Result<Self, CoreError> {
        match name {
            PIPELINE_TWO_PHASE => Ok(Self::two_phase()),
            PIPELINE_THREE_PHASE => Ok(Self::three_phase()),
            other => Err(CoreError::SimulationFault(format!(
                "unknown pipeline '{other}'. Must be one of: {PIPELINE_TWO_PHASE}, {PIPELINE_THREE_PHASE}"
            ))),
        }
    }

    /// Index of the phase whose range contains `progress`.
    ///
    /// Out-of-range values clamp to the first or last phase; NaN maps to
    /// the first phase.
    pub fn index_for_progress(&self, progress: f64) -> usize {
        let p = if progress.is_nan() {
            PROGRESS_MIN
        } else {
            progress.clamp(PROGRESS_MIN, PROGRESS_MAX)
        };
        let last = self.phases.len() - 1;
        self.phases
            .iter()
            .enumerate()
            .position(|(idx, phase)| phase.contains(p, idx == last))
            .unwrap_or(last)
    }

    /// The phase whose range contains `progress`.
    pub fn phase_for_progress(&self, progress: f64) -> &PhaseDefinition {
        &self.phases[self.index_for_progress(progress)]
    }

    /// Sum of the nominal phase durations.
    pub fn total_nominal_duration_ms(&self) -> u64 {
        self.phases.iter().map(|p| p.nominal_duration_ms).sum()
    }

    pub fn phases(&self) -> &[PhaseDefinition] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always `false`; a validated table has at least one phase.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl<'de> Deserialize<'de> for PhaseTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let phases = Vec::<PhaseDefinition>::deserialize(deserializer)?;
        PhaseTable::new(phases).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
