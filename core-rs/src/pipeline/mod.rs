//! Pipeline runners
//!
//! - [`BmpStageRunner`]: one BMP call per simulation
//! - [`CstrFanoutRunner`]: three CSTR runs plus one propagation per substrate
//! - [`ProgressReporter`]: applies progress callbacks from the CSTR service
//! - [`Orchestrator`]: drives both stages in a detached task
//!
//! Every runner claims its stage with a conditional `pending|failed ->
//! running` transition before doing any external work, and writes the
//! terminal state with a conditional `running -> finished|failed`.

mod bmp;
mod cstr;
mod progress;
mod orchestrator;
mod recovery;

pub use bmp::BmpStageRunner;
pub use cstr::CstrFanoutRunner;
pub use progress::ProgressReporter;
pub use orchestrator::{Orchestrator, PipelineReport};
pub use recovery::{release_all_interrupted, release_interrupted, INTERRUPTED};

use crate::model::StageStatus;
use serde::Serialize;

/// What a runner did with its stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Preconditions not met (or another run holds the stage); nothing written
    NotAttempted { reason: String },
    /// Stage reached this status in this run
    Settled { status: StageStatus },
}

impl StageOutcome {
    pub fn not_attempted(reason: impl Into<String>) -> Self {
        StageOutcome::NotAttempted { reason: reason.into() }
    }

    pub fn settled(status: StageStatus) -> Self {
        StageOutcome::Settled { status }
    }

    /// Status written by this run, if any
    pub fn status(&self) -> Option<StageStatus> {
        match self {
            StageOutcome::Settled { status } => Some(*status),
            StageOutcome::NotAttempted { .. } => None,
        }
    }

    pub fn was_attempted(&self) -> bool {
        matches!(self, StageOutcome::Settled { .. })
    }
}
