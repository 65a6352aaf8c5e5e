//! Recovery of stages orphaned by a dead process
//!
//! A claimed stage is `running` until its owner settles it. If the owning
//! process is killed in between, nothing else will ever settle it and
//! `running` is not startable. Releasing moves such a stage to `failed`
//! with an "interrupted" result, which the next trigger retries.
//!
//! Releasing is only safe when no live process is driving the simulation:
//! at `serve` startup with `--recover-interrupted`, or by hand through
//! `procycla reset`.

use crate::codec::{BmpResult, CstrResult};
use crate::drivers::{SimulationStore, TransitionOutcome};
use crate::errors::{Result, SimError};
use crate::model::{SimulationId, SimulationPatch, Stage, StageStatus};
use tracing::warn;

/// Result text stored on a released stage
pub const INTERRUPTED: &str = "interrupted before the stage settled";

/// Release every `running` stage of one record, returning the stages released
pub fn release_interrupted(store: &dyn SimulationStore, id: &SimulationId) -> Result<Vec<Stage>> {
    let mut released = Vec::new();

    for stage in [Stage::Bmp, Stage::Cstr] {
        let patch = match stage {
            Stage::Bmp => SimulationPatch::bmp(StageStatus::Failed, Some(BmpResult::Error(INTERRUPTED.to_string()))),
            Stage::Cstr => {
                SimulationPatch::cstr(StageStatus::Failed, Some(CstrResult::Error(INTERRUPTED.to_string())))
            }
        };

        match store.transition(id, stage, &[StageStatus::Running], &patch)? {
            TransitionOutcome::Applied(_) => {
                warn!(simulation_id = %id, stage = %stage, "released interrupted stage");
                released.push(stage);
            }
            TransitionOutcome::Rejected { .. } => {}
            TransitionOutcome::NotFound => return Err(SimError::RecordGone(id.to_string())),
        }
    }

    Ok(released)
}

/// Release interrupted stages across the whole store
pub fn release_all_interrupted(store: &dyn SimulationStore) -> Result<Vec<(SimulationId, Vec<Stage>)>> {
    let mut released = Vec::new();

    for record in store.list()? {
        if record.bmp_status != StageStatus::Running && record.cstr_status != StageStatus::Running {
            continue;
        }
        match release_interrupted(store, &record.id) {
            Ok(stages) if stages.is_empty() => {}
            Ok(stages) => released.push((record.id, stages)),
            // Deleted since the listing; nothing left to release.
            Err(e) if e.is_record_gone() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(released)
}
