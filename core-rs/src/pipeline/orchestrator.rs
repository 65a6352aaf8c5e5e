//! Pipeline driver
//!
//! `start` validates the trigger, then hands the simulation to a detached
//! task and returns. The task runs BMP, then CSTR; each runner decides from
//! the stored stage statuses whether it has work to do, so re-triggering a
//! simulation only ever resumes what is not yet finished.
//!
//! The detached task is the error boundary: whatever reaches it is logged
//! and dropped. Callers learn the outcome by polling the record.

use super::recovery::{release_all_interrupted, release_interrupted};
use super::{BmpStageRunner, CstrFanoutRunner, ProgressReporter, StageOutcome};
use crate::config::OrchestratorConfig;
use crate::drivers::{blocking, ComputeClient, SimulationStore};
use crate::errors::{Result, SimError};
use crate::model::{SimulationId, Stage, StageStatus};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What one pipeline pass did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub simulation_id: SimulationId,
    pub bmp: StageOutcome,
    pub cstr: StageOutcome,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn SimulationStore>,
    bmp: BmpStageRunner,
    cstr: CstrFanoutRunner,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SimulationStore>,
        client: Arc<dyn ComputeClient>,
        app_url: &str,
        substrate_concurrency: usize,
    ) -> Self {
        Self {
            bmp: BmpStageRunner::new(store.clone(), client.clone()),
            cstr: CstrFanoutRunner::new(store.clone(), client, app_url, substrate_concurrency),
            store,
        }
    }

    pub fn from_config(
        store: Arc<dyn SimulationStore>,
        client: Arc<dyn ComputeClient>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self::new(store, client, &config.app_url, config.substrate_concurrency)
    }

    pub fn store(&self) -> &Arc<dyn SimulationStore> {
        &self.store
    }

    /// Reporter sharing this orchestrator's store
    pub fn progress_reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.store.clone())
    }

    /// Accept a trigger and drive the pipeline in the background
    ///
    /// Refuses with [`SimError::RecordGone`] when the record does not exist
    /// and [`SimError::NotReady`] while load data is not finished. Once
    /// accepted, nothing is reported back through the handle except the
    /// pass summary; stage failures live in the record.
    pub fn start(&self, id: &SimulationId) -> Result<JoinHandle<Option<PipelineReport>>> {
        let record = self.store.require(id)?;
        if record.load_data_status != StageStatus::Finished {
            return Err(SimError::NotReady(format!(
                "load data of {} is {}",
                id, record.load_data_status
            )));
        }

        info!(simulation_id = %id, "pipeline accepted");
        let this = self.clone();
        let id = id.clone();
        Ok(tokio::spawn(async move { this.drive(id).await }))
    }

    async fn drive(self, id: SimulationId) -> Option<PipelineReport> {
        match self.run_pipeline(&id).await {
            Ok(report) => {
                info!(
                    simulation_id = %id,
                    bmp = ?report.bmp.status(),
                    cstr = ?report.cstr.status(),
                    "pipeline pass complete"
                );
                Some(report)
            }
            Err(e) if e.is_record_gone() => {
                warn!(simulation_id = %id, error = %e, "record deleted mid-pipeline, dropping");
                None
            }
            Err(e) => {
                error!(simulation_id = %id, error = %e, "pipeline aborted");
                None
            }
        }
    }

    /// Fail the `running` stages of `id` so the next trigger retries them
    ///
    /// Only for records no live process is driving.
    pub async fn reset_interrupted(&self, id: &SimulationId) -> Result<Vec<Stage>> {
        let owned = id.clone();
        blocking(&self.store, move |store| release_interrupted(store, &owned)).await
    }

    /// [`Orchestrator::reset_interrupted`] for every record in the store
    pub async fn recover_interrupted(&self) -> Result<Vec<(SimulationId, Vec<Stage>)>> {
        let released = blocking(&self.store, |store| release_all_interrupted(store)).await?;
        if !released.is_empty() {
            info!(records = released.len(), "released interrupted stages");
        }
        Ok(released)
    }

    /// One pass over both stages, in the caller's task
    pub async fn run_pipeline(&self, id: &SimulationId) -> Result<PipelineReport> {
        let bmp = self.bmp.run(id).await?;
        let cstr = self.cstr.run(id).await?;
        Ok(PipelineReport {
            simulation_id: id.clone(),
            bmp,
            cstr,
        })
    }
}
