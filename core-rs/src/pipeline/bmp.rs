//! BMP stage runner
//!
//! Preconditions: `load_data_status == finished` and `bmp_status` is
//! `pending` or `failed`. Exactly two writes per attempt: `running`, then
//! the terminal status with its result.

use super::StageOutcome;
use crate::codec::{BmpRequest, BmpResponse, BmpResult, LoadDataResult, Submission};
use crate::drivers::{blocking, ComputeClient, SimulationStore, TransitionOutcome};
use crate::errors::{Result, SimError};
use crate::model::{SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct BmpStageRunner {
    store: Arc<dyn SimulationStore>,
    client: Arc<dyn ComputeClient>,
}

impl BmpStageRunner {
    pub fn new(store: Arc<dyn SimulationStore>, client: Arc<dyn ComputeClient>) -> Self {
        Self { store, client }
    }

    /// Run the BMP stage if it is startable
    ///
    /// Stage failures are persisted, not returned. Errors are reserved for
    /// store failures and [`SimError::RecordGone`].
    pub async fn run(&self, id: &SimulationId) -> Result<StageOutcome> {
        let owned = id.clone();
        let record = blocking(&self.store, move |store| store.require(&owned)).await?;

        if record.load_data_status != StageStatus::Finished {
            return Ok(StageOutcome::not_attempted(format!(
                "load data is {}",
                record.load_data_status
            )));
        }
        if !record.bmp_status.is_startable() {
            return Ok(StageOutcome::not_attempted(format!("bmp is {}", record.bmp_status)));
        }

        let claim = SimulationPatch::bmp(StageStatus::Running, None);
        let owned = id.clone();
        let claimed = blocking(&self.store, move |store| {
            store.transition(&owned, Stage::Bmp, &StageStatus::STARTABLE, &claim)
        })
        .await?;
        let record = match claimed {
            TransitionOutcome::Applied(record) => record,
            TransitionOutcome::Rejected { actual } => {
                return Ok(StageOutcome::not_attempted(format!("bmp is {}", actual)));
            }
            TransitionOutcome::NotFound => return Err(SimError::RecordGone(id.to_string())),
        };
        info!(simulation_id = %id, stage = "bmp", "stage running");

        let (status, result) = match self.compute(&record).await {
            Ok(response) if response.is_success() => (StageStatus::Finished, BmpResult::Response(response)),
            Ok(response) => {
                let failure = SimError::ComputeFailure(format!("status_code {}", response.status_code));
                warn!(simulation_id = %id, stage = "bmp", error = %failure, "BMP fit failed");
                (StageStatus::Failed, BmpResult::Response(response))
            }
            Err(e) => {
                warn!(simulation_id = %id, stage = "bmp", error = %e, "BMP call failed");
                (StageStatus::Failed, BmpResult::Error(e.stage_text()))
            }
        };

        self.settle(id, status, result).await
    }

    async fn compute(&self, record: &SimulationRecord) -> Result<BmpResponse> {
        let submission = Submission::parse(&record.submit_data)?;
        let raw_load = record
            .load_data_result
            .as_ref()
            .ok_or_else(|| SimError::MalformedInput("load_data_result is missing".to_string()))?;
        let load_data = LoadDataResult::parse(raw_load)?;

        let request = BmpRequest::build(&submission, &load_data);
        self.client.run_bmp(&request).await
    }

    async fn settle(&self, id: &SimulationId, status: StageStatus, result: BmpResult) -> Result<StageOutcome> {
        let patch = SimulationPatch::bmp(status, Some(result));
        let owned = id.clone();
        let settled = blocking(&self.store, move |store| {
            store.transition(&owned, Stage::Bmp, &[StageStatus::Running], &patch)
        })
        .await?;
        match settled {
            TransitionOutcome::Applied(_) => {
                info!(simulation_id = %id, stage = "bmp", status = %status, "stage settled");
                Ok(StageOutcome::settled(status))
            }
            TransitionOutcome::Rejected { actual } => Err(SimError::InvalidTransition(format!(
                "bmp of {} moved to {} while running",
                id, actual
            ))),
            TransitionOutcome::NotFound => Err(SimError::RecordGone(id.to_string())),
        }
    }
}
