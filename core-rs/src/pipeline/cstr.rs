//! CSTR fan-out runner
//!
//! For `plant_operation` simulations, each substrate BMP fitted successfully
//! gets three concurrent variant runs followed by one uncertainty
//! propagation. Substrates are independent: one failing substrate only
//! marks its own slot in the result.
//!
//! Other simulation types finish the stage immediately with a null result.

use super::StageOutcome;
use crate::codec::{
    BmpResponse, BmpSubstrate, CstrResult, CstrRunRequest, PlantOperation, Submission, SubstrateOutcome,
    Uncertainty, UncertaintyRequest,
};
use crate::drivers::{blocking, ComputeClient, SimulationStore, TransitionOutcome};
use crate::errors::{Result, SimError};
use crate::model::{SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CstrFanoutRunner {
    store: Arc<dyn SimulationStore>,
    client: Arc<dyn ComputeClient>,
    app_url: String,
    substrate_concurrency: usize,
}

/// Everything one substrate task needs, owned so it can be spawned
#[derive(Clone)]
struct SubstrateJob {
    client: Arc<dyn ComputeClient>,
    plant: PlantOperation,
    simulation_id: SimulationId,
    substrate_count: usize,
    app_url: String,
}

impl CstrFanoutRunner {
    pub fn new(
        store: Arc<dyn SimulationStore>,
        client: Arc<dyn ComputeClient>,
        app_url: &str,
        substrate_concurrency: usize,
    ) -> Self {
        Self {
            store,
            client,
            app_url: app_url.to_string(),
            substrate_concurrency: substrate_concurrency.max(1),
        }
    }

    /// Run the CSTR stage if BMP has settled and the stage is startable
    pub async fn run(&self, id: &SimulationId) -> Result<StageOutcome> {
        let owned = id.clone();
        let record = blocking(&self.store, move |store| store.require(&owned)).await?;

        if !record.bmp_status.is_terminal() {
            return Ok(StageOutcome::not_attempted(format!("bmp is {}", record.bmp_status)));
        }
        if !record.cstr_status.is_startable() {
            return Ok(StageOutcome::not_attempted(format!("cstr is {}", record.cstr_status)));
        }

        let submission = match Submission::parse(&record.submit_data) {
            Ok(submission) => submission,
            Err(e) => return self.fail_before_start(id, e).await,
        };

        let Some(plant) = submission.plant_operation().cloned() else {
            // Nothing to simulate: the stage completes vacuously.
            let patch = SimulationPatch::cstr(StageStatus::Finished, None).with_progress(None);
            return self.claim_and_settle(id, patch, StageStatus::Finished).await;
        };

        if record.bmp_status == StageStatus::Failed {
            return Ok(StageOutcome::not_attempted("bmp failed; no parameters to simulate"));
        }

        let bmp = match usable_bmp(&record) {
            Ok(bmp) => bmp,
            Err(e) => return self.fail_before_start(id, e).await,
        };

        let claim = SimulationPatch::cstr(StageStatus::Running, None).with_progress(Some(0.0));
        let owned = id.clone();
        let claimed = blocking(&self.store, move |store| {
            store.transition(&owned, Stage::Cstr, &StageStatus::STARTABLE, &claim)
        })
        .await?;
        match claimed {
            TransitionOutcome::Applied(_) => {}
            TransitionOutcome::Rejected { actual } => {
                return Ok(StageOutcome::not_attempted(format!("cstr is {}", actual)));
            }
            TransitionOutcome::NotFound => return Err(SimError::RecordGone(id.to_string())),
        }
        info!(
            simulation_id = %id,
            stage = "cstr",
            substrates = bmp.substrates.len(),
            "stage running"
        );

        let outcomes = self.fan_out(id, plant, bmp.substrates).await;
        let (status, result) = summarize(id, outcomes);

        let mut patch = SimulationPatch::cstr(status, Some(result));
        if status == StageStatus::Finished {
            patch = patch.with_progress(Some(100.0));
        }
        self.settle(id, patch, status).await
    }

    async fn fan_out(
        &self,
        id: &SimulationId,
        plant: PlantOperation,
        substrates: Vec<BmpSubstrate>,
    ) -> Vec<SubstrateOutcome> {
        let job = SubstrateJob {
            client: self.client.clone(),
            plant,
            simulation_id: id.clone(),
            substrate_count: substrates.len(),
            app_url: self.app_url.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(self.substrate_concurrency));

        let mut handles = Vec::with_capacity(substrates.len());
        for (index, substrate) in substrates.into_iter().enumerate() {
            let job = job.clone();
            let semaphore = semaphore.clone();
            let name = substrate.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                job.run(index, substrate).await
            });
            handles.push((index, name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, name, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| SubstrateOutcome::Failed {
                index,
                name,
                errors: vec![format!("substrate task aborted: {}", e)],
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Conditional `startable -> status` write without a running phase
    async fn claim_and_settle(&self, id: &SimulationId, patch: SimulationPatch, status: StageStatus) -> Result<StageOutcome> {
        let owned = id.clone();
        let outcome = blocking(&self.store, move |store| {
            store.transition(&owned, Stage::Cstr, &StageStatus::STARTABLE, &patch)
        })
        .await?;
        match outcome {
            TransitionOutcome::Applied(_) => {
                info!(simulation_id = %id, stage = "cstr", status = %status, "stage settled");
                Ok(StageOutcome::settled(status))
            }
            TransitionOutcome::Rejected { actual } => {
                Ok(StageOutcome::not_attempted(format!("cstr is {}", actual)))
            }
            TransitionOutcome::NotFound => Err(SimError::RecordGone(id.to_string())),
        }
    }

    async fn fail_before_start(&self, id: &SimulationId, error: SimError) -> Result<StageOutcome> {
        warn!(simulation_id = %id, stage = "cstr", error = %error, "cannot start stage");
        let patch = SimulationPatch::cstr(StageStatus::Failed, Some(CstrResult::Error(error.stage_text())));
        self.claim_and_settle(id, patch, StageStatus::Failed).await
    }

    async fn settle(&self, id: &SimulationId, patch: SimulationPatch, status: StageStatus) -> Result<StageOutcome> {
        let owned = id.clone();
        let settled = blocking(&self.store, move |store| {
            store.transition(&owned, Stage::Cstr, &[StageStatus::Running], &patch)
        })
        .await?;
        match settled {
            TransitionOutcome::Applied(_) => {
                info!(simulation_id = %id, stage = "cstr", status = %status, "stage settled");
                Ok(StageOutcome::settled(status))
            }
            TransitionOutcome::Rejected { actual } => Err(SimError::InvalidTransition(format!(
                "cstr of {} moved to {} while running",
                id, actual
            ))),
            TransitionOutcome::NotFound => Err(SimError::RecordGone(id.to_string())),
        }
    }
}

impl SubstrateJob {
    async fn run(&self, index: usize, substrate: BmpSubstrate) -> SubstrateOutcome {
        let name = substrate.name.clone();

        if !substrate.is_usable() {
            debug!(simulation_id = %self.simulation_id, substrate_index = index, "skipping substrate BMP marked failed");
            return SubstrateOutcome::Skipped {
                index,
                name,
                reason: format!("BMP fit failed with status_code {}", substrate.status_code),
            };
        }

        match self.simulate(index, &substrate).await {
            Ok(outcome) => outcome,
            Err(errors) => {
                warn!(
                    simulation_id = %self.simulation_id,
                    substrate_index = index,
                    errors = ?errors,
                    "substrate failed"
                );
                SubstrateOutcome::Failed { index, name, errors }
            }
        }
    }

    async fn simulate(&self, index: usize, substrate: &BmpSubstrate) -> std::result::Result<SubstrateOutcome, Vec<String>> {
        let single = |e: SimError| vec![e.stage_text()];

        let [baseline, bo, kh] = CstrRunRequest::variants(
            &self.plant,
            substrate,
            &self.simulation_id,
            index,
            self.substrate_count,
            &self.app_url,
        )
        .map_err(single)?;

        let (baseline, bo, kh) = tokio::join!(
            self.client.run_cstr(&baseline),
            self.client.run_cstr(&bo),
            self.client.run_cstr(&kh),
        );

        let runs = match (baseline, bo, kh) {
            (Ok(baseline), Ok(bo), Ok(kh)) => [baseline, bo, kh],
            (baseline, bo, kh) => {
                let errors = [baseline.err(), bo.err(), kh.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.stage_text())
                    .collect();
                return Err(errors);
            }
        };

        for (variant, run) in Uncertainty::ALL.iter().zip(runs.iter()) {
            if let Some(code) = run.status_code.filter(|code| *code != 0) {
                warn!(
                    simulation_id = %self.simulation_id,
                    substrate_index = index,
                    variant = %variant,
                    status_code = code,
                    "CSTR run reported a non-zero status code"
                );
            }
        }

        let request = UncertaintyRequest::build(substrate, &runs).map_err(single)?;
        let propagation = self
            .client
            .propagate_uncertainty(&request)
            .await
            .map_err(single)?;

        debug!(simulation_id = %self.simulation_id, substrate_index = index, "substrate completed");
        Ok(SubstrateOutcome::completed(index, &substrate.name, propagation, runs[0].energy()))
    }
}

/// BMP response a plant-operation CSTR run can work from
fn usable_bmp(record: &SimulationRecord) -> Result<BmpResponse> {
    let response = record
        .bmp_result
        .as_ref()
        .and_then(|result| result.response())
        .ok_or_else(|| SimError::MalformedInput("BMP result is not a BMP response".to_string()))?;

    if response.substrates.is_empty() {
        return Err(SimError::MalformedInput("BMP result contains no substrates".to_string()));
    }
    Ok(response.clone())
}

/// Terminal status and result for a finished fan-out
fn summarize(id: &SimulationId, outcomes: Vec<SubstrateOutcome>) -> (StageStatus, CstrResult) {
    let completed = outcomes.iter().filter(|o| o.is_completed()).count();

    if completed == 0 {
        let mut messages: Vec<String> = outcomes.iter().flat_map(|o| o.errors().iter().cloned()).collect();
        if messages.is_empty() {
            messages = outcomes
                .iter()
                .filter_map(|o| match o {
                    SubstrateOutcome::Skipped { reason, .. } => Some(reason.clone()),
                    _ => None,
                })
                .collect();
        }
        if messages.is_empty() {
            messages.push("no substrate produced a result".to_string());
        }
        return (StageStatus::Failed, CstrResult::Error(messages.join(", ")));
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, SubstrateOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        let partial = SimError::PartialSubstrateFailure(format!(
            "{} of {} substrates failed",
            failed,
            outcomes.len()
        ));
        warn!(simulation_id = %id, stage = "cstr", error = %partial, "finishing with partial results");
    }

    (StageStatus::Finished, CstrResult::Substrates(outcomes))
}
