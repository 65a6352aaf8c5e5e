//! Stage Lifecycle Contract Tests
//!
//! These tests pin which stage statuses may be (re-)entered and which stage
//! gates which. Restarts, retries and concurrent triggers all rely on these
//! rules; they are what makes a second trigger harmless.
//!
//! **Problem**: Loosening a gate ("just rerun finished stages") looks like a
//! convenience and silently doubles compute cost or overwrites results
//! **Solution**: Contract tests that fail with clear explanation of what breaks

#[path = "../support/mod.rs"]
mod support;

use procycla_core::drivers::{InMemoryStore, SimulationStore};
use procycla_core::{BmpResult, Orchestrator, SimulationPatch, StageOutcome, StageStatus};
use std::sync::Arc;
use support::{bmp_response, plant_submission, prefeasibility_submission, seed, ScriptedComputeClient};

fn setup(bmp_reply: serde_json::Value) -> (Arc<InMemoryStore>, Arc<ScriptedComputeClient>, Orchestrator) {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedComputeClient::new(bmp_reply));
    let orchestrator = Orchestrator::new(store.clone(), client.clone(), "http://app.test", 2);
    (store, client, orchestrator)
}

/// WHY: Only pending and failed stages may start
/// REASON: running means someone else owns the stage; finished is final
/// BREAKS: Idempotent triggers and the single-owner guarantee
/// SACRIFICES: If this fails, concurrent triggers double-bill compute
#[test]
fn startable_statuses() {
    assert_eq!(StageStatus::STARTABLE, [StageStatus::Pending, StageStatus::Failed]);
    assert!(!StageStatus::Running.is_startable());
    assert!(!StageStatus::Finished.is_startable());
}

/// WHY: finished and failed are terminal; pending and running are not
/// REASON: CSTR may only look at BMP output once BMP has settled
/// BREAKS: CSTR reading a half-written BMP result
#[test]
fn terminal_statuses() {
    assert!(StageStatus::Finished.is_terminal());
    assert!(StageStatus::Failed.is_terminal());
    assert!(!StageStatus::Pending.is_terminal());
    assert!(!StageStatus::Running.is_terminal());
}

/// WHY: A finished pipeline is never rerun by another trigger
/// REASON: Results are user-visible and paid for
/// BREAKS: Result stability across repeated "start" clicks
#[tokio::test]
async fn finished_stages_are_never_rerun() {
    let (store, client, orchestrator) = setup(bmp_response(&[300.0]));
    let id = seed(store.as_ref(), plant_submission(), 1);

    orchestrator.run_pipeline(&id).await.unwrap();
    let first = store.require(&id).unwrap();

    let report = orchestrator.run_pipeline(&id).await.unwrap();
    let second = store.require(&id).unwrap();

    assert!(!report.bmp.was_attempted());
    assert!(!report.cstr.was_attempted());
    assert_eq!(client.bmp_calls(), 1);
    assert_eq!(client.cstr_calls(), 3);
    assert_eq!(first.bmp_result, second.bmp_result);
    assert_eq!(first.cstr_result, second.cstr_result);
}

/// WHY: A failed BMP stage leaves plant-operation CSTR untouched
/// REASON: Without fitted Bo/Kh there is nothing to simulate
/// BREAKS: CSTR pending vs failed distinction shown to the user
#[tokio::test]
async fn failed_bmp_gates_plant_cstr() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(ScriptedComputeClient::bmp_unavailable("Bad Gateway"));
    let orchestrator = Orchestrator::new(store.clone(), client.clone(), "http://app.test", 2);
    let id = seed(store.as_ref(), plant_submission(), 1);

    let report = orchestrator.run_pipeline(&id).await.unwrap();

    assert_eq!(report.bmp.status(), Some(StageStatus::Failed));
    assert!(matches!(report.cstr, StageOutcome::NotAttempted { .. }));

    let record = store.require(&id).unwrap();
    assert_eq!(record.bmp_result, Some(BmpResult::Error("Bad Gateway".to_string())));
    assert_eq!(record.cstr_status, StageStatus::Pending);
    assert_eq!(client.cstr_calls(), 0);
}

/// WHY: Non-plant simulations finish CSTR without any external call
/// REASON: Prefeasibility studies stop at BMP
/// BREAKS: "Complete" badge for prefeasibility simulations
#[tokio::test]
async fn prefeasibility_cstr_is_vacuous() {
    let (store, client, orchestrator) = setup(bmp_response(&[300.0]));
    let id = seed(store.as_ref(), prefeasibility_submission(), 1);

    orchestrator.run_pipeline(&id).await.unwrap();

    let record = store.require(&id).unwrap();
    assert_eq!(record.cstr_status, StageStatus::Finished);
    assert_eq!(record.cstr_result, None);
    assert_eq!(client.cstr_calls(), 0);
    assert_eq!(client.propagation_calls(), 0);
}

/// WHY: A stage someone else is running is left alone
/// REASON: The running owner will settle it; a second runner would race
/// BREAKS: Single-owner guarantee under overlapping triggers
#[tokio::test]
async fn running_stage_is_not_claimed_again() {
    let (store, client, orchestrator) = setup(bmp_response(&[300.0]));
    let id = seed(store.as_ref(), plant_submission(), 1);
    store
        .update(&id, &SimulationPatch::bmp(StageStatus::Running, None))
        .unwrap();

    let report = orchestrator.run_pipeline(&id).await.unwrap();

    assert!(!report.bmp.was_attempted());
    assert!(!report.cstr.was_attempted());
    assert_eq!(client.bmp_calls(), 0);
    assert_eq!(store.require(&id).unwrap().bmp_status, StageStatus::Running);
}
