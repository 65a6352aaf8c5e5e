//! Record Store Integration Tests
//!
//! Runs the same scenarios against every SimulationStore implementation:
//! - conditional transitions admit exactly one winner under contention
//! - partial updates never clobber fields they do not name
//! - deletion is observed as a missing record by later writers
//! - separate file-system handles on one directory (as `serve` and a CLI
//!   `start` would open) still admit exactly one claim
//!
//! Uses tempfile for isolation - NO /tmp pollution

#[path = "../support/mod.rs"]
mod support;

use procycla_core::drivers::{FileSystemStore, InMemoryStore, SimulationStore, TransitionOutcome};
use procycla_core::{BmpResult, SimulationPatch, Stage, StageStatus};
use std::sync::{Arc, Barrier};
use std::thread;
use support::{plant_submission, seed};
use tempfile::TempDir;

/// Every store under test, the TempDir kept alive alongside
fn stores() -> Vec<(&'static str, Arc<dyn SimulationStore>, Option<TempDir>)> {
    let temp = TempDir::new().unwrap();
    let memory: Arc<dyn SimulationStore> = Arc::new(InMemoryStore::new());
    let filesystem: Arc<dyn SimulationStore> = Arc::new(FileSystemStore::open(temp.path().join("data")).unwrap());
    vec![("memory", memory, None), ("filesystem", filesystem, Some(temp))]
}

#[test]
fn test_concurrent_claims_have_single_winner() {
    for (name, store, _guard) in stores() {
        let id = seed(store.as_ref(), plant_submission(), 1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                thread::spawn(move || {
                    store
                        .transition(
                            &id,
                            Stage::Bmp,
                            &StageStatus::STARTABLE,
                            &SimulationPatch::bmp(StageStatus::Running, None),
                        )
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<TransitionOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes.iter().filter(|o| o.is_applied()).count();

        assert_eq!(winners, 1, "{} store admitted {} claims", name, winners);
        assert!(outcomes
            .iter()
            .filter(|o| !o.is_applied())
            .all(|o| *o == TransitionOutcome::Rejected { actual: StageStatus::Running }));
    }
}

#[test]
fn test_progress_write_survives_stage_settle() {
    for (name, store, _guard) in stores() {
        let id = seed(store.as_ref(), plant_submission(), 1);

        store
            .update(&id, &SimulationPatch::cstr(StageStatus::Running, None))
            .unwrap();
        store.update(&id, &SimulationPatch::progress(66.6)).unwrap();
        store
            .update(
                &id,
                &SimulationPatch::bmp(StageStatus::Finished, Some(BmpResult::Error("n/a".to_string()))),
            )
            .unwrap();

        let record = store.require(&id).unwrap();
        assert_eq!(record.cstr_progress, Some(66.6), "{} store lost progress", name);
        assert_eq!(record.cstr_status, StageStatus::Running);
        assert_eq!(record.bmp_status, StageStatus::Finished);
    }
}

#[test]
fn test_settle_after_delete_reports_not_found() {
    for (name, store, _guard) in stores() {
        let id = seed(store.as_ref(), plant_submission(), 1);
        store
            .transition(
                &id,
                Stage::Cstr,
                &StageStatus::STARTABLE,
                &SimulationPatch::cstr(StageStatus::Running, None),
            )
            .unwrap();

        assert!(store.delete(&id).unwrap());
        let outcome = store
            .transition(
                &id,
                Stage::Cstr,
                &[StageStatus::Running],
                &SimulationPatch::cstr(StageStatus::Finished, None),
            )
            .unwrap();

        assert_eq!(outcome, TransitionOutcome::NotFound, "{} store", name);
        assert!(store.update(&id, &SimulationPatch::progress(10.0)).unwrap().is_none());
    }
}

#[test]
fn test_list_is_ordered_by_creation() {
    for (name, store, _guard) in stores() {
        let first = seed(store.as_ref(), plant_submission(), 1);
        thread::sleep(std::time::Duration::from_millis(5));
        let second = seed(store.as_ref(), plant_submission(), 1);

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second], "{} store", name);
    }
}

#[test]
fn test_updated_at_advances() {
    for (_name, store, _guard) in stores() {
        let id = seed(store.as_ref(), plant_submission(), 1);
        let created = store.require(&id).unwrap();
        thread::sleep(std::time::Duration::from_millis(5));

        let updated = store
            .update_existing(&id, &SimulationPatch::progress(1.0))
            .unwrap();

        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }
}

#[test]
fn test_separate_handles_admit_single_claim() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    let racers = 4;

    for round in 0..200 {
        let seeder = FileSystemStore::open(data_dir.clone()).unwrap();
        let id = seed(&seeder, plant_submission(), 1);
        let barrier = Arc::new(Barrier::new(racers));

        let handles: Vec<_> = (0..racers)
            .map(|_| {
                let store = FileSystemStore::open(data_dir.clone()).unwrap();
                let barrier = barrier.clone();
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.transition(
                        &id,
                        Stage::Bmp,
                        &StageStatus::STARTABLE,
                        &SimulationPatch::bmp(StageStatus::Running, None),
                    )
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let errors: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().err()).collect();
        assert!(errors.is_empty(), "round {}: claim errors {:?}", round, errors);

        let winners = outcomes
            .iter()
            .filter(|o| o.as_ref().map(|o| o.is_applied()).unwrap_or(false))
            .count();
        assert_eq!(winners, 1, "round {}: {} handles claimed the stage", round, winners);
    }
}

#[test]
fn test_separate_handles_do_not_lose_writes() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");

    for round in 0..100 {
        let settler = FileSystemStore::open(data_dir.clone()).unwrap();
        let reporter = FileSystemStore::open(data_dir.clone()).unwrap();
        let id = seed(&settler, plant_submission(), 1);
        settler
            .update(&id, &SimulationPatch::cstr(StageStatus::Running, None))
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let progress = {
            let barrier = barrier.clone();
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                reporter.update_existing(&id, &SimulationPatch::progress(42.0)).map(|_| ())
            })
        };
        let settle = {
            let id = id.clone();
            let store = FileSystemStore::open(data_dir.clone()).unwrap();
            thread::spawn(move || {
                barrier.wait();
                store
                    .transition(
                        &id,
                        Stage::Bmp,
                        &StageStatus::STARTABLE,
                        &SimulationPatch::bmp(StageStatus::Finished, Some(BmpResult::Error("n/a".to_string()))),
                    )
                    .map(|_| ())
            })
        };
        progress.join().unwrap().unwrap();
        settle.join().unwrap().unwrap();

        let record = settler.require(&id).unwrap();
        assert_eq!(record.cstr_progress, Some(42.0), "round {}: progress lost", round);
        assert_eq!(record.bmp_status, StageStatus::Finished, "round {}: settle lost", round);
    }
}
