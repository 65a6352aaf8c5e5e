//! Progress Contract Tests
//!
//! These tests pin the progress callback protocol shared with the CSTR
//! service. The service builds nothing itself: it calls back the URL we hand
//! it, so the URL shape and the percentage formula are a wire contract.
//!
//! **Problem**: "simplifying" the formula or renaming a query parameter
//! silently breaks every in-flight CSTR run
//! **Solution**: Contract tests that fail with clear explanation of what breaks

use procycla_core::codec::{progress_fraction, VARIANTS_PER_SUBSTRATE};
use procycla_core::{ProgressTicket, SimulationId};

fn ticket(i: usize, n: usize, k: usize) -> ProgressTicket {
    ProgressTicket {
        simulation_id: SimulationId::from("sim-1"),
        substrate_index: i,
        substrate_count: n,
        variant_index: k,
    }
}

/// WHY: progress = (i*100 + k*100/3) / N
/// REASON: Each substrate owns 100/N percent, each variant a third of that
/// BREAKS: Progress bars in the web client
/// SACRIFICES: If this fails, displayed progress no longer matches work done
#[test]
fn progress_formula_reference_values() {
    let after_first_substrate_last_variant = progress_fraction(0, 2, 2);
    assert!((after_first_substrate_last_variant - 33.33).abs() < 0.01);

    assert_eq!(progress_fraction(1, 2, 0), 50.0);
    assert_eq!(progress_fraction(0, 4, 0), 0.0);
    assert_eq!(progress_fraction(3, 4, 0), 75.0);
}

/// WHY: Three variants per substrate (off, bo, kh)
/// REASON: Uncertainty propagation needs baseline plus one run per parameter
/// BREAKS: Progress denominators and the propagation request
#[test]
fn three_variants_per_substrate() {
    assert_eq!(VARIANTS_PER_SUBSTRATE, 3);
}

/// WHY: Well-ordered callbacks never move progress backwards
/// REASON: Callbacks arrive in (substrate, variant) order for a sequential run
/// BREAKS: Monotonic progress display
#[test]
fn progress_is_monotonic_in_delivery_order() {
    for n in 1..=6 {
        let mut last = -1.0;
        for i in 0..n {
            for k in 0..VARIANTS_PER_SUBSTRATE {
                let value = ticket(i, n, k).fraction().unwrap();
                assert!(value > last, "n={} i={} k={} went from {} to {}", n, i, k, last, value);
                assert!(value < 100.0);
                last = value;
            }
        }
    }
}

/// WHY: Callback query uses simulation_id, substrate_index, length, index
/// REASON: The CSTR service and older deployments post back these names
/// BREAKS: Every progress callback (400 from the webhook)
/// SACRIFICES: If this fails, in-flight runs stop reporting progress
#[test]
fn callback_url_query_names() {
    let url = ticket(2, 5, 1).url("https://app.procycla.com").unwrap();
    assert_eq!(
        url,
        "https://app.procycla.com/simulation/progress?simulation_id=sim-1&substrate_index=2&length=5&index=1"
    );
}

/// WHY: Tickets that cannot come from a real run are rejected
/// REASON: A forged or corrupted callback must not store progress above 100
/// BREAKS: The [0, 100) range of cstr_progress
#[test]
fn out_of_range_tickets_rejected() {
    assert!(ticket(0, 0, 0).fraction().is_err());
    assert!(ticket(5, 5, 0).fraction().is_err());
    assert!(ticket(0, 1, VARIANTS_PER_SUBSTRATE).fraction().is_err());
}
