//! Property-based tests for the intrinsics acquisition protocol
//!
//! Random tracking scripts are run against a paused clock, so every case
//! completes instantly regardless of the configured delays.
//!
//! Run with: cargo test --test acquisition_props

use crabintrinsics::testing::{sample_intrinsics, ScriptedPlatform, Step};
use crabintrinsics::{AcquisitionConfig, AcquisitionOutcome, FailureKind, IntrinsicsAcquirer};
use proptest::prelude::*;

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::NotTracking),
        1 => Just(Step::Paused),
        1 => Just(Step::TrackingNotYetAvailable),
        1 => Just(Step::Tracking(sample_intrinsics())),
    ]
}

fn run(steps: Vec<Step>, config: AcquisitionConfig) -> (AcquisitionOutcome, usize, usize) {
    let platform = ScriptedPlatform::new(steps);
    let counters = platform.counters();
    let acquirer = IntrinsicsAcquirer::new(platform, config);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let outcome = rt.block_on(acquirer.get_intrinsics());
    (outcome, counters.polls(), counters.closes())
}

proptest! {
    /// A script that never tracks uses exactly the attempt budget
    #[test]
    fn never_tracking_polls_exactly_max_attempts(
        max_attempts in 1u32..40,
        misses in 0usize..60,
    ) {
        let config = AcquisitionConfig { max_attempts, ..AcquisitionConfig::default() };
        let (outcome, polls, closes) = run(vec![Step::NotTracking; misses], config);

        match outcome {
            AcquisitionOutcome::Failure(e) => prop_assert_eq!(e.kind, FailureKind::IntrinsicsUnavailable),
            AcquisitionOutcome::Success(_) => prop_assert!(false, "no script step reports tracking"),
        }
        prop_assert_eq!(polls, max_attempts as usize);
        prop_assert_eq!(closes, 1);
    }

    /// Tracking on poll k stops the protocol at exactly k polls
    #[test]
    fn confirmation_stops_polling(k in 1usize..=20) {
        let mut steps = vec![Step::NotTracking; k - 1];
        steps.push(Step::Tracking(sample_intrinsics()));
        let (outcome, polls, closes) = run(steps, AcquisitionConfig::default());

        prop_assert!(outcome.is_success());
        prop_assert_eq!(polls, k);
        prop_assert_eq!(closes, 1);
    }

    /// Outcome is decided by the first converged frame within budget
    #[test]
    fn outcome_follows_first_tracked_frame(
        steps in prop::collection::vec(step_strategy(), 0..30),
        max_attempts in 1u32..25,
    ) {
        let first_tracked = steps
            .iter()
            .position(|s| matches!(s, Step::Tracking(_)))
            .filter(|&i| i < max_attempts as usize);

        let config = AcquisitionConfig { max_attempts, ..AcquisitionConfig::default() };
        let (outcome, polls, closes) = run(steps, config);

        match first_tracked {
            Some(index) => {
                prop_assert!(outcome.is_success());
                prop_assert_eq!(polls, index + 1);
            }
            None => {
                prop_assert!(!outcome.is_success());
                prop_assert_eq!(polls, max_attempts as usize);
            }
        }
        prop_assert_eq!(closes, 1);
    }
}
