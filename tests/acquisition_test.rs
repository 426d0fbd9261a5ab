#[cfg(test)]
mod acquisition_tests {
    use crabintrinsics::invariants::{contract_test, reset_invariant_log};
    use crabintrinsics::testing::{sample_distortion, sample_intrinsics, ScriptedPlatform, Step};
    use crabintrinsics::{
        AcquisitionConfig, AcquisitionOutcome, CalibrationCell, ConcurrencyPolicy, FailureKind,
        IntrinsicsAcquirer, SourceError,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn not_tracking(n: usize) -> Vec<Step> {
        vec![Step::NotTracking; n]
    }

    fn expect_failure(outcome: AcquisitionOutcome) -> crabintrinsics::AcquisitionError {
        match outcome {
            AcquisitionOutcome::Failure(e) => e,
            AcquisitionOutcome::Success(c) => panic!("expected failure, got {:?}", c),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_after_three_misses() {
        let platform = ScriptedPlatform::converging_after(3).with_distortion(sample_distortion());
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let started = Instant::now();
        let calibration = acquirer.get_intrinsics().await.into_result().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(calibration.focal_length, (1000.0, 1005.0));
        assert_eq!(calibration.principal_point, (640.0, 360.0));
        assert_eq!(calibration.image_dimensions, (1280, 720));
        assert_eq!(calibration.distortion_coefficients, vec![0.01, -0.02, 0.0, 0.0, 0.0]);

        assert_eq!(counters.polls(), 4);
        assert_eq!(counters.distortion_queries(), 1);
        assert_eq!(counters.closes(), 1);
        assert_eq!(counters.open_sessions(), 0);

        // 500ms warm-up + 3 intervals
        assert!(elapsed >= Duration::from_millis(800), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(900), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let platform = ScriptedPlatform::new(not_tracking(20));
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let started = Instant::now();
        let error = expect_failure(acquirer.get_intrinsics().await);
        let elapsed = started.elapsed();

        assert_eq!(error.kind, FailureKind::IntrinsicsUnavailable);
        assert_eq!(counters.polls(), 20);
        assert_eq!(counters.intrinsics_reads(), 0);
        assert_eq!(counters.distortion_queries(), 0);
        assert_eq!(counters.pauses(), 1);
        assert_eq!(counters.closes(), 1);

        // No sleep after the final poll
        let worst_case = AcquisitionConfig::default().worst_case_duration();
        assert_eq!(worst_case, Duration::from_millis(2400));
        assert!(elapsed >= worst_case, "elapsed {:?}", elapsed);
        assert!(elapsed < worst_case + Duration::from_millis(100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_polls_past_budget() {
        // Script would converge on poll 21; the budget stops at 20
        let platform = ScriptedPlatform::converging_after(20);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let error = expect_failure(acquirer.get_intrinsics().await);
        assert_eq!(error.kind, FailureKind::IntrinsicsUnavailable);
        assert_eq!(counters.polls(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_on_last_attempt_succeeds() {
        let platform = ScriptedPlatform::converging_after(19);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        assert!(acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.polls(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uses_intrinsics_from_confirming_poll() {
        let later = crabintrinsics::FrameIntrinsics::new((1.0, 1.0), (0.5, 0.5), (2, 2));
        let platform = ScriptedPlatform::new(vec![
            Step::Paused,
            Step::Tracking(sample_intrinsics()),
            Step::Tracking(later),
        ]);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let calibration = acquirer.get_intrinsics().await.into_result().unwrap();
        assert_eq!(calibration.image_dimensions, (1280, 720));
        assert_eq!(counters.polls(), 2);
        assert_eq!(counters.intrinsics_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_yet_available_consumes_an_attempt() {
        let platform = ScriptedPlatform::new(vec![
            Step::TrackingNotYetAvailable,
            Step::TrackingNotYetAvailable,
            Step::Tracking(sample_intrinsics()),
        ]);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        assert!(acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.polls(), 3);
        assert_eq!(counters.intrinsics_reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_yet_available_forever_times_out() {
        let platform = ScriptedPlatform::new(vec![Step::TrackingNotYetAvailable; 20]);
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let error = expect_failure(acquirer.get_intrinsics().await);
        assert_eq!(error.kind, FailureKind::IntrinsicsUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_fault_while_polling() {
        let platform = ScriptedPlatform::new(vec![
            Step::NotTracking,
            Step::Fault("sensor failure".to_string()),
            Step::Tracking(sample_intrinsics()),
        ]);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let error = expect_failure(acquirer.get_intrinsics().await);
        assert_eq!(error.kind, FailureKind::Unexpected);
        assert_eq!(
            error.cause,
            Some(SourceError::Platform("sensor failure".to_string()))
        );
        assert_eq!(counters.polls(), 2);
        assert_eq!(counters.closes(), 1);
        assert_eq!(counters.distortion_queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_skips_polling() {
        let platform = ScriptedPlatform::converging_after(0).fail_start("camera in use");
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let started = Instant::now();
        let error = expect_failure(acquirer.get_intrinsics().await);

        assert_eq!(error.kind, FailureKind::SessionStart);
        assert_eq!(counters.polls(), 0);
        assert_eq!(counters.pauses(), 0);
        assert_eq!(counters.closes(), 1);
        // No warm-up on a session that never started
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_reports_session_start() {
        let platform = ScriptedPlatform::converging_after(0)
            .fail_create(SourceError::PermissionDenied("camera".to_string()));
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let error = expect_failure(acquirer.get_intrinsics().await);
        assert_eq!(error.kind, FailureKind::SessionStart);
        assert_eq!(counters.creates(), 0);
        assert_eq!(counters.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_device() {
        let platform = ScriptedPlatform::converging_after(0).unsupported();
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let error = expect_failure(acquirer.get_intrinsics().await);
        assert_eq!(error.kind, FailureKind::SessionStart);
        assert!(matches!(error.cause, Some(SourceError::Unsupported(_))));
        assert_eq!(counters.creates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_served_from_cache() {
        let platform = ScriptedPlatform::converging_after(1).with_distortion(sample_distortion());
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let first = acquirer.get_intrinsics().await.into_result().unwrap();

        let started = Instant::now();
        let second = acquirer.get_intrinsics().await.into_result().unwrap();

        assert_eq!(first, second);
        assert_eq!(counters.creates(), 1);
        assert_eq!(counters.polls(), 2);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let mut steps = not_tracking(20);
        steps.push(Step::Tracking(sample_intrinsics()));
        let platform = ScriptedPlatform::new(steps);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        assert!(!acquirer.get_intrinsics().await.is_success());
        assert!(acquirer.cached_calibration().is_none());

        assert!(acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.creates(), 2);
        assert_eq!(acquirer.cached_calibration().unwrap().polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_distortion_is_empty() {
        let platform = ScriptedPlatform::converging_after(0);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let calibration = acquirer.get_intrinsics().await.into_result().unwrap();
        assert!(calibration.distortion_coefficients.is_empty());
        assert_eq!(counters.distortion_queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_errors_do_not_change_outcome() {
        let platform = ScriptedPlatform::converging_after(0).fail_teardown();
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        assert!(acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_budget() {
        let platform = ScriptedPlatform::new(vec![]);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            warm_up_ms: 50,
            poll_interval_ms: 10,
            max_attempts: 3,
            ..AcquisitionConfig::default()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);

        let started = Instant::now();
        assert!(!acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.polls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_policy_refuses_overlapping_call() {
        let platform = ScriptedPlatform::converging_after(2);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            concurrency: ConcurrencyPolicy::Reject,
            ..AcquisitionConfig::default()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);

        let (first, second) = futures::join!(acquirer.get_intrinsics(), acquirer.get_intrinsics());

        assert!(first.is_success());
        let error = expect_failure(second);
        assert_eq!(error.kind, FailureKind::AlreadyInProgress);
        assert_eq!(counters.creates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_acquisition_releases_session() {
        let platform = ScriptedPlatform::converging_after(0);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            concurrency: ConcurrencyPolicy::Reject,
            ..AcquisitionConfig::default()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);

        let mut first = tokio_test::task::spawn(acquirer.get_intrinsics());
        tokio_test::assert_pending!(first.poll());
        assert_eq!(counters.open_sessions(), 1);

        let mut second = tokio_test::task::spawn(acquirer.get_intrinsics());
        let outcome = tokio_test::assert_ready!(second.poll());
        assert_eq!(expect_failure(outcome).kind, FailureKind::AlreadyInProgress);

        // Cancelled during warm-up
        drop(first);
        assert_eq!(counters.polls(), 0);
        assert_eq!(counters.closes(), 1);
        assert_eq!(counters.open_sessions(), 0);

        assert!(acquirer.get_intrinsics().await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialize_policy_shares_one_session() {
        let platform = ScriptedPlatform::converging_after(2);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let (first, second) = futures::join!(acquirer.get_intrinsics(), acquirer.get_intrinsics());

        assert_eq!(first.into_result().unwrap(), second.into_result().unwrap());
        assert_eq!(counters.creates(), 1);
        assert_eq!(counters.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialized_caller_retries_after_failure() {
        let mut steps = not_tracking(20);
        steps.push(Step::Tracking(sample_intrinsics()));
        let platform = ScriptedPlatform::new(steps);
        let counters = platform.counters();
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());

        let (first, second) = futures::join!(acquirer.get_intrinsics(), acquirer.get_intrinsics());

        assert!(!first.is_success());
        assert!(second.is_success());
        assert_eq!(counters.creates(), 2);
        assert_eq!(counters.open_sessions(), 0);
    }

    fn acquirers_on_one_cell(
        platform: ScriptedPlatform,
        config: AcquisitionConfig,
    ) -> (
        IntrinsicsAcquirer<ScriptedPlatform>,
        IntrinsicsAcquirer<ScriptedPlatform>,
    ) {
        let platform = Arc::new(platform);
        let cell = Arc::new(CalibrationCell::new());
        (
            IntrinsicsAcquirer::with_cell(platform.clone(), config.clone(), cell.clone()),
            IntrinsicsAcquirer::with_cell(platform, config, cell),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquirers_on_one_cell_never_overlap_sessions() {
        let mut steps = not_tracking(20);
        steps.push(Step::Tracking(sample_intrinsics()));
        let platform = ScriptedPlatform::new(steps);
        let counters = platform.counters();
        let (a, b) = acquirers_on_one_cell(platform, AcquisitionConfig::default());

        let (first, second) = futures::join!(a.get_intrinsics(), b.get_intrinsics());

        assert!(!first.is_success());
        assert!(second.is_success());
        assert_eq!(counters.creates(), 2);
        assert_eq!(counters.peak_open_sessions(), 1);
        assert_eq!(counters.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquirers_on_one_cell_share_the_first_success() {
        let platform = ScriptedPlatform::converging_after(2);
        let counters = platform.counters();
        let (a, b) = acquirers_on_one_cell(platform, AcquisitionConfig::default());

        let (first, second) = futures::join!(a.get_intrinsics(), b.get_intrinsics());

        assert_eq!(first.into_result().unwrap(), second.into_result().unwrap());
        assert_eq!(counters.creates(), 1);
        assert_eq!(a.cached_calibration(), b.cached_calibration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_policy_spans_acquirers_on_one_cell() {
        let platform = ScriptedPlatform::converging_after(2);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            concurrency: ConcurrencyPolicy::Reject,
            ..AcquisitionConfig::default()
        };
        let (a, b) = acquirers_on_one_cell(platform, config);

        let (first, second) = futures::join!(a.get_intrinsics(), b.get_intrinsics());

        assert!(first.is_success());
        assert_eq!(expect_failure(second).kind, FailureKind::AlreadyInProgress);
        assert_eq!(counters.peak_open_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_budget_polls_once() {
        let platform = ScriptedPlatform::new(not_tracking(5));
        let counters = platform.counters();
        let config = AcquisitionConfig {
            max_attempts: 0,
            ..AcquisitionConfig::default()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);
        let started = Instant::now();

        let error = expect_failure(acquirer.get_intrinsics().await);

        assert_eq!(error.kind, FailureKind::IntrinsicsUnavailable);
        assert_eq!(counters.polls(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn contract_acquisition_invariants() {
        reset_invariant_log();

        let platform = ScriptedPlatform::converging_after(2);
        let acquirer = IntrinsicsAcquirer::new(platform, AcquisitionConfig::default());
        assert!(acquirer.get_intrinsics().await.is_success());

        contract_test(
            "acquisition",
            &[
                "poll index stays below max_attempts",
                "session is released before the outcome is returned",
            ],
        );
    }
}
