//! Intrinsics acquisition protocol
//!
//! `Starting -> Polling -> {Confirmed, TimedOut, Faulted}`. A session is
//! started, left to warm up, then polled at a fixed interval for at most
//! `max_attempts` reads. Intrinsics are taken from the first frame that
//! reports `Tracking`; distortion is queried only after that. The session is
//! released before any outcome is returned.
//!
//! Polling could be made cancellable by checking a flag at each poll boundary,
//! which is where the task yields anyway.

use crate::check_invariant;
use crate::config::{AcquisitionConfig, ConcurrencyPolicy};
use crate::errors::{AcquisitionError, SourceError};
use crate::platform::{CalibrationSource, PlatformInfo, TrackingPlatform};
use crate::session::{SessionHandle, SessionLifecycleManager};
use crate::types::{AcquisitionOutcome, CalibrationResult, FrameIntrinsics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Loop-local position in the polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollAttempt {
    /// 0-based
    pub index: u32,
    /// Time spent waiting between polls so far
    pub waited: Duration,
}

impl PollAttempt {
    fn first() -> Self {
        Self {
            index: 0,
            waited: Duration::ZERO,
        }
    }

    fn next(self, interval: Duration) -> Self {
        Self {
            index: self.index + 1,
            waited: self.waited + interval,
        }
    }

    /// Polls performed once this attempt has been read
    pub fn polls(&self) -> u32 {
        self.index + 1
    }
}

#[derive(Debug)]
enum AcquisitionState {
    Polling(PollAttempt),
    Done(Terminal),
}

#[derive(Debug)]
enum Terminal {
    Confirmed {
        intrinsics: FrameIntrinsics,
        polls: u32,
    },
    TimedOut(PollAttempt),
    Faulted(AcquisitionError),
}

/// The first successful calibration of this process, with provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedCalibration {
    pub calibration: CalibrationResult,
    pub acquired_at: DateTime<Utc>,
    pub polls: u32,
    pub session_id: Uuid,
}

/// Calibration cache and in-flight gate.
///
/// Every acquirer built on the same cell shares one cache and never runs a
/// session while another acquirer on the cell is running one.
#[derive(Debug, Default)]
pub struct CalibrationCell {
    cache: RwLock<Option<CachedCalibration>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl CalibrationCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<CachedCalibration> {
        self.cache.read().ok().and_then(|cache| cache.clone())
    }

    /// Whether an acquisition on this cell is running right now
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// First success wins; later results never replace it.
    fn store(&self, entry: CachedCalibration) {
        match self.cache.write() {
            Ok(mut cache) => {
                if cache.is_none() {
                    *cache = Some(entry);
                }
            }
            Err(_) => log::warn!("Calibration cache lock poisoned, result not cached"),
        }
    }
}

pub struct IntrinsicsAcquirer<P: TrackingPlatform> {
    sessions: SessionLifecycleManager<P>,
    config: AcquisitionConfig,
    cell: Arc<CalibrationCell>,
}

impl<P: TrackingPlatform> IntrinsicsAcquirer<P> {
    /// Acquirer with a cell of its own. Out-of-range config values are clamped.
    pub fn new(platform: P, config: AcquisitionConfig) -> Self {
        Self::with_cell(Arc::new(platform), config, Arc::new(CalibrationCell::new()))
    }

    /// Acquirer that shares `cell` (cache and gate) with other acquirers.
    pub fn with_cell(
        platform: Arc<P>,
        config: AcquisitionConfig,
        cell: Arc<CalibrationCell>,
    ) -> Self {
        Self {
            sessions: SessionLifecycleManager::new(platform),
            config: config.clamped(),
            cell,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn cell(&self) -> &Arc<CalibrationCell> {
        &self.cell
    }

    pub fn platform_info(&self) -> PlatformInfo {
        PlatformInfo::of(self.sessions.platform())
    }

    /// Cached calibration, if a previous call succeeded and caching is on
    pub fn cached_calibration(&self) -> Option<CachedCalibration> {
        if !self.config.cache_results {
            return None;
        }
        self.cell.cached()
    }

    /// Run one acquisition, or answer from the cache.
    ///
    /// Concurrent callers are queued or rejected according to
    /// [`ConcurrencyPolicy`]; a queued caller re-checks the cache once the
    /// running acquisition finishes.
    pub async fn get_intrinsics(&self) -> AcquisitionOutcome {
        if let Some(cached) = self.cached_calibration() {
            log::debug!("Returning cached calibration from {}", cached.acquired_at);
            return AcquisitionOutcome::Success(cached.calibration);
        }

        let _gate = match self.config.concurrency {
            ConcurrencyPolicy::Serialize => self.cell.in_flight.lock().await,
            ConcurrencyPolicy::Reject => match self.cell.in_flight.try_lock() {
                Ok(gate) => gate,
                Err(_) => {
                    log::warn!("Rejecting acquisition: another one is in progress");
                    return AcquisitionOutcome::Failure(AcquisitionError::already_in_progress());
                }
            },
        };

        if let Some(cached) = self.cached_calibration() {
            return AcquisitionOutcome::Success(cached.calibration);
        }

        self.acquire().await.into()
    }

    async fn acquire(&self) -> Result<CalibrationResult, AcquisitionError> {
        let started = Instant::now();

        let mut handle = match self.sessions.acquire() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Intrinsics acquisition could not start: {}", e);
                return Err(e);
            }
        };
        let session_id = handle.id();

        let result = self.run_protocol(&mut handle).await;

        self.sessions.release(&mut handle);
        check_invariant!(
            handle.is_released(),
            "session is released before the outcome is returned"
        );

        let (calibration, polls) = match result {
            Ok(done) => done,
            Err(e) => {
                log::warn!(
                    "Intrinsics acquisition failed after {}ms: {}",
                    started.elapsed().as_millis(),
                    e
                );
                return Err(e);
            }
        };

        log::info!(
            "Intrinsics acquired in {}ms after {} poll(s): fx={} fy={} {}x{}",
            started.elapsed().as_millis(),
            polls,
            calibration.focal_length.0,
            calibration.focal_length.1,
            calibration.image_dimensions.0,
            calibration.image_dimensions.1
        );

        if self.config.cache_results {
            self.cell.store(CachedCalibration {
                calibration: calibration.clone(),
                acquired_at: Utc::now(),
                polls,
                session_id,
            });
        }

        Ok(calibration)
    }

    /// Warm-up, polling and result assembly on a started session
    async fn run_protocol(
        &self,
        handle: &mut SessionHandle<P::Session>,
    ) -> Result<(CalibrationResult, u32), AcquisitionError> {
        tokio::time::sleep(self.config.warm_up()).await;

        let source = handle.source_mut();
        let mut attempt = PollAttempt::first();
        let terminal = loop {
            match self.poll(source, attempt).await {
                AcquisitionState::Polling(next) => attempt = next,
                AcquisitionState::Done(terminal) => break terminal,
            }
        };

        match terminal {
            Terminal::Confirmed { intrinsics, polls } => {
                let distortion = source.rear_camera_distortion_coefficients();
                if distortion.is_none() {
                    log::debug!("No lens distortion published for the rear camera");
                }
                Ok((CalibrationResult::assemble(intrinsics, distortion), polls))
            }
            Terminal::Faulted(e) => {
                log::error!("Tracking subsystem fault while polling: {}", e);
                Err(e)
            }
            Terminal::TimedOut(last) => {
                log::warn!(
                    "No confirmed tracking after {} poll(s), {}ms of poll waits",
                    last.polls(),
                    last.waited.as_millis()
                );
                Err(AcquisitionError::intrinsics_unavailable())
            }
        }
    }

    async fn poll(&self, source: &mut P::Session, attempt: PollAttempt) -> AcquisitionState {
        check_invariant!(
            attempt.index < self.config.max_attempts,
            "poll index stays below max_attempts"
        );
        let polls = attempt.polls();

        let observed = source.current_tracking_state().and_then(|state| {
            if state.is_tracking() {
                source.current_frame_intrinsics().map(Some)
            } else {
                log::debug!("Poll {}/{}: {}", polls, self.config.max_attempts, state);
                Ok(None)
            }
        });

        match observed {
            Ok(Some(intrinsics)) => {
                log::debug!("Poll {}/{}: tracking confirmed", polls, self.config.max_attempts);
                return AcquisitionState::Done(Terminal::Confirmed { intrinsics, polls });
            }
            Ok(None) => {}
            Err(SourceError::NotYetAvailable) => {
                log::debug!(
                    "Poll {}/{}: intrinsics not yet available",
                    polls,
                    self.config.max_attempts
                );
            }
            Err(e) => {
                return AcquisitionState::Done(Terminal::Faulted(AcquisitionError::from_source(e)))
            }
        }

        if polls >= self.config.max_attempts {
            return AcquisitionState::Done(Terminal::TimedOut(attempt));
        }

        tokio::time::sleep(self.config.poll_interval()).await;
        AcquisitionState::Polling(attempt.next(self.config.poll_interval()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPlatform;

    fn fast_config() -> AcquisitionConfig {
        AcquisitionConfig {
            warm_up_ms: 0,
            poll_interval_ms: 0,
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn test_poll_attempt_progression() {
        let attempt = PollAttempt::first().next(Duration::from_millis(100));
        assert_eq!(attempt.index, 1);
        assert_eq!(attempt.polls(), 2);
        assert_eq!(attempt.waited, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cache_disabled_reacquires() {
        let platform = ScriptedPlatform::new(vec![
            crate::testing::Step::Tracking(crate::testing::sample_intrinsics()),
            crate::testing::Step::Tracking(crate::testing::sample_intrinsics()),
        ]);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            cache_results: false,
            ..fast_config()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);

        assert!(acquirer.get_intrinsics().await.is_success());
        assert!(acquirer.get_intrinsics().await.is_success());
        assert_eq!(counters.creates(), 2);
        assert!(acquirer.cached_calibration().is_none());
    }

    #[tokio::test]
    async fn test_zero_attempt_budget_is_clamped() {
        let platform = ScriptedPlatform::new(vec![]);
        let counters = platform.counters();
        let config = AcquisitionConfig {
            max_attempts: 0,
            ..fast_config()
        };
        let acquirer = IntrinsicsAcquirer::new(platform, config);
        assert_eq!(acquirer.config().max_attempts, 1);

        let outcome = acquirer.get_intrinsics().await;
        let error = outcome.into_result().unwrap_err();
        assert_eq!(error.kind, crate::errors::FailureKind::IntrinsicsUnavailable);
        assert_eq!(counters.polls(), 1);
        assert_eq!(counters.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_cached_calibration_records_provenance() {
        let platform = ScriptedPlatform::converging_after(2);
        let acquirer = IntrinsicsAcquirer::new(platform, fast_config());

        assert!(acquirer.get_intrinsics().await.is_success());
        let cached = acquirer.cached_calibration().unwrap();
        assert_eq!(cached.polls, 3);
        assert_eq!(cached.calibration.image_dimensions, (1280, 720));
    }
}
