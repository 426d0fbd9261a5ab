//! Scripted tracking platform
//!
//! Each call to `current_tracking_state` consumes one [`Step`] from a queue
//! shared by every session the platform creates. An exhausted script keeps
//! reporting `NotTracking`.

use crate::errors::SourceError;
use crate::platform::{CalibrationSource, SessionConfiguration, TrackingPlatform, TrackingSession};
use crate::types::{FrameIntrinsics, TrackingState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Intrinsics of a 1280x720 rear camera
pub fn sample_intrinsics() -> FrameIntrinsics {
    FrameIntrinsics::new((1000.0, 1005.0), (640.0, 360.0), (1280, 720))
}

/// Brown-Conrady coefficients (k1, k2, p1, p2, k3) matching [`sample_intrinsics`]
pub fn sample_distortion() -> Vec<f64> {
    vec![0.01, -0.02, 0.0, 0.0, 0.0]
}

/// What one poll observes
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    NotTracking,
    Paused,
    /// Converged, with these intrinsics on the frame
    Tracking(FrameIntrinsics),
    /// Reports tracking, but the intrinsics read says not yet available
    TrackingNotYetAvailable,
    /// Tracking state read fails with a platform error
    Fault(String),
}

/// Call counts shared between a platform and its sessions
#[derive(Debug, Default)]
pub struct ScriptedCounters {
    creates: AtomicUsize,
    starts: AtomicUsize,
    polls: AtomicUsize,
    intrinsics_reads: AtomicUsize,
    distortion_queries: AtomicUsize,
    pauses: AtomicUsize,
    closes: AtomicUsize,
    peak_open: AtomicUsize,
}

impl ScriptedCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn intrinsics_reads(&self) -> usize {
        self.intrinsics_reads.load(Ordering::SeqCst)
    }

    pub fn distortion_queries(&self) -> usize {
        self.distortion_queries.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sessions created and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.creates().saturating_sub(self.closes())
    }

    /// Most sessions ever open at the same time
    pub fn peak_open_sessions(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    unsupported: bool,
    create: Option<SourceError>,
    start: Option<SourceError>,
    teardown: bool,
}

#[derive(Debug)]
pub struct ScriptedPlatform {
    script: Arc<Mutex<VecDeque<Step>>>,
    distortion: Option<Vec<f64>>,
    faults: Faults,
    counters: Arc<ScriptedCounters>,
}

impl ScriptedPlatform {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into())),
            distortion: None,
            faults: Faults::default(),
            counters: Arc::new(ScriptedCounters::default()),
        }
    }

    /// `not_tracking` misses followed by a tracked frame with [`sample_intrinsics`]
    pub fn converging_after(not_tracking: usize) -> Self {
        let mut steps = vec![Step::NotTracking; not_tracking];
        steps.push(Step::Tracking(sample_intrinsics()));
        Self::new(steps)
    }

    pub fn with_distortion(mut self, coefficients: Vec<f64>) -> Self {
        self.distortion = Some(coefficients);
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.faults.unsupported = true;
        self
    }

    pub fn fail_create(mut self, error: SourceError) -> Self {
        self.faults.create = Some(error);
        self
    }

    pub fn fail_start(mut self, message: &str) -> Self {
        self.faults.start = Some(SourceError::platform(message));
        self
    }

    pub fn fail_start_with(mut self, error: SourceError) -> Self {
        self.faults.start = Some(error);
        self
    }

    /// Pause and close both report errors (the close is still counted)
    pub fn fail_teardown(mut self) -> Self {
        self.faults.teardown = true;
        self
    }

    pub fn counters(&self) -> Arc<ScriptedCounters> {
        self.counters.clone()
    }

    /// Steps not yet consumed
    pub fn remaining_steps(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl TrackingPlatform for ScriptedPlatform {
    type Session = ScriptedSession;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn is_supported(&self) -> bool {
        !self.faults.unsupported
    }

    fn create_session(&self) -> Result<ScriptedSession, SourceError> {
        if let Some(error) = &self.faults.create {
            return Err(error.clone());
        }
        ScriptedCounters::bump(&self.counters.creates);
        self.counters
            .peak_open
            .fetch_max(self.counters.open_sessions(), Ordering::SeqCst);

        Ok(ScriptedSession {
            script: self.script.clone(),
            distortion: self.distortion.clone(),
            faults: self.faults.clone(),
            counters: self.counters.clone(),
            current: None,
            running: false,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    script: Arc<Mutex<VecDeque<Step>>>,
    distortion: Option<Vec<f64>>,
    faults: Faults,
    counters: Arc<ScriptedCounters>,
    current: Option<Result<FrameIntrinsics, SourceError>>,
    running: bool,
}

impl CalibrationSource for ScriptedSession {
    fn current_tracking_state(&mut self) -> Result<TrackingState, SourceError> {
        ScriptedCounters::bump(&self.counters.polls);

        let step = self
            .script
            .lock()
            .map_err(|_| SourceError::platform("script lock poisoned"))?
            .pop_front()
            .unwrap_or(Step::NotTracking);

        let (state, current) = match step {
            Step::NotTracking => (TrackingState::NotTracking, None),
            Step::Paused => (TrackingState::Paused, None),
            Step::Tracking(intrinsics) => (TrackingState::Tracking, Some(Ok(intrinsics))),
            Step::TrackingNotYetAvailable => (
                TrackingState::Tracking,
                Some(Err(SourceError::NotYetAvailable)),
            ),
            Step::Fault(message) => return Err(SourceError::Platform(message)),
        };
        self.current = current;
        Ok(state)
    }

    fn current_frame_intrinsics(&mut self) -> Result<FrameIntrinsics, SourceError> {
        ScriptedCounters::bump(&self.counters.intrinsics_reads);
        self.current
            .clone()
            .unwrap_or(Err(SourceError::NotYetAvailable))
    }

    fn rear_camera_distortion_coefficients(&self) -> Option<Vec<f64>> {
        ScriptedCounters::bump(&self.counters.distortion_queries);
        self.distortion.clone()
    }
}

impl TrackingSession for ScriptedSession {
    fn start(&mut self, _config: &SessionConfiguration) -> Result<(), SourceError> {
        if let Some(error) = &self.faults.start {
            return Err(error.clone());
        }
        ScriptedCounters::bump(&self.counters.starts);
        self.running = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SourceError> {
        ScriptedCounters::bump(&self.counters.pauses);
        self.running = false;
        if self.faults.teardown {
            return Err(SourceError::platform("pause failed"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        ScriptedCounters::bump(&self.counters.closes);
        if self.faults.teardown {
            return Err(SourceError::platform("close failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_consumed_in_order() {
        let platform = ScriptedPlatform::converging_after(1);
        let mut session = platform.create_session().unwrap();

        assert_eq!(
            session.current_tracking_state().unwrap(),
            TrackingState::NotTracking
        );
        assert_eq!(session.current_tracking_state().unwrap(), TrackingState::Tracking);
        assert_eq!(session.current_frame_intrinsics().unwrap(), sample_intrinsics());
        assert_eq!(platform.remaining_steps(), 0);
        assert_eq!(platform.counters().polls(), 2);
    }

    #[test]
    fn test_exhausted_script_reports_not_tracking() {
        let platform = ScriptedPlatform::new(vec![]);
        let mut session = platform.create_session().unwrap();
        assert_eq!(
            session.current_tracking_state().unwrap(),
            TrackingState::NotTracking
        );
        assert_eq!(
            session.current_frame_intrinsics(),
            Err(SourceError::NotYetAvailable)
        );
    }
}
