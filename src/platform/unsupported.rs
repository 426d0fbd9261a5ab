use crate::errors::SourceError;
use crate::platform::{CalibrationSource, SessionConfiguration, TrackingPlatform, TrackingSession};
use crate::types::{FrameIntrinsics, Platform, TrackingState};

/// Backend for targets without an AR tracking subsystem.
///
/// Session creation always fails with `SourceError::Unsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

#[derive(Debug)]
pub enum NoSession {}

impl TrackingPlatform for UnsupportedPlatform {
    type Session = NoSession;

    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn create_session(&self) -> Result<NoSession, SourceError> {
        Err(SourceError::Unsupported(format!(
            "no AR tracking subsystem on {}",
            Platform::current().as_str()
        )))
    }
}

impl CalibrationSource for NoSession {
    fn current_tracking_state(&mut self) -> Result<TrackingState, SourceError> {
        match *self {}
    }

    fn current_frame_intrinsics(&mut self) -> Result<FrameIntrinsics, SourceError> {
        match *self {}
    }

    fn rear_camera_distortion_coefficients(&self) -> Option<Vec<f64>> {
        match *self {}
    }
}

impl TrackingSession for NoSession {
    fn start(&mut self, _config: &SessionConfiguration) -> Result<(), SourceError> {
        match *self {}
    }

    fn pause(&mut self) -> Result<(), SourceError> {
        match *self {}
    }

    fn close(&mut self) -> Result<(), SourceError> {
        match *self {}
    }
}
