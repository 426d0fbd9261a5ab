//! Platform tracking backends
//!
//! The acquisition protocol only sees three small traits. Exactly one native
//! realization is compiled in per target and exported as [`NativePlatform`]:
//! ARKit on iOS, ARCore on Android, and a backend that reports the
//! subsystem as unsupported everywhere else.

use crate::errors::SourceError;
use crate::types::{FrameIntrinsics, TrackingState};

#[cfg(target_os = "android")]
pub mod arcore;
#[cfg(target_os = "ios")]
pub mod arkit;
pub mod unsupported;

#[cfg(target_os = "android")]
pub use arcore::{ArCorePlatform, ArCoreSession};
#[cfg(target_os = "ios")]
pub use arkit::{ArKitPlatform, ArKitSession};
pub use unsupported::UnsupportedPlatform;

#[cfg(target_os = "ios")]
pub type NativePlatform = ArKitPlatform;
#[cfg(target_os = "android")]
pub type NativePlatform = ArCorePlatform;
#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub type NativePlatform = UnsupportedPlatform;

/// Synchronous reads against the most recently delivered frame.
pub trait CalibrationSource {
    /// Advance to the latest frame and report its tracking state.
    fn current_tracking_state(&mut self) -> Result<TrackingState, SourceError>;

    /// Intrinsics of the frame last observed by `current_tracking_state`.
    ///
    /// `SourceError::NotYetAvailable` is expected early in a session.
    fn current_frame_intrinsics(&mut self) -> Result<FrameIntrinsics, SourceError>;

    /// Static lens distortion of the rear-facing camera, if the device publishes it.
    fn rear_camera_distortion_coefficients(&self) -> Option<Vec<f64>>;
}

/// How a session is configured before it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Never block on frame delivery; always read the newest camera image
    LatestCameraImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldAlignment {
    /// Y axis parallel to gravity
    Gravity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfiguration {
    pub update_mode: UpdateMode,
    pub world_alignment: WorldAlignment,
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::LatestCameraImage,
            world_alignment: WorldAlignment::Gravity,
        }
    }
}

/// One live tracking session on the platform's AR subsystem.
pub trait TrackingSession: CalibrationSource + Send {
    /// Apply the configuration and begin camera capture.
    fn start(&mut self, config: &SessionConfiguration) -> Result<(), SourceError>;

    fn pause(&mut self) -> Result<(), SourceError>;

    /// Destroy the session and any execution context it allocated.
    /// Called once, after `pause`.
    fn close(&mut self) -> Result<(), SourceError>;
}

/// Factory for tracking sessions on one platform.
pub trait TrackingPlatform: Send + Sync + 'static {
    type Session: TrackingSession;

    fn name(&self) -> &'static str;

    fn is_supported(&self) -> bool;

    /// Allocate a session plus whatever execution context it needs to run.
    /// The session is not started yet.
    fn create_session(&self) -> Result<Self::Session, SourceError>;
}

/// Summary of the compiled-in backend
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlatformInfo {
    pub platform: crate::types::Platform,
    pub backend: String,
    pub supported: bool,
}

impl PlatformInfo {
    pub fn of<P: TrackingPlatform>(platform: &P) -> Self {
        Self {
            platform: crate::types::Platform::current(),
            backend: platform.name().to_string(),
            supported: platform.is_supported(),
        }
    }
}
