use crate::errors::AcquisitionError;
use serde::{Deserialize, Serialize};

/// Tracking confidence reported by the AR subsystem for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    NotTracking,
    Tracking,
    Paused,
}

impl TrackingState {
    pub fn is_tracking(self) -> bool {
        matches!(self, TrackingState::Tracking)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackingState::NotTracking => "not_tracking",
            TrackingState::Tracking => "tracking",
            TrackingState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intrinsics read from a single tracked frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameIntrinsics {
    /// (fx, fy) in pixels
    pub focal_length: (f64, f64),
    /// (cx, cy) in pixels
    pub principal_point: (f64, f64),
    /// (width, height) in pixels
    pub image_dimensions: (u32, u32),
}

impl FrameIntrinsics {
    pub fn new(focal_length: (f64, f64), principal_point: (f64, f64), image_dimensions: (u32, u32)) -> Self {
        Self {
            focal_length,
            principal_point,
            image_dimensions,
        }
    }

    /// Build from a floating-point resolution, truncating toward zero.
    ///
    /// Negative or NaN extents become 0.
    pub fn with_float_resolution(
        focal_length: (f64, f64),
        principal_point: (f64, f64),
        width: f64,
        height: f64,
    ) -> Self {
        Self::new(
            focal_length,
            principal_point,
            (width.trunc() as u32, height.trunc() as u32),
        )
    }
}

/// Camera calibration handed back to the caller.
///
/// Only constructed from a complete [`FrameIntrinsics`] plus the (possibly
/// empty) distortion list, so a partially filled result cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub focal_length: (f64, f64),
    pub principal_point: (f64, f64),
    pub image_dimensions: (u32, u32),
    #[serde(rename = "distortion", alias = "distortionCoefficients")]
    pub distortion_coefficients: Vec<f64>,
}

impl CalibrationResult {
    pub fn assemble(intrinsics: FrameIntrinsics, distortion: Option<Vec<f64>>) -> Self {
        Self {
            focal_length: intrinsics.focal_length,
            principal_point: intrinsics.principal_point,
            image_dimensions: intrinsics.image_dimensions,
            distortion_coefficients: distortion.unwrap_or_default(),
        }
    }

    pub fn has_distortion(&self) -> bool {
        !self.distortion_coefficients.is_empty()
    }
}

/// Terminal value of one acquisition call
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    Success(CalibrationResult),
    Failure(AcquisitionError),
}

impl AcquisitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<CalibrationResult, AcquisitionError> {
        self.into()
    }
}

impl From<Result<CalibrationResult, AcquisitionError>> for AcquisitionOutcome {
    fn from(result: Result<CalibrationResult, AcquisitionError>) -> Self {
        match result {
            Ok(calibration) => AcquisitionOutcome::Success(calibration),
            Err(error) => AcquisitionOutcome::Failure(error),
        }
    }
}

impl From<AcquisitionOutcome> for Result<CalibrationResult, AcquisitionError> {
    fn from(outcome: AcquisitionOutcome) -> Self {
        match outcome {
            AcquisitionOutcome::Success(calibration) => Ok(calibration),
            AcquisitionOutcome::Failure(error) => Err(error),
        }
    }
}

/// Host platform family, decides which tracking backend is compiled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    MacOS,
    Windows,
    Linux,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::MacOS => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }

    /// Whether this platform ships an AR tracking subsystem we can drive
    pub fn has_ar_tracking(&self) -> bool {
        matches!(self, Platform::Ios | Platform::Android)
    }
}
