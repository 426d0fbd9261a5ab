//! Caller-facing intrinsics operation
//!
//! Holds the process-wide backend slot and translates acquisition failures
//! into the stable error codes a calling application sees. On Android the host has
//! to [`attach_platform`] before any call; iOS and desktop attach the native
//! backend on first use.

use crate::acquisition::{CachedCalibration, CalibrationCell, IntrinsicsAcquirer};
use crate::config::{AcquisitionConfig, IntrinsicsConfig};
use crate::errors::{AcquisitionError, FailureKind, SourceError};
use crate::permissions::{check_permission, PermissionStatus};
use crate::platform::{NativePlatform, PlatformInfo, TrackingPlatform};
use crate::types::CalibrationResult;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotAttached,
    CameraPermissionNotGranted,
    ArkitNotSupported,
    IntrinsicsUnavailable,
    SessionError,
    AlreadyInProgress,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotAttached => "NOT_ATTACHED",
            ErrorCode::CameraPermissionNotGranted => "CAMERA_PERMISSION_NOT_GRANTED",
            ErrorCode::ArkitNotSupported => "ARKIT_NOT_SUPPORTED",
            ErrorCode::IntrinsicsUnavailable => "INTRINSICS_UNAVAILABLE",
            ErrorCode::SessionError => "SESSION_ERROR",
            ErrorCode::AlreadyInProgress => "ALREADY_IN_PROGRESS",
        }
    }

    pub fn for_failure(error: &AcquisitionError) -> Self {
        match (error.kind, &error.cause) {
            (FailureKind::SessionStart, Some(SourceError::Unsupported(_))) => {
                ErrorCode::ArkitNotSupported
            }
            (_, Some(SourceError::PermissionDenied(_))) => ErrorCode::CameraPermissionNotGranted,
            (FailureKind::SessionStart, _) | (FailureKind::Unexpected, _) => ErrorCode::SessionError,
            (FailureKind::IntrinsicsUnavailable, _) => ErrorCode::IntrinsicsUnavailable,
            (FailureKind::AlreadyInProgress, _) => ErrorCode::AlreadyInProgress,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload returned across the bridge: a stable code plus a readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
}

impl BridgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_attached() -> Self {
        Self::new(ErrorCode::NotAttached, "Plugin not attached to a host activity")
    }

    pub fn permission_not_granted(status: PermissionStatus) -> Self {
        Self::new(
            ErrorCode::CameraPermissionNotGranted,
            format!("Camera permission is required (status: {status})"),
        )
    }
}

impl From<&AcquisitionError> for BridgeError {
    fn from(error: &AcquisitionError) -> Self {
        Self::new(ErrorCode::for_failure(error), error.message.clone())
    }
}

impl From<AcquisitionError> for BridgeError {
    fn from(error: AcquisitionError) -> Self {
        Self::from(&error)
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BridgeError {}

/// Answer one intrinsics request against a specific acquirer.
///
/// A cached calibration is returned before the permission status is
/// consulted; a denied or restricted camera fails without starting a session.
pub async fn get_intrinsics_with<P: TrackingPlatform>(
    acquirer: &IntrinsicsAcquirer<P>,
    permission: PermissionStatus,
) -> Result<CalibrationResult, BridgeError> {
    if let Some(cached) = acquirer.cached_calibration() {
        return Ok(cached.calibration);
    }

    if !permission.allows_capture() {
        log::warn!("Camera permission check failed: {}", permission);
        return Err(BridgeError::permission_not_granted(permission));
    }

    acquirer
        .get_intrinsics()
        .await
        .into_result()
        .map_err(BridgeError::from)
}

/// Attachable backend slot plus the calibration cell every attached
/// acquirer shares.
///
/// Reattaching swaps the platform but keeps the cache and the in-flight gate,
/// so an acquisition started on the old backend still finishes before one on
/// the new backend begins, and its result is what both callers see.
pub struct IntrinsicsService<P: TrackingPlatform> {
    acquirer: RwLock<Option<Arc<IntrinsicsAcquirer<P>>>>,
    cell: Arc<CalibrationCell>,
}

impl<P: TrackingPlatform> Default for IntrinsicsService<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TrackingPlatform> IntrinsicsService<P> {
    pub fn new() -> Self {
        Self {
            acquirer: RwLock::new(None),
            cell: Arc::new(CalibrationCell::new()),
        }
    }

    pub fn cell(&self) -> &Arc<CalibrationCell> {
        &self.cell
    }

    fn build(&self, platform: P, config: AcquisitionConfig) -> IntrinsicsAcquirer<P> {
        log::info!(
            "Attaching {} backend (max_attempts={}, poll_interval={}ms, warm_up={}ms)",
            platform.name(),
            config.max_attempts,
            config.poll_interval_ms,
            config.warm_up_ms
        );
        IntrinsicsAcquirer::with_cell(Arc::new(platform), config, self.cell.clone())
    }

    /// Install a backend, replacing any attached one.
    pub fn attach(&self, platform: P, config: AcquisitionConfig) -> Result<(), BridgeError> {
        config
            .validate()
            .map_err(|e| BridgeError::new(ErrorCode::SessionError, format!("Invalid config: {e}")))?;

        let acquirer = Arc::new(self.build(platform, config));
        let mut slot = self
            .acquirer
            .write()
            .map_err(|_| BridgeError::from(AcquisitionError::poisoned_lock()))?;
        *slot = Some(acquirer);
        Ok(())
    }

    /// Drop the attached backend; calls fail with `NOT_ATTACHED` until reattached.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.acquirer.write() {
            if slot.take().is_some() {
                log::info!("Intrinsics backend detached");
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.acquirer.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn attached(&self) -> Result<Arc<IntrinsicsAcquirer<P>>, BridgeError> {
        let slot = self
            .acquirer
            .read()
            .map_err(|_| BridgeError::from(AcquisitionError::poisoned_lock()))?;
        slot.as_ref().cloned().ok_or_else(BridgeError::not_attached)
    }

    /// The attached acquirer, attaching the backend `init` builds if none is.
    ///
    /// Check and install happen under one write lock, so racing callers all
    /// end up on the same acquirer.
    pub fn attached_or_attach<F>(
        &self,
        init: F,
    ) -> Result<Arc<IntrinsicsAcquirer<P>>, BridgeError>
    where
        F: FnOnce() -> (P, AcquisitionConfig),
    {
        if let Ok(acquirer) = self.attached() {
            return Ok(acquirer);
        }

        let mut slot = self
            .acquirer
            .write()
            .map_err(|_| BridgeError::from(AcquisitionError::poisoned_lock()))?;
        if let Some(acquirer) = slot.as_ref() {
            return Ok(acquirer.clone());
        }

        let (platform, config) = init();
        let acquirer = Arc::new(self.build(platform, config));
        *slot = Some(acquirer.clone());
        Ok(acquirer)
    }

    /// Camera intrinsics from the attached backend
    pub async fn get_intrinsics(
        &self,
        permission: PermissionStatus,
    ) -> Result<CalibrationResult, BridgeError> {
        let acquirer = self.attached()?;
        get_intrinsics_with(&acquirer, permission).await
    }

    pub fn cached_intrinsics(&self) -> Result<Option<CachedCalibration>, BridgeError> {
        Ok(self.attached()?.cached_calibration())
    }

    pub fn acquisition_config(&self) -> Result<AcquisitionConfig, BridgeError> {
        Ok(self.attached()?.config().clone())
    }

    pub fn platform_info(&self) -> Result<PlatformInfo, BridgeError> {
        Ok(self.attached()?.platform_info())
    }
}

lazy_static::lazy_static! {
    static ref INTRINSICS_SERVICE: IntrinsicsService<NativePlatform> = IntrinsicsService::new();
}

/// Install the native backend with configuration from the default config file.
pub fn attach_platform(platform: NativePlatform) -> Result<(), BridgeError> {
    attach_platform_with_config(platform, IntrinsicsConfig::load_or_default().acquisition)
}

/// Install the native backend. A calibration cached by a previously attached
/// backend carries over.
pub fn attach_platform_with_config(
    platform: NativePlatform,
    config: AcquisitionConfig,
) -> Result<(), BridgeError> {
    INTRINSICS_SERVICE.attach(platform, config)
}

pub fn detach_platform() {
    INTRINSICS_SERVICE.detach();
}

#[cfg(not(target_os = "android"))]
fn native_acquirer() -> Result<Arc<IntrinsicsAcquirer<NativePlatform>>, BridgeError> {
    INTRINSICS_SERVICE.attached_or_attach(|| {
        (
            NativePlatform::default(),
            IntrinsicsConfig::load_or_default().acquisition,
        )
    })
}

#[cfg(target_os = "android")]
fn native_acquirer() -> Result<Arc<IntrinsicsAcquirer<NativePlatform>>, BridgeError> {
    INTRINSICS_SERVICE.attached()
}

/// Camera intrinsics from the native backend
pub async fn get_intrinsics() -> Result<CalibrationResult, BridgeError> {
    let acquirer = native_acquirer()?;
    get_intrinsics_with(&acquirer, check_permission()).await
}

pub fn cached_intrinsics() -> Result<Option<CachedCalibration>, BridgeError> {
    Ok(native_acquirer()?.cached_calibration())
}

pub fn acquisition_config() -> Result<AcquisitionConfig, BridgeError> {
    Ok(native_acquirer()?.config().clone())
}

pub fn platform_info() -> Result<PlatformInfo, BridgeError> {
    Ok(native_acquirer()?.platform_info())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::ArkitNotSupported).unwrap();
        assert_eq!(json, "\"ARKIT_NOT_SUPPORTED\"");
        for code in [
            ErrorCode::NotAttached,
            ErrorCode::CameraPermissionNotGranted,
            ErrorCode::IntrinsicsUnavailable,
            ErrorCode::SessionError,
            ErrorCode::AlreadyInProgress,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_bridge_error_json() {
        let err = BridgeError::from(AcquisitionError::intrinsics_unavailable());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INTRINSICS_UNAVAILABLE");
        assert_eq!(json["message"], "no confirmed tracking within attempt budget");
    }
}
