use crate::acquisition::CachedCalibration;
use crate::bridge::{self, BridgeError};
use crate::config::AcquisitionConfig;
use crate::platform::PlatformInfo;
use crate::types::CalibrationResult;
use tauri::command;

/// Camera intrinsics of the rear camera, from cache or a fresh tracking session
#[command]
pub async fn get_intrinsics() -> Result<CalibrationResult, BridgeError> {
    log::info!("Requesting camera intrinsics");

    let result = bridge::get_intrinsics().await;
    if let Err(e) = &result {
        log::warn!("Intrinsics request failed: {}", e);
    }
    result
}

/// Cached calibration with provenance, without starting a session
#[command]
pub async fn get_cached_intrinsics() -> Result<Option<CachedCalibration>, BridgeError> {
    bridge::cached_intrinsics()
}

#[command]
pub async fn get_acquisition_config() -> Result<AcquisitionConfig, BridgeError> {
    bridge::acquisition_config()
}

#[command]
pub async fn get_platform_info() -> Result<PlatformInfo, BridgeError> {
    let info = bridge::platform_info()?;
    log::debug!(
        "Platform {} backend {} (supported: {})",
        info.platform.as_str(),
        info.backend,
        info.supported
    );
    Ok(info)
}
