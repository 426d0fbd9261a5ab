//! CrabIntrinsics: rear-camera intrinsics from the platform AR tracking subsystem
//!
//! Starts a short-lived ARKit (iOS) or ARCore (Android) session, waits for
//! tracking to converge, reads focal length, principal point and image size
//! from the first tracked frame, then tears the session down. The first
//! successful calibration is cached for the life of the process.
//!
//! # Features
//! - Bounded warm-up and polling (500ms + up to 20 polls at 100ms by default)
//! - Lens distortion coefficients where the device publishes them
//! - Stable error codes for callers across a plugin bridge
//! - Scripted tracking backend for deterministic tests
//!
//! # Usage
//! ```toml
//! [dependencies]
//! crabintrinsics = { version = "0.1", features = ["plugin"] }
//! ```
//!
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(crabintrinsics::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
//!
//! Without Tauri, drive an [`IntrinsicsAcquirer`] directly:
//! ```rust,ignore
//! let acquirer = IntrinsicsAcquirer::new(NativePlatform::default(), AcquisitionConfig::default());
//! match acquirer.get_intrinsics().await {
//!     AcquisitionOutcome::Success(calibration) => println!("{:?}", calibration.focal_length),
//!     AcquisitionOutcome::Failure(e) => eprintln!("{}", e),
//! }
//! ```
pub mod acquisition;
pub mod bridge;
#[cfg(feature = "plugin")]
pub mod commands;
pub mod config;
pub mod errors;
pub mod invariants;
pub mod permissions;
pub mod platform;
pub mod session;
pub mod types;

// Testing utilities - scripted tracking backend
pub mod testing;

// Re-exports for convenience
pub use acquisition::{CachedCalibration, CalibrationCell, IntrinsicsAcquirer};
pub use bridge::{BridgeError, ErrorCode, IntrinsicsService};
pub use config::{AcquisitionConfig, ConcurrencyPolicy, IntrinsicsConfig};
pub use errors::{AcquisitionError, FailureKind, SourceError};
pub use platform::{CalibrationSource, NativePlatform, TrackingPlatform, TrackingSession};
pub use session::{SessionHandle, SessionLifecycleManager};
pub use types::{AcquisitionOutcome, CalibrationResult, FrameIntrinsics, Platform, TrackingState};

#[cfg(feature = "plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the CrabIntrinsics plugin with all commands
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("crabintrinsics")
        .invoke_handler(tauri::generate_handler![
            commands::intrinsics::get_intrinsics,
            commands::intrinsics::get_cached_intrinsics,
            commands::intrinsics::get_acquisition_config,
            commands::intrinsics::get_platform_info,
        ])
        .build()
}

/// Detect the current platform using the Platform enum
pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging for the intrinsics subsystem
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabintrinsics=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
        ar_tracking: Platform::current().has_ar_tracking(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
    pub ar_tracking: bool,
}
