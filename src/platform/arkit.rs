use crate::errors::SourceError;
use crate::platform::{
    CalibrationSource, SessionConfiguration, TrackingPlatform, TrackingSession, WorldAlignment,
};
use crate::types::{FrameIntrinsics, TrackingState};
use objc::rc::autoreleasepool;
use objc::runtime::{Class, Object, BOOL, NO};
use objc::{msg_send, sel, sel_impl};

// ARWorldAlignment
const AR_WORLD_ALIGNMENT_GRAVITY: isize = 0;

// ARTrackingState; 0 (not available) and 1 (limited) are not converged
const AR_TRACKING_STATE_NORMAL: isize = 2;

// `simd_float3` is a native 4-lane vector, not a struct of floats. Returning
// three of them must use the vector registers (v0-v2 on arm64), which a
// struct of `f32` fields would not.
#[cfg(target_arch = "aarch64")]
type SimdFloat3 = core::arch::aarch64::float32x4_t;
#[cfg(target_arch = "x86_64")]
type SimdFloat3 = core::arch::x86_64::__m128;

/// `simd_float3x3`, column major
#[repr(C)]
#[derive(Clone, Copy)]
struct SimdFloat3x3 {
    columns: [SimdFloat3; 3],
}

fn lanes(column: SimdFloat3) -> [f32; 4] {
    // Both vector types are 16 bytes holding four f32 lanes
    unsafe { std::mem::transmute::<SimdFloat3, [f32; 4]>(column) }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CGSize {
    width: f64,
    height: f64,
}

/// ARKit world tracking via the Objective-C runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct ArKitPlatform;

impl TrackingPlatform for ArKitPlatform {
    type Session = ArKitSession;

    fn name(&self) -> &'static str {
        "arkit"
    }

    fn is_supported(&self) -> bool {
        let Some(config_class) = Class::get("ARWorldTrackingConfiguration") else {
            return false;
        };
        unsafe {
            let supported: BOOL = msg_send![config_class, isSupported];
            supported != NO
        }
    }

    fn create_session(&self) -> Result<ArKitSession, SourceError> {
        if !self.is_supported() {
            return Err(SourceError::Unsupported(
                "ARKit is not supported on this device".to_string(),
            ));
        }

        let session_class = Class::get("ARSession")
            .ok_or_else(|| SourceError::Unsupported("ARKit framework not loaded".to_string()))?;

        let session: *mut Object = unsafe { msg_send![session_class, new] };
        if session.is_null() {
            return Err(SourceError::platform("ARSession allocation failed"));
        }

        Ok(ArKitSession {
            session,
            frame: std::ptr::null_mut(),
            running: false,
        })
    }
}

/// Owns a retained `ARSession` and the last observed `ARFrame`
pub struct ArKitSession {
    session: *mut Object,
    frame: *mut Object,
    running: bool,
}

// ARSession is safe to drive from any thread; the session is never shared.
unsafe impl Send for ArKitSession {}

impl ArKitSession {
    /// Take ownership of an already retained frame, releasing the previous one.
    fn replace_frame(&mut self, frame: *mut Object) {
        if !self.frame.is_null() {
            unsafe {
                let _: () = msg_send![self.frame, release];
            }
        }
        self.frame = frame;
    }
}

impl CalibrationSource for ArKitSession {
    fn current_tracking_state(&mut self) -> Result<TrackingState, SourceError> {
        if self.session.is_null() {
            return Err(SourceError::platform("session already closed"));
        }
        if !self.running {
            return Ok(TrackingState::Paused);
        }

        let session = self.session;
        let frame: *mut Object = autoreleasepool(|| unsafe {
            let frame: *mut Object = msg_send![session, currentFrame];
            if !frame.is_null() {
                let _: *mut Object = msg_send![frame, retain];
            }
            frame
        });
        self.replace_frame(frame);
        if frame.is_null() {
            return Ok(TrackingState::NotTracking);
        }

        let state: isize = unsafe {
            let camera: *mut Object = msg_send![frame, camera];
            msg_send![camera, trackingState]
        };

        Ok(match state {
            AR_TRACKING_STATE_NORMAL => TrackingState::Tracking,
            _ => TrackingState::NotTracking,
        })
    }

    fn current_frame_intrinsics(&mut self) -> Result<FrameIntrinsics, SourceError> {
        if self.frame.is_null() {
            return Err(SourceError::NotYetAvailable);
        }

        let (matrix, resolution) = unsafe {
            let camera: *mut Object = msg_send![self.frame, camera];
            let matrix: SimdFloat3x3 = msg_send![camera, intrinsics];
            let resolution: CGSize = msg_send![camera, imageResolution];
            (matrix, resolution)
        };

        if resolution.width <= 0.0 || resolution.height <= 0.0 {
            return Err(SourceError::NotYetAvailable);
        }

        let [c0, c1, c2] = matrix.columns.map(lanes);
        Ok(FrameIntrinsics::with_float_resolution(
            (f64::from(c0[0]), f64::from(c1[1])),
            (f64::from(c2[0]), f64::from(c2[1])),
            resolution.width,
            resolution.height,
        ))
    }

    fn rear_camera_distortion_coefficients(&self) -> Option<Vec<f64>> {
        // ARCamera does not publish lens distortion
        None
    }
}

impl TrackingSession for ArKitSession {
    fn start(&mut self, config: &SessionConfiguration) -> Result<(), SourceError> {
        let config_class = Class::get("ARWorldTrackingConfiguration")
            .ok_or_else(|| SourceError::Unsupported("ARKit framework not loaded".to_string()))?;

        let alignment = match config.world_alignment {
            WorldAlignment::Gravity => AR_WORLD_ALIGNMENT_GRAVITY,
        };

        // ARKit always delivers the latest frame through `currentFrame`, so the
        // update mode needs no explicit setting here.
        unsafe {
            let ar_config: *mut Object = msg_send![config_class, new];
            if ar_config.is_null() {
                return Err(SourceError::platform(
                    "ARWorldTrackingConfiguration allocation failed",
                ));
            }
            let _: () = msg_send![ar_config, setWorldAlignment: alignment];
            let _: () = msg_send![self.session, runWithConfiguration: ar_config];
            let _: () = msg_send![ar_config, release];
        }

        self.running = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SourceError> {
        if self.running && !self.session.is_null() {
            unsafe {
                let _: () = msg_send![self.session, pause];
            }
        }
        self.running = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.replace_frame(std::ptr::null_mut());
        if !self.session.is_null() {
            unsafe {
                let _: () = msg_send![self.session, release];
            }
            self.session = std::ptr::null_mut();
        }
        Ok(())
    }
}
