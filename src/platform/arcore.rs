//! ARCore backend over the NDK C API
//!
//! ARCore refuses to update a session without a GL texture bound in a current
//! GL context, so every session owns a 1x1 off-screen EGL pbuffer and a
//! texture name. The context is made current around each frame update and
//! released again, which lets the polling task move between threads.
//!
//! The platform keeps the `JavaVM` and a global reference to the host
//! activity. A `JNIEnv` is only valid on the thread it belongs to, so each
//! ARCore call that needs one attaches the calling thread first.

use crate::errors::SourceError;
use crate::platform::{
    CalibrationSource, SessionConfiguration, TrackingPlatform, TrackingSession, UpdateMode,
};
use crate::types::{FrameIntrinsics, TrackingState};
use jni::objects::{GlobalRef, JObject};
use jni::{sys, JNIEnv, JavaVM};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

type ArStatus = i32;

const AR_SUCCESS: ArStatus = 0;
const AR_ERROR_CAMERA_PERMISSION_NOT_GRANTED: ArStatus = -9;
const AR_ERROR_NOT_YET_AVAILABLE: ArStatus = -12;
// AR_UNAVAILABLE_* codes start at -100
const AR_UNAVAILABLE_FIRST: ArStatus = -100;

const AR_UPDATE_MODE_LATEST_CAMERA_IMAGE: i32 = 1;

const AR_TRACKING_STATE_TRACKING: i32 = 0;
const AR_TRACKING_STATE_PAUSED: i32 = 1;

const AR_AVAILABILITY_SUPPORTED_INSTALLED: i32 = 203;

#[repr(C)]
struct ArSession {
    _private: [u8; 0],
}
#[repr(C)]
struct ArConfig {
    _private: [u8; 0],
}
#[repr(C)]
struct ArFrame {
    _private: [u8; 0],
}
#[repr(C)]
struct ArCamera {
    _private: [u8; 0],
}
#[repr(C)]
struct ArCameraIntrinsics {
    _private: [u8; 0],
}

#[link(name = "arcore_sdk_c")]
extern "C" {
    fn ArCoreApk_checkAvailability(env: *mut sys::JNIEnv, context: sys::jobject, out: *mut i32);
    fn ArSession_create(
        env: *mut sys::JNIEnv,
        context: sys::jobject,
        out_session: *mut *mut ArSession,
    ) -> ArStatus;
    fn ArSession_configure(session: *mut ArSession, config: *const ArConfig) -> ArStatus;
    fn ArSession_setCameraTextureName(session: *mut ArSession, texture_id: u32);
    fn ArSession_resume(session: *mut ArSession) -> ArStatus;
    fn ArSession_pause(session: *mut ArSession) -> ArStatus;
    fn ArSession_update(session: *mut ArSession, out_frame: *mut ArFrame) -> ArStatus;
    fn ArSession_destroy(session: *mut ArSession);

    fn ArConfig_create(session: *const ArSession, out_config: *mut *mut ArConfig);
    fn ArConfig_setUpdateMode(session: *const ArSession, config: *mut ArConfig, mode: i32);
    fn ArConfig_destroy(config: *mut ArConfig);

    fn ArFrame_create(session: *const ArSession, out_frame: *mut *mut ArFrame);
    fn ArFrame_acquireCamera(
        session: *const ArSession,
        frame: *const ArFrame,
        out_camera: *mut *mut ArCamera,
    );
    fn ArFrame_destroy(frame: *mut ArFrame);

    fn ArCamera_getTrackingState(
        session: *const ArSession,
        camera: *const ArCamera,
        out_state: *mut i32,
    );
    fn ArCamera_getImageIntrinsics(
        session: *const ArSession,
        camera: *const ArCamera,
        out_intrinsics: *mut ArCameraIntrinsics,
    );
    fn ArCamera_release(camera: *mut ArCamera);

    fn ArCameraIntrinsics_create(
        session: *const ArSession,
        out_intrinsics: *mut *mut ArCameraIntrinsics,
    );
    fn ArCameraIntrinsics_getFocalLength(
        session: *const ArSession,
        intrinsics: *const ArCameraIntrinsics,
        out_fx: *mut f32,
        out_fy: *mut f32,
    );
    fn ArCameraIntrinsics_getPrincipalPoint(
        session: *const ArSession,
        intrinsics: *const ArCameraIntrinsics,
        out_cx: *mut f32,
        out_cy: *mut f32,
    );
    fn ArCameraIntrinsics_getImageDimensions(
        session: *const ArSession,
        intrinsics: *const ArCameraIntrinsics,
        out_width: *mut i32,
        out_height: *mut i32,
    );
    fn ArCameraIntrinsics_destroy(intrinsics: *mut ArCameraIntrinsics);
}

fn check_status(status: ArStatus, what: &str) -> Result<(), SourceError> {
    match status {
        AR_SUCCESS => Ok(()),
        AR_ERROR_NOT_YET_AVAILABLE => Err(SourceError::NotYetAvailable),
        AR_ERROR_CAMERA_PERMISSION_NOT_GRANTED => Err(SourceError::PermissionDenied(format!(
            "{what}: camera permission not granted"
        ))),
        s if s <= AR_UNAVAILABLE_FIRST => Err(SourceError::Unsupported(format!(
            "{what}: ARCore unavailable (status {s})"
        ))),
        s => Err(SourceError::Platform(format!("{what} failed with status {s}"))),
    }
}

mod egl {
    use std::ffi::c_void;

    pub type EGLDisplay = *mut c_void;
    pub type EGLConfig = *mut c_void;
    pub type EGLContext = *mut c_void;
    pub type EGLSurface = *mut c_void;
    pub type EGLint = i32;
    pub type EGLBoolean = u32;

    pub const EGL_FALSE: EGLBoolean = 0;
    pub const EGL_NONE: EGLint = 0x3038;
    pub const EGL_SURFACE_TYPE: EGLint = 0x3033;
    pub const EGL_PBUFFER_BIT: EGLint = 0x0001;
    pub const EGL_RENDERABLE_TYPE: EGLint = 0x3040;
    pub const EGL_OPENGL_ES2_BIT: EGLint = 0x0004;
    pub const EGL_WIDTH: EGLint = 0x3057;
    pub const EGL_HEIGHT: EGLint = 0x3056;
    pub const EGL_CONTEXT_CLIENT_VERSION: EGLint = 0x3098;

    #[link(name = "EGL")]
    extern "C" {
        pub fn eglGetDisplay(display_id: *mut c_void) -> EGLDisplay;
        pub fn eglInitialize(dpy: EGLDisplay, major: *mut EGLint, minor: *mut EGLint) -> EGLBoolean;
        pub fn eglChooseConfig(
            dpy: EGLDisplay,
            attrib_list: *const EGLint,
            configs: *mut EGLConfig,
            config_size: EGLint,
            num_config: *mut EGLint,
        ) -> EGLBoolean;
        pub fn eglCreateContext(
            dpy: EGLDisplay,
            config: EGLConfig,
            share_context: EGLContext,
            attrib_list: *const EGLint,
        ) -> EGLContext;
        pub fn eglCreatePbufferSurface(
            dpy: EGLDisplay,
            config: EGLConfig,
            attrib_list: *const EGLint,
        ) -> EGLSurface;
        pub fn eglMakeCurrent(
            dpy: EGLDisplay,
            draw: EGLSurface,
            read: EGLSurface,
            ctx: EGLContext,
        ) -> EGLBoolean;
        pub fn eglDestroySurface(dpy: EGLDisplay, surface: EGLSurface) -> EGLBoolean;
        pub fn eglDestroyContext(dpy: EGLDisplay, ctx: EGLContext) -> EGLBoolean;
        pub fn eglGetError() -> EGLint;
    }

    #[link(name = "GLESv2")]
    extern "C" {
        pub fn glGenTextures(n: i32, textures: *mut u32);
        pub fn glDeleteTextures(n: i32, textures: *const u32);
    }
}

/// Off-screen GL context with the camera texture ARCore renders into
struct GlContext {
    display: egl::EGLDisplay,
    context: egl::EGLContext,
    surface: egl::EGLSurface,
    texture: u32,
}

impl GlContext {
    fn create() -> Result<Self, SourceError> {
        use egl::*;

        unsafe {
            let display = eglGetDisplay(ptr::null_mut());
            if display.is_null() || eglInitialize(display, ptr::null_mut(), ptr::null_mut()) == EGL_FALSE {
                return Err(egl_error("eglInitialize"));
            }

            let config_attribs = [
                EGL_RENDERABLE_TYPE,
                EGL_OPENGL_ES2_BIT,
                EGL_SURFACE_TYPE,
                EGL_PBUFFER_BIT,
                EGL_NONE,
            ];
            let mut config: EGLConfig = ptr::null_mut();
            let mut num_configs: EGLint = 0;
            if eglChooseConfig(display, config_attribs.as_ptr(), &mut config, 1, &mut num_configs)
                == EGL_FALSE
                || num_configs == 0
            {
                return Err(egl_error("eglChooseConfig"));
            }

            let context_attribs = [EGL_CONTEXT_CLIENT_VERSION, 2, EGL_NONE];
            let context = eglCreateContext(display, config, ptr::null_mut(), context_attribs.as_ptr());
            if context.is_null() {
                return Err(egl_error("eglCreateContext"));
            }

            let surface_attribs = [EGL_WIDTH, 1, EGL_HEIGHT, 1, EGL_NONE];
            let surface = eglCreatePbufferSurface(display, config, surface_attribs.as_ptr());
            if surface.is_null() {
                eglDestroyContext(display, context);
                return Err(egl_error("eglCreatePbufferSurface"));
            }

            let mut gl = GlContext {
                display,
                context,
                surface,
                texture: 0,
            };
            gl.make_current()?;
            glGenTextures(1, &mut gl.texture);
            gl.release_current();
            Ok(gl)
        }
    }

    fn make_current(&self) -> Result<(), SourceError> {
        let ok = unsafe { egl::eglMakeCurrent(self.display, self.surface, self.surface, self.context) };
        if ok == egl::EGL_FALSE {
            return Err(egl_error("eglMakeCurrent"));
        }
        Ok(())
    }

    fn release_current(&self) {
        unsafe {
            egl::eglMakeCurrent(self.display, ptr::null_mut(), ptr::null_mut(), ptr::null_mut());
        }
    }

    fn destroy(&mut self) {
        if self.context.is_null() {
            return;
        }
        unsafe {
            if self.texture != 0 && self.make_current().is_ok() {
                egl::glDeleteTextures(1, &self.texture);
            }
            self.release_current();
            egl::eglDestroySurface(self.display, self.surface);
            egl::eglDestroyContext(self.display, self.context);
        }
        self.texture = 0;
        self.surface = ptr::null_mut();
        self.context = ptr::null_mut();
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn egl_error(call: &str) -> SourceError {
    let code = unsafe { egl::eglGetError() };
    SourceError::Platform(format!("{call} failed (EGL error 0x{code:x})"))
}

fn jni_error(what: &str, e: jni::errors::Error) -> SourceError {
    SourceError::Platform(format!("{what}: {e}"))
}

/// ARCore world tracking
pub struct ArCorePlatform {
    vm: JavaVM,
    activity: GlobalRef,
}

impl ArCorePlatform {
    /// Build from the `JNIEnv` and activity handed to the host's native entry point.
    ///
    /// # Safety
    /// `env` must be a valid `JNIEnv` for the calling thread and `activity` a
    /// live local or global reference to the hosting activity.
    pub unsafe fn from_host(
        env: *mut sys::JNIEnv,
        activity: sys::jobject,
    ) -> Result<Self, SourceError> {
        let env = JNIEnv::from_raw(env).map_err(|e| jni_error("invalid JNIEnv", e))?;
        let vm = env
            .get_java_vm()
            .map_err(|e| jni_error("GetJavaVM failed", e))?;
        let activity = env
            .new_global_ref(JObject::from_raw(activity))
            .map_err(|e| jni_error("NewGlobalRef on activity failed", e))?;
        Ok(Self { vm, activity })
    }

    /// `JNIEnv` for the calling thread, attaching it to the VM if needed
    fn thread_env(&self) -> Result<*mut sys::JNIEnv, SourceError> {
        let env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_error("AttachCurrentThread failed", e))?;
        Ok(env.get_raw())
    }
}

impl TrackingPlatform for ArCorePlatform {
    type Session = ArCoreSession;

    fn name(&self) -> &'static str {
        "arcore"
    }

    fn is_supported(&self) -> bool {
        let env = match self.thread_env() {
            Ok(env) => env,
            Err(e) => {
                log::warn!("ARCore availability check skipped: {}", e);
                return false;
            }
        };
        let mut availability = 0;
        unsafe {
            ArCoreApk_checkAvailability(env, self.activity.as_obj().as_raw(), &mut availability);
        }
        availability == AR_AVAILABILITY_SUPPORTED_INSTALLED
    }

    fn create_session(&self) -> Result<ArCoreSession, SourceError> {
        let env = self.thread_env()?;
        let mut gl = GlContext::create()?;

        let mut session: *mut ArSession = ptr::null_mut();
        let status =
            unsafe { ArSession_create(env, self.activity.as_obj().as_raw(), &mut session) };
        if let Err(e) = check_status(status, "ArSession_create") {
            gl.destroy();
            return Err(e);
        }

        let mut frame: *mut ArFrame = ptr::null_mut();
        unsafe {
            ArSession_setCameraTextureName(session, gl.texture);
            ArFrame_create(session, &mut frame);
        }

        Ok(ArCoreSession {
            session,
            frame,
            camera: ptr::null_mut(),
            gl,
            resumed: false,
        })
    }
}

pub struct ArCoreSession {
    session: *mut ArSession,
    frame: *mut ArFrame,
    camera: *mut ArCamera,
    gl: GlContext,
    resumed: bool,
}

// The session is exclusively owned; ARCore calls are serialized through &mut self.
unsafe impl Send for ArCoreSession {}

impl ArCoreSession {
    fn release_camera(&mut self) {
        if !self.camera.is_null() {
            unsafe { ArCamera_release(self.camera) };
            self.camera = ptr::null_mut();
        }
    }

    fn update(&mut self) -> Result<(), SourceError> {
        self.gl.make_current()?;
        let status = unsafe { ArSession_update(self.session, self.frame) };
        self.gl.release_current();
        check_status(status, "ArSession_update")
    }
}

impl CalibrationSource for ArCoreSession {
    fn current_tracking_state(&mut self) -> Result<TrackingState, SourceError> {
        if self.session.is_null() {
            return Err(SourceError::platform("session already closed"));
        }
        if !self.resumed {
            return Ok(TrackingState::Paused);
        }

        self.release_camera();
        match self.update() {
            Ok(()) => {}
            Err(SourceError::NotYetAvailable) => return Ok(TrackingState::NotTracking),
            Err(e) => return Err(e),
        }

        let mut state = 0;
        unsafe {
            ArFrame_acquireCamera(self.session, self.frame, &mut self.camera);
            ArCamera_getTrackingState(self.session, self.camera, &mut state);
        }

        Ok(match state {
            AR_TRACKING_STATE_TRACKING => TrackingState::Tracking,
            AR_TRACKING_STATE_PAUSED => TrackingState::Paused,
            _ => TrackingState::NotTracking,
        })
    }

    fn current_frame_intrinsics(&mut self) -> Result<FrameIntrinsics, SourceError> {
        if self.camera.is_null() {
            return Err(SourceError::NotYetAvailable);
        }

        let (mut fx, mut fy, mut cx, mut cy) = (0f32, 0f32, 0f32, 0f32);
        let (mut width, mut height) = (0i32, 0i32);
        unsafe {
            let mut intrinsics: *mut ArCameraIntrinsics = ptr::null_mut();
            ArCameraIntrinsics_create(self.session, &mut intrinsics);
            ArCamera_getImageIntrinsics(self.session, self.camera, intrinsics);
            ArCameraIntrinsics_getFocalLength(self.session, intrinsics, &mut fx, &mut fy);
            ArCameraIntrinsics_getPrincipalPoint(self.session, intrinsics, &mut cx, &mut cy);
            ArCameraIntrinsics_getImageDimensions(self.session, intrinsics, &mut width, &mut height);
            ArCameraIntrinsics_destroy(intrinsics);
        }

        if width <= 0 || height <= 0 {
            return Err(SourceError::NotYetAvailable);
        }

        Ok(FrameIntrinsics::new(
            (f64::from(fx), f64::from(fy)),
            (f64::from(cx), f64::from(cy)),
            (width as u32, height as u32),
        ))
    }

    fn rear_camera_distortion_coefficients(&self) -> Option<Vec<f64>> {
        camera2::rear_camera_distortion()
    }
}

impl TrackingSession for ArCoreSession {
    fn start(&mut self, config: &SessionConfiguration) -> Result<(), SourceError> {
        let update_mode = match config.update_mode {
            UpdateMode::LatestCameraImage => AR_UPDATE_MODE_LATEST_CAMERA_IMAGE,
        };
        // ARCore world tracking is always gravity aligned.

        unsafe {
            let mut ar_config: *mut ArConfig = ptr::null_mut();
            ArConfig_create(self.session, &mut ar_config);
            ArConfig_setUpdateMode(self.session, ar_config, update_mode);
            let status = ArSession_configure(self.session, ar_config);
            ArConfig_destroy(ar_config);
            check_status(status, "ArSession_configure")?;

            check_status(ArSession_resume(self.session), "ArSession_resume")?;
        }

        self.resumed = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), SourceError> {
        if !self.resumed || self.session.is_null() {
            return Ok(());
        }
        self.resumed = false;
        check_status(unsafe { ArSession_pause(self.session) }, "ArSession_pause")
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.release_camera();
        unsafe {
            if !self.frame.is_null() {
                ArFrame_destroy(self.frame);
                self.frame = ptr::null_mut();
            }
            if !self.session.is_null() {
                ArSession_destroy(self.session);
                self.session = ptr::null_mut();
            }
        }
        self.gl.destroy();
        Ok(())
    }
}

/// Static lens characteristics through the NDK camera2 API
mod camera2 {
    use super::*;

    #[repr(C)]
    struct ACameraManager {
        _private: [u8; 0],
    }
    #[repr(C)]
    struct ACameraMetadata {
        _private: [u8; 0],
    }
    #[repr(C)]
    struct ACameraIdList {
        num_cameras: c_int,
        camera_ids: *const *const c_char,
    }
    #[repr(C)]
    struct ACameraMetadataConstEntry {
        tag: u32,
        data_type: u8,
        count: u32,
        data: *const c_void,
    }

    const ACAMERA_OK: i32 = 0;
    const ACAMERA_LENS_START: u32 = 8 << 16;
    const ACAMERA_LENS_FACING: u32 = ACAMERA_LENS_START + 5;
    const ACAMERA_LENS_RADIAL_DISTORTION: u32 = ACAMERA_LENS_START + 11;
    const ACAMERA_LENS_DISTORTION: u32 = ACAMERA_LENS_START + 13;
    const ACAMERA_LENS_FACING_BACK: u8 = 1;

    #[link(name = "camera2ndk")]
    extern "C" {
        fn ACameraManager_create() -> *mut ACameraManager;
        fn ACameraManager_delete(manager: *mut ACameraManager);
        fn ACameraManager_getCameraIdList(
            manager: *mut ACameraManager,
            out: *mut *mut ACameraIdList,
        ) -> i32;
        fn ACameraManager_deleteCameraIdList(list: *mut ACameraIdList);
        fn ACameraManager_getCameraCharacteristics(
            manager: *mut ACameraManager,
            camera_id: *const c_char,
            out: *mut *mut ACameraMetadata,
        ) -> i32;
        fn ACameraMetadata_getConstEntry(
            metadata: *const ACameraMetadata,
            tag: u32,
            out: *mut ACameraMetadataConstEntry,
        ) -> i32;
        fn ACameraMetadata_free(metadata: *mut ACameraMetadata);
    }

    unsafe fn entry(metadata: *const ACameraMetadata, tag: u32) -> Option<ACameraMetadataConstEntry> {
        let mut entry = ACameraMetadataConstEntry {
            tag: 0,
            data_type: 0,
            count: 0,
            data: ptr::null(),
        };
        if ACameraMetadata_getConstEntry(metadata, tag, &mut entry) != ACAMERA_OK
            || entry.count == 0
            || entry.data.is_null()
        {
            return None;
        }
        Some(entry)
    }

    unsafe fn floats(entry: &ACameraMetadataConstEntry) -> Vec<f64> {
        std::slice::from_raw_parts(entry.data as *const f32, entry.count as usize)
            .iter()
            .map(|&v| f64::from(v))
            .collect()
    }

    unsafe fn back_facing_distortion(metadata: *const ACameraMetadata) -> Option<Vec<f64>> {
        let facing = entry(metadata, ACAMERA_LENS_FACING)?;
        if *(facing.data as *const u8) != ACAMERA_LENS_FACING_BACK {
            return None;
        }
        entry(metadata, ACAMERA_LENS_DISTORTION)
            .or_else(|| entry(metadata, ACAMERA_LENS_RADIAL_DISTORTION))
            .map(|e| floats(&e))
    }

    /// First back-facing camera that publishes distortion wins.
    pub(super) fn rear_camera_distortion() -> Option<Vec<f64>> {
        unsafe {
            let manager = ACameraManager_create();
            if manager.is_null() {
                return None;
            }

            let mut list: *mut ACameraIdList = ptr::null_mut();
            if ACameraManager_getCameraIdList(manager, &mut list) != ACAMERA_OK || list.is_null() {
                ACameraManager_delete(manager);
                return None;
            }

            let ids = std::slice::from_raw_parts((*list).camera_ids, (*list).num_cameras.max(0) as usize);
            let mut found = None;
            for &id in ids {
                let mut metadata: *mut ACameraMetadata = ptr::null_mut();
                if ACameraManager_getCameraCharacteristics(manager, id, &mut metadata) != ACAMERA_OK {
                    log::debug!(
                        "No characteristics for camera {}",
                        CStr::from_ptr(id).to_string_lossy()
                    );
                    continue;
                }
                found = back_facing_distortion(metadata);
                ACameraMetadata_free(metadata);
                if found.is_some() {
                    break;
                }
            }

            ACameraManager_deleteCameraIdList(list);
            ACameraManager_delete(manager);
            found
        }
    }
}
