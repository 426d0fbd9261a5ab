/// Camera permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The user has not been asked yet, or the platform answers only at session start
    NotDetermined,
    /// Blocked by system policy (parental controls, MDM)
    Restricted,
}

impl PermissionStatus {
    /// Whether an acquisition can still succeed under this status
    pub fn allows_capture(&self) -> bool {
        matches!(self, PermissionStatus::Granted | PermissionStatus::NotDetermined)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
}

/// Check camera permission status for the current platform
pub fn check_permission() -> PermissionStatus {
    check_permission_detailed().status
}

pub fn check_permission_detailed() -> PermissionInfo {
    #[cfg(target_os = "ios")]
    {
        check_permission_ios()
    }

    #[cfg(target_os = "android")]
    {
        // Needs a JNI round trip; ARCore reports a missing grant when the
        // session resumes, which surfaces as CAMERA_PERMISSION_NOT_GRANTED.
        PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Checked by ARCore when the session starts".to_string(),
        }
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "No AR camera on this platform".to_string(),
        }
    }
}

#[cfg(target_os = "ios")]
fn check_permission_ios() -> PermissionInfo {
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};
    use std::ffi::c_char;

    let (Some(device_class), Some(string_class)) =
        (Class::get("AVCaptureDevice"), Class::get("NSString"))
    else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "AVFoundation not available".to_string(),
        };
    };

    // AVMediaTypeVideo
    let media_name = b"vide\0".as_ptr() as *const c_char;

    // AVAuthorizationStatus: 0 not determined, 1 restricted, 2 denied, 3 authorized
    let auth_status: isize = unsafe {
        let media_type: *mut Object = msg_send![string_class, stringWithUTF8String: media_name];
        msg_send![device_class, authorizationStatusForMediaType: media_type]
    };

    match auth_status {
        3 => PermissionInfo {
            status: PermissionStatus::Granted,
            message: "Camera access authorized".to_string(),
        },
        2 => PermissionInfo {
            status: PermissionStatus::Denied,
            message: "Camera access denied - enable it in Settings > Privacy > Camera".to_string(),
        },
        1 => PermissionInfo {
            status: PermissionStatus::Restricted,
            message: "Camera access restricted by system policy".to_string(),
        },
        _ => PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Camera permission not yet requested".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_allowed_statuses() {
        assert!(PermissionStatus::Granted.allows_capture());
        assert!(PermissionStatus::NotDetermined.allows_capture());
        assert!(!PermissionStatus::Denied.allows_capture());
        assert!(!PermissionStatus::Restricted.allows_capture());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PermissionStatus::NotDetermined.to_string(), "not_determined");
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    #[test]
    fn test_desktop_is_not_determined() {
        assert_eq!(check_permission(), PermissionStatus::NotDetermined);
    }
}
