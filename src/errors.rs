use std::fmt;

/// Failure reported by a platform tracking capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Frame data exists but the estimator has not produced intrinsics yet.
    #[error("camera intrinsics not yet available")]
    NotYetAvailable,
    #[error("AR tracking not supported: {0}")]
    Unsupported(String),
    #[error("camera permission not granted: {0}")]
    PermissionDenied(String),
    #[error("tracking subsystem error: {0}")]
    Platform(String),
}

impl SourceError {
    pub fn platform(message: impl Into<String>) -> Self {
        SourceError::Platform(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::NotYetAvailable)
    }
}

/// Stable classification of a failed acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SessionStart,
    IntrinsicsUnavailable,
    Unexpected,
    AlreadyInProgress,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SessionStart => "session_start",
            FailureKind::IntrinsicsUnavailable => "intrinsics_unavailable",
            FailureKind::Unexpected => "unexpected",
            FailureKind::AlreadyInProgress => "already_in_progress",
        }
    }

    /// Whether a fresh call later has a reasonable chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::IntrinsicsUnavailable | FailureKind::AlreadyInProgress
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionError {
    pub kind: FailureKind,
    pub message: String,
    /// Underlying capability error, when the failure came from the platform
    pub cause: Option<SourceError>,
}

impl AcquisitionError {
    pub fn session_start(cause: SourceError) -> Self {
        Self {
            kind: FailureKind::SessionStart,
            message: format!("failed to start tracking session: {cause}"),
            cause: Some(cause),
        }
    }

    pub fn intrinsics_unavailable() -> Self {
        Self {
            kind: FailureKind::IntrinsicsUnavailable,
            message: "no confirmed tracking within attempt budget".to_string(),
            cause: None,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unexpected,
            message: message.into(),
            cause: None,
        }
    }

    pub fn from_source(cause: SourceError) -> Self {
        Self {
            kind: FailureKind::Unexpected,
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    pub fn already_in_progress() -> Self {
        Self {
            kind: FailureKind::AlreadyInProgress,
            message: "an intrinsics acquisition is already in progress".to_string(),
            cause: None,
        }
    }

    pub fn poisoned_lock() -> Self {
        Self::unexpected("lock poisoned by previous panic")
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(String),
    ParseError(String),
    WriteError(String),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ReadError(msg) => write!(f, "Failed to read config: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Failed to write config: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
