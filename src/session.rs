//! Tracking session lifecycle
//!
//! [`SessionLifecycleManager`] is the only owner of a live session. A
//! [`SessionHandle`] is not `Clone`; releasing it pauses and closes the
//! underlying session exactly once, and dropping an unreleased handle
//! releases it, so every exit path of an acquisition tears the session down.

use crate::errors::{AcquisitionError, SourceError};
use crate::platform::{TrackingPlatform, TrackingSession};
pub use crate::platform::SessionConfiguration;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Running,
    Released,
}

pub struct SessionHandle<S: TrackingSession> {
    id: Uuid,
    session: S,
    state: SessionState,
    opened_at: Instant,
}

impl<S: TrackingSession> SessionHandle<S> {
    fn new(session: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            state: SessionState::Created,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Started and not yet released
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_released(&self) -> bool {
        self.state == SessionState::Released
    }

    /// Calibration reads against this session
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.session
    }

    fn start(&mut self, config: &SessionConfiguration) -> Result<(), SourceError> {
        self.session.start(config)?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Pause (if running) and close. Idempotent; teardown errors are logged
    /// and swallowed so they never replace the caller's result.
    fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }

        if self.state == SessionState::Running {
            if let Err(e) = self.session.pause() {
                log::warn!("Session {}: error pausing during teardown: {}", self.id, e);
            }
        }
        if let Err(e) = self.session.close() {
            log::warn!("Session {}: error closing during teardown: {}", self.id, e);
        }

        self.state = SessionState::Released;
        log::info!(
            "Session {} released after {}ms",
            self.id,
            self.opened_at.elapsed().as_millis()
        );
    }
}

impl<S: TrackingSession> Drop for SessionHandle<S> {
    fn drop(&mut self) {
        if !self.is_released() {
            log::debug!("Session {} dropped while still held, releasing", self.id);
            self.release();
        }
    }
}

impl<S: TrackingSession> std::fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

pub struct SessionLifecycleManager<P: TrackingPlatform> {
    platform: Arc<P>,
    config: SessionConfiguration,
}

impl<P: TrackingPlatform> SessionLifecycleManager<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            config: SessionConfiguration::default(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn configuration(&self) -> &SessionConfiguration {
        &self.config
    }

    /// Create, configure and start a session.
    ///
    /// A session that was created but failed to start is released before
    /// the error is returned.
    pub fn acquire(&self) -> Result<SessionHandle<P::Session>, AcquisitionError> {
        if !self.platform.is_supported() {
            return Err(AcquisitionError::session_start(SourceError::Unsupported(
                format!("{} tracking is not available on this device", self.platform.name()),
            )));
        }

        let session = self
            .platform
            .create_session()
            .map_err(AcquisitionError::session_start)?;

        let mut handle = SessionHandle::new(session);
        if let Err(e) = handle.start(&self.config) {
            log::error!("Session {} failed to start: {}", handle.id, e);
            handle.release();
            return Err(AcquisitionError::session_start(e));
        }

        log::info!(
            "Session {} started on {} ({:?}, {:?})",
            handle.id,
            self.platform.name(),
            self.config.update_mode,
            self.config.world_alignment
        );
        Ok(handle)
    }

    /// Pause and close the session. Safe to call more than once.
    pub fn release(&self, handle: &mut SessionHandle<P::Session>) {
        handle.release();
    }
}
