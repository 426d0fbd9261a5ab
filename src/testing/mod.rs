//! Testing utilities for CrabIntrinsics
//!
//! A scripted, in-memory tracking platform so the acquisition protocol can be
//! exercised without AR hardware. Sample values follow a 1280x720 rear camera.

pub mod scripted;

pub use scripted::{
    sample_distortion, sample_intrinsics, ScriptedCounters, ScriptedPlatform, ScriptedSession,
    Step,
};
