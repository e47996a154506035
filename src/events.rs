use std::path::PathBuf;
use std::time::{Instant, SystemTime};

/// A picture produced by the camera, handed to the distribution worker.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub created_at: SystemTime,
}

/// Inputs posted by edge callbacks to the capture controller thread.
#[derive(Debug, Clone, Copy)]
pub enum ControlInput {
    /// An accepted trigger edge; the gate is already armed.
    Trigger { at: Instant },
    Shutdown,
}

/// Observable controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Arming,
    Countdown(u8),
    Exposing,
    Cooldown,
    Shutdown,
}
