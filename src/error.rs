use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`crate::hardware::HardwareIo`] backend.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The pin was never configured for the requested direction.
    #[error("pin {0} is not configured for this operation")]
    UnknownPin(u32),

    /// No PWM channel is mapped to the pin.
    #[error("pin {0} has no PWM channel")]
    NoPwmChannel(u32),

    /// PWM duty cycles are fractions in `0.0..=1.0`.
    #[error("PWM level {0} is outside 0.0..=1.0")]
    LevelOutOfRange(f32),

    /// The backend was released; no further operations are accepted.
    #[error("hardware has been released")]
    Released,

    /// Reading or writing a sysfs attribute failed.
    #[error("sysfs access to {path} failed: {source}")]
    Sysfs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected value '{value}' in {path}")]
    Parse { path: PathBuf, value: String },
}

/// Failures reported by a [`crate::camera::Camera`].
#[derive(Debug, Error)]
pub enum CameraError {
    /// The destination directory could not be created.
    #[error("failed to create picture directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capture helper could not be started.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The capture helper ran but reported failure.
    #[error("'{program}' exited with status {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The helper claimed success but left no picture behind.
    #[error("camera reported success but {0} does not exist")]
    MissingOutput(PathBuf),

    /// The file name template holds an unknown `strftime` specifier.
    #[error("invalid picture name template '{0}'")]
    Template(String),

    #[error("camera is closed")]
    Closed,

    /// Simulated device failure.
    #[error("camera device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a capture sequence ends early.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Shutdown was requested while the sequence was running.
    #[error("capture sequence cancelled by shutdown")]
    Cancelled,
}
