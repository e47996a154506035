//! Still cameras: the on-board sensor, a tethered camera and a simulator.

mod command;
mod simulated;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::config::CameraConfig;
use crate::error::CameraError;

pub use command::CommandCamera;
pub use simulated::{CameraCall, SimulatedCamera, SimulatedCameraHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraKind {
    /// Raspberry Pi camera module driven by `rpicam-still`.
    #[default]
    IntegratedSensor,
    /// USB camera driven by `gphoto2`.
    Tethered,
    Simulated,
}

pub trait Camera: Send {
    /// Called at the start of every sequence, before the countdown.
    fn prepare(&mut self) -> Result<(), CameraError>;

    /// Take one picture into `dir`, naming it by rendering `name_template`
    /// with the current local time. `dir` is created when missing.
    fn capture(&mut self, dir: &Path, name_template: &str) -> Result<PathBuf, CameraError>;

    fn close(&mut self) -> Result<(), CameraError>;
}

/// Build the camera selected in the configuration.
pub fn open(cfg: &CameraConfig) -> Result<Box<dyn Camera>> {
    Ok(match cfg.kind {
        CameraKind::IntegratedSensor => Box::new(CommandCamera::integrated_sensor(cfg)?),
        CameraKind::Tethered => Box::new(CommandCamera::tethered(cfg)),
        CameraKind::Simulated => Box::new(SimulatedCamera::new().0),
    })
}

/// `true` when `template` only uses known `strftime` specifiers.
pub fn is_valid_template(template: &str) -> bool {
    !StrftimeItems::new(template).any(|item| matches!(item, Item::Error))
}

/// Render a `strftime` template.
pub fn render_template(template: &str, now: DateTime<Local>) -> Result<String, CameraError> {
    let mut out = String::new();
    write!(out, "{}", now.format(template))
        .map_err(|_| CameraError::Template(template.to_string()))?;
    Ok(out)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), CameraError> {
    std::fs::create_dir_all(dir).map_err(|source| CameraError::Directory {
        path: dir.to_path_buf(),
        source,
    })
}
