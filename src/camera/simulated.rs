use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Local;
use image::{ImageFormat, Rgb, RgbImage};
use tracing::info;

use super::{Camera, ensure_dir, render_template};
use crate::error::CameraError;

#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    Prepare { at: Instant },
    Capture { at: Instant, path: Option<PathBuf> },
    Close,
}

#[derive(Debug, Default)]
struct Shared {
    calls: Vec<CameraCall>,
    fail_prepare: bool,
    fail_capture: bool,
}

/// Camera that writes a small generated JPEG instead of exposing a sensor.
#[derive(Debug)]
pub struct SimulatedCamera {
    shared: Arc<Mutex<Shared>>,
    closed: bool,
}

/// Observes and steers a [`SimulatedCamera`] after it moved into the controller.
#[derive(Debug, Clone)]
pub struct SimulatedCameraHandle {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedCamera {
    pub fn new() -> (Self, SimulatedCameraHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
                closed: false,
            },
            SimulatedCameraHandle { shared },
        )
    }

    fn write_frame(path: &Path) -> Result<(), CameraError> {
        let frame = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        frame
            .save_with_format(path, ImageFormat::Jpeg)
            .map_err(|err| CameraError::Device(err.to_string()))
    }
}

impl SimulatedCameraHandle {
    pub fn calls(&self) -> Vec<CameraCall> {
        lock(&self.shared).calls.clone()
    }

    pub fn captures(&self) -> Vec<PathBuf> {
        lock(&self.shared)
            .calls
            .iter()
            .filter_map(|call| match call {
                CameraCall::Capture { path, .. } => path.clone(),
                _ => None,
            })
            .collect()
    }

    pub fn fail_prepare(&self, fail: bool) {
        lock(&self.shared).fail_prepare = fail;
    }

    pub fn fail_capture(&self, fail: bool) {
        lock(&self.shared).fail_capture = fail;
    }
}

impl Camera for SimulatedCamera {
    fn prepare(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        let mut shared = lock(&self.shared);
        shared.calls.push(CameraCall::Prepare { at: Instant::now() });
        if shared.fail_prepare {
            return Err(CameraError::Device("simulated prepare failure".into()));
        }
        Ok(())
    }

    fn capture(&mut self, dir: &Path, name_template: &str) -> Result<PathBuf, CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        let at = Instant::now();
        if lock(&self.shared).fail_capture {
            lock(&self.shared)
                .calls
                .push(CameraCall::Capture { at, path: None });
            return Err(CameraError::Device("simulated capture failure".into()));
        }
        ensure_dir(dir)?;
        let path = dir.join(render_template(name_template, Local::now())?);
        Self::write_frame(&path)?;
        lock(&self.shared).calls.push(CameraCall::Capture {
            at,
            path: Some(path.clone()),
        });
        info!(path = %path.display(), "simulated picture captured");
        Ok(path)
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if !self.closed {
            self.closed = true;
            lock(&self.shared).calls.push(CameraCall::Close);
        }
        Ok(())
    }
}
