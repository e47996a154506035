use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info};

use super::{Camera, ensure_dir, render_template};
use crate::config::CameraConfig;
use crate::error::CameraError;

const SENSOR_PROGRAM: &str = "rpicam-still";
const SENSOR_ARGS: &[&str] = &[
    "--nopreview",
    "--timeout",
    "1",
    "--width",
    "{width}",
    "--height",
    "{height}",
    "--output",
    "{output}",
];

const TETHERED_PROGRAM: &str = "gphoto2";
const TETHERED_ARGS: &[&str] = &[
    "--capture-image-and-download",
    "--force-overwrite",
    "--filename",
    "{output}",
];
const TETHERED_PREPARE: &[&str] = &["gphoto2", "--auto-detect"];

/// Camera driven by an external still-capture helper program.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    prepare: Option<Vec<String>>,
    width: u32,
    height: u32,
    closed: bool,
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

impl CommandCamera {
    /// On-board sensor at the full still resolution of its generation.
    pub fn integrated_sensor(cfg: &CameraConfig) -> Result<Self> {
        let (width, height) = cfg.sensor_resolution()?;
        Ok(Self {
            program: cfg.program.clone().unwrap_or_else(|| SENSOR_PROGRAM.into()),
            args: cfg.args.clone().unwrap_or_else(|| owned(SENSOR_ARGS)),
            prepare: cfg.prepare_command.clone(),
            width,
            height,
            closed: false,
        })
    }

    pub fn tethered(cfg: &CameraConfig) -> Self {
        Self {
            program: cfg
                .program
                .clone()
                .unwrap_or_else(|| TETHERED_PROGRAM.into()),
            args: cfg.args.clone().unwrap_or_else(|| owned(TETHERED_ARGS)),
            prepare: Some(
                cfg.prepare_command
                    .clone()
                    .unwrap_or_else(|| owned(TETHERED_PREPARE)),
            ),
            width: 0,
            height: 0,
            closed: false,
        }
    }

    /// Helper arguments with placeholders substituted.
    pub fn render_args(&self, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{width}", &self.width.to_string())
                    .replace("{height}", &self.height.to_string())
            })
            .collect()
    }

    fn run(program: &str, args: &[String]) -> Result<(), CameraError> {
        debug!(program, ?args, "running camera helper");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| CameraError::Spawn {
                program: program.to_string(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CameraError::CommandFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Camera for CommandCamera {
    fn prepare(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        match self.prepare.as_deref() {
            Some([program, args @ ..]) => Self::run(program, args),
            _ => Ok(()),
        }
    }

    fn capture(&mut self, dir: &Path, name_template: &str) -> Result<PathBuf, CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        ensure_dir(dir)?;
        let path = dir.join(render_template(name_template, Local::now())?);
        Self::run(&self.program, &self.render_args(&path))?;
        if !path.exists() {
            return Err(CameraError::MissingOutput(path));
        }
        info!(path = %path.display(), program = %self.program, "picture captured");
        Ok(path)
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_args_carry_resolution() {
        let cfg = CameraConfig {
            sensor_version: 2,
            ..CameraConfig::default()
        };
        let cam = CommandCamera::integrated_sensor(&cfg).unwrap();
        let args = cam.render_args(Path::new("/tmp/a.jpeg"));
        assert!(args.windows(2).any(|w| w == ["--width", "3280"]));
        assert!(args.windows(2).any(|w| w == ["--height", "2464"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/a.jpeg"));
    }

    #[test]
    fn tethered_prepares_with_auto_detect() {
        let cam = CommandCamera::tethered(&CameraConfig::default());
        assert_eq!(
            cam.prepare.as_deref(),
            Some(&["gphoto2".to_string(), "--auto-detect".to_string()][..])
        );
        assert_eq!(cam.render_args(Path::new("x.jpeg"))[0], "--capture-image-and-download");
    }

    #[cfg(unix)]
    #[test]
    fn capture_runs_the_helper_and_checks_output() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = CameraConfig {
            program: Some("sh".into()),
            args: Some(vec!["-c".into(), "printf jpeg > \"$0\"".into(), "{output}".into()]),
            ..CameraConfig::default()
        };
        let mut cam = CommandCamera::integrated_sensor(&cfg).unwrap();
        cam.prepare().unwrap();
        let dir = tmp.path().join("nested").join("day");
        let path = cam.capture(&dir, "shot.jpeg").unwrap();
        assert_eq!(path, dir.join("shot.jpeg"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "jpeg");
    }

    #[cfg(unix)]
    #[test]
    fn failing_helper_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = CameraConfig {
            program: Some("sh".into()),
            args: Some(vec!["-c".into(), "echo boom >&2; exit 3".into()]),
            ..CameraConfig::default()
        };
        let mut cam = CommandCamera::integrated_sensor(&cfg).unwrap();
        match cam.capture(tmp.path(), "shot.jpeg") {
            Err(CameraError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn closed_camera_refuses_work() {
        let mut cam = CommandCamera::tethered(&CameraConfig::default());
        cam.close().unwrap();
        assert!(matches!(cam.prepare(), Err(CameraError::Closed)));
    }
}
