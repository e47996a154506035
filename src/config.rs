use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::camera::{self, CameraKind};
use crate::hardware::Edge;

/// Top-level configuration of the capture station.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Which GPIO/PWM backend drives the pins.
    pub hardware: HardwareConfig,
    /// Pin assignments for buttons, indicators, lamp and digit display.
    pub pins: PinConfig,
    /// Camera selection and capture helper overrides.
    pub camera: CameraConfig,
    /// Where captured pictures land and how they are named.
    pub pictures: PictureLayout,
    /// Countdown pacing and re-trigger protection.
    pub timing: CaptureTiming,
    pub lamp: LampConfig,
    /// Display derivative and remote notification settings.
    pub distribution: DistributionConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&self.lamp.idle_level),
            "lamp.idle-level must be within 0.0..=1.0"
        );
        ensure!(
            self.pins.trigger != self.pins.shutdown,
            "pins.trigger and pins.shutdown must differ"
        );
        let mut seen = BTreeMap::new();
        for (role, pin) in self.pins.assignments() {
            if let Some(other) = seen.insert(pin, role) {
                anyhow::bail!("pins.{other} and pins.{role} both use gpio {pin}");
            }
        }
        if self.hardware.backend == HardwareBackend::Sysfs {
            ensure!(
                self.hardware.pwm_channels.contains_key(&self.pins.lamp),
                "pins.lamp (gpio {}) has no entry in hardware.pwm-channels",
                self.pins.lamp
            );
        }
        let [width, height] = self.distribution.display_size;
        ensure!(
            width > 0 && height > 0,
            "distribution.display-size must be positive"
        );
        ensure!(
            !self.distribution.remote.trim().is_empty(),
            "distribution.remote must not be empty"
        );
        ensure!(
            !self.pictures.name_template.trim().is_empty(),
            "pictures.name-template must not be empty"
        );
        ensure!(
            !self.pictures.directory_template.trim().is_empty(),
            "pictures.directory-template must not be empty"
        );
        ensure!(
            camera::is_valid_template(&self.pictures.name_template)
                && camera::is_valid_template(&self.pictures.directory_template),
            "pictures templates must only use strftime specifiers"
        );
        ensure!(
            self.hardware.poll_interval > Duration::ZERO,
            "hardware.poll-interval must be positive"
        );
        if self.camera.kind == CameraKind::IntegratedSensor {
            self.camera
                .sensor_resolution()
                .context("invalid camera configuration")?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareBackend {
    #[default]
    Sysfs,
    /// In-memory pins; stdin lines fire the trigger, EOF fires shutdown.
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HardwareConfig {
    pub backend: HardwareBackend,
    pub gpio_root: PathBuf,
    /// Offset added to BCM numbers on kernels that register the SoC chip at a base.
    pub gpio_base: u32,
    pub pwm_chip: PathBuf,
    #[serde(with = "humantime_serde")]
    pub pwm_period: Duration,
    /// GPIO number -> PWM channel on `pwm-chip`.
    pub pwm_channels: BTreeMap<u32, u32>,
    /// Sampling interval of the edge detection thread.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Minimum time an input must hold a new level before an edge is reported.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: HardwareBackend::default(),
            gpio_root: PathBuf::from("/sys/class/gpio"),
            gpio_base: 0,
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            pwm_period: Duration::from_millis(1),
            pwm_channels: BTreeMap::from([(12, 0), (18, 0), (13, 1), (19, 1)]),
            poll_interval: Duration::from_millis(5),
            debounce: Duration::from_millis(20),
        }
    }
}

/// BCM pin numbers of the seven display segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentPins {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
    pub e: u32,
    pub f: u32,
    pub g: u32,
}

impl SegmentPins {
    pub fn as_array(&self) -> [u32; 7] {
        [self.a, self.b, self.c, self.d, self.e, self.f, self.g]
    }
}

impl Default for SegmentPins {
    fn default() -> Self {
        Self {
            a: 2,
            b: 3,
            c: 4,
            d: 17,
            e: 27,
            f: 22,
            g: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PinConfig {
    pub trigger: u32,
    pub trigger_edge: Edge,
    pub shutdown: u32,
    pub shutdown_edge: Edge,
    /// Lit while the booth accepts a trigger.
    pub trigger_led: Option<u32>,
    /// Lit while the booth is idle; dark during a sequence and after shutdown.
    pub shutdown_led: Option<u32>,
    /// PWM-capable pin driving the light.
    pub lamp: u32,
    pub segments: SegmentPins,
    /// `false` for common-anode displays where a low level lights a segment.
    pub segments_active_high: bool,
}

impl PinConfig {
    /// Every configured pin with the key it comes from.
    pub fn assignments(&self) -> Vec<(&'static str, u32)> {
        let mut pins = vec![
            ("trigger", self.trigger),
            ("shutdown", self.shutdown),
            ("lamp", self.lamp),
        ];
        pins.extend(self.trigger_led.map(|pin| ("trigger-led", pin)));
        pins.extend(self.shutdown_led.map(|pin| ("shutdown-led", pin)));
        let segments = [
            "segments.a",
            "segments.b",
            "segments.c",
            "segments.d",
            "segments.e",
            "segments.f",
            "segments.g",
        ];
        pins.extend(segments.into_iter().zip(self.segments.as_array()));
        pins
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            trigger: 23,
            trigger_edge: Edge::Falling,
            shutdown: 24,
            shutdown_edge: Edge::Falling,
            trigger_led: Some(25),
            shutdown_led: Some(12),
            lamp: 18,
            segments: SegmentPins::default(),
            segments_active_high: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraConfig {
    pub kind: CameraKind,
    /// Raspberry Pi camera module generation (1 or 2).
    pub sensor_version: u8,
    /// Replaces the default capture helper program.
    pub program: Option<String>,
    /// Replaces the default helper arguments; `{output}`, `{width}` and
    /// `{height}` are substituted.
    pub args: Option<Vec<String>>,
    /// Command run by `prepare()`; program first.
    pub prepare_command: Option<Vec<String>>,
}

impl CameraConfig {
    /// Still resolution of the configured sensor generation.
    pub fn sensor_resolution(&self) -> Result<(u32, u32)> {
        match self.sensor_version {
            1 => Ok((1024, 768)),
            2 => Ok((3280, 2464)),
            other => anyhow::bail!("unsupported raspberry pi camera version {other}"),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::default(),
            sensor_version: 1,
            program: None,
            args: None,
            prepare_command: None,
        }
    }
}

/// Destination layout for captured pictures.
///
/// Both templates are `strftime` patterns rendered at capture time; the
/// `HH-MM-SS` file names double as the chronological sort key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PictureLayout {
    pub root: PathBuf,
    pub directory_template: String,
    pub name_template: String,
}

impl Default for PictureLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/home/pi/photobooth"),
            directory_template: "%Y-%m-%d_Photomaton".to_string(),
            name_template: "%H-%M-%S_Photomaton.jpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CaptureTiming {
    /// Triggers arriving this soon after a completed sequence are ignored.
    #[serde(with = "humantime_serde")]
    pub refractory: Duration,
    /// Pause between countdown digits.
    #[serde(with = "humantime_serde")]
    pub countdown_step: Duration,
    /// Full light is held this long after the exposure.
    #[serde(with = "humantime_serde")]
    pub exposure_hold: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            refractory: Duration::from_secs(10),
            countdown_step: Duration::from_secs(1),
            exposure_hold: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LampConfig {
    /// Light level while waiting for a trigger.
    pub idle_level: f32,
}

impl Default for LampConfig {
    fn default() -> Self {
        Self { idle_level: 0.1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DistributionConfig {
    /// Display-sized copies are written here, mirroring the picture layout.
    pub derivative_root: PathBuf,
    /// Width and height the derivatives are fitted into.
    pub display_size: [u32; 2],
    /// `host:port` of the slideshow station.
    pub remote: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            derivative_root: PathBuf::from("/home/pi/photobooth-display"),
            display_size: [1920, 1080],
            remote: format!("localhost:{}", booth_protocol::DEFAULT_PORT),
            connect_timeout: Duration::from_secs(3),
        }
    }
}
