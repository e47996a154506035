//! GPIO and PWM access for the booth's buttons, LEDs, lamp and digit display.

mod simulated;
mod sysfs;

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::HardwareError;

pub use simulated::{HardwareOp, RecordedOp, SimulatedHardware};
pub use sysfs::SysfsHardware;

/// Invoked with the detection time whenever a registered edge occurs.
///
/// Callbacks run on the backend's dispatch thread and must return quickly.
pub type EdgeCallback = Box<dyn Fn(Instant) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    Rising,
    #[default]
    Falling,
    Both,
}

impl Edge {
    /// Whether a transition to `rising` matches this edge.
    pub fn accepts(self, rising: bool) -> bool {
        match self {
            Edge::Rising => rising,
            Edge::Falling => !rising,
            Edge::Both => true,
        }
    }
}

/// Pin-level hardware contract used by the capture controller.
///
/// All methods take `&self` so a backend can be shared between the
/// controller thread and edge dispatch.
pub trait HardwareIo: Send + Sync {
    fn set_output(&self, pin: u32, level: bool) -> Result<(), HardwareError>;

    fn read_input(&self, pin: u32) -> Result<bool, HardwareError>;

    /// Drive a PWM-capable pin at `fraction` of full duty (`0.0..=1.0`).
    fn set_pwm(&self, pin: u32, fraction: f32) -> Result<(), HardwareError>;

    fn register_edge_callback(
        &self,
        pin: u32,
        edge: Edge,
        callback: EdgeCallback,
    ) -> Result<(), HardwareError>;

    /// Stop edge dispatch and return every pin to the system.
    fn release(&self) -> Result<(), HardwareError>;
}

pub(crate) fn check_fraction(fraction: f32) -> Result<f32, HardwareError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(fraction)
    } else {
        Err(HardwareError::LevelOutOfRange(fraction))
    }
}

/// Turns sampled input levels into debounced edges.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    edge: Edge,
    debounce: Duration,
    stable: bool,
    pending_since: Option<Instant>,
}

impl EdgeDetector {
    pub fn new(edge: Edge, debounce: Duration, initial: bool) -> Self {
        Self {
            edge,
            debounce,
            stable: initial,
            pending_since: None,
        }
    }

    pub fn level(&self) -> bool {
        self.stable
    }

    /// Feed one sample; returns `true` when an accepted edge completes.
    pub fn sample(&mut self, level: bool, now: Instant) -> bool {
        if level == self.stable {
            self.pending_since = None;
            return false;
        }
        let since = *self.pending_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.debounce {
            return false;
        }
        self.pending_since = None;
        self.stable = level;
        self.edge.accepts(level)
    }
}
