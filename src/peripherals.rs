//! Booth peripherals layered on [`HardwareIo`]: lamp, digit display and LEDs.

use std::sync::Arc;

use tracing::warn;

use crate::config::PinConfig;
use crate::error::HardwareError;
use crate::hardware::HardwareIo;

/// PWM-dimmed light used for the countdown ramp.
pub struct Lamp {
    io: Arc<dyn HardwareIo>,
    pin: u32,
    idle_level: f32,
}

impl Lamp {
    pub fn new(io: Arc<dyn HardwareIo>, pin: u32, idle_level: f32) -> Self {
        Self {
            io,
            pin,
            idle_level,
        }
    }

    pub fn set_level(&self, fraction: f32) -> Result<(), HardwareError> {
        self.io.set_pwm(self.pin, fraction.clamp(0.0, 1.0))
    }

    pub fn idle(&self) -> Result<(), HardwareError> {
        self.set_level(self.idle_level)
    }

    pub fn full(&self) -> Result<(), HardwareError> {
        self.set_level(1.0)
    }

    pub fn off(&self) -> Result<(), HardwareError> {
        self.set_level(0.0)
    }
}

/// Lit segments a..g per digit.
const DIGIT_SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

/// Single seven-segment digit wired to one GPIO per segment.
pub struct SegmentDisplay {
    io: Arc<dyn HardwareIo>,
    pins: [u32; 7],
    active_high: bool,
}

impl SegmentDisplay {
    pub fn new(io: Arc<dyn HardwareIo>, pins: [u32; 7], active_high: bool) -> Self {
        Self {
            io,
            pins,
            active_high,
        }
    }

    pub fn pins(&self) -> [u32; 7] {
        self.pins
    }

    /// Show `digit`; values above 9 blank the display.
    pub fn show(&self, digit: u8) -> Result<(), HardwareError> {
        match DIGIT_SEGMENTS.get(usize::from(digit)) {
            Some(segments) => self.write(*segments),
            None => {
                warn!(digit, "digit out of range; blanking display");
                self.blank()
            }
        }
    }

    pub fn blank(&self) -> Result<(), HardwareError> {
        self.write([false; 7])
    }

    fn write(&self, segments: [bool; 7]) -> Result<(), HardwareError> {
        for (pin, lit) in self.pins.iter().zip(segments) {
            self.io.set_output(*pin, lit == self.active_high)?;
        }
        Ok(())
    }

    /// Read back the digit shown by a set of pin levels (a..g order).
    ///
    /// Returns `None` for a blank display or a pattern that is not a digit.
    pub fn decode(&self, levels: [bool; 7]) -> Option<u8> {
        let lit = levels.map(|level| level == self.active_high);
        DIGIT_SEGMENTS
            .iter()
            .position(|segments| *segments == lit)
            .and_then(|digit| u8::try_from(digit).ok())
    }
}

/// A status LED that may be left unwired.
pub struct Indicator {
    io: Arc<dyn HardwareIo>,
    pin: Option<u32>,
}

impl Indicator {
    pub fn new(io: Arc<dyn HardwareIo>, pin: Option<u32>) -> Self {
        Self { io, pin }
    }

    pub fn set(&self, on: bool) -> Result<(), HardwareError> {
        match self.pin {
            Some(pin) => self.io.set_output(pin, on),
            None => Ok(()),
        }
    }

    pub fn on(&self) -> Result<(), HardwareError> {
        self.set(true)
    }

    pub fn off(&self) -> Result<(), HardwareError> {
        self.set(false)
    }
}

/// Every output the capture controller drives.
pub struct Peripherals {
    pub lamp: Lamp,
    pub display: SegmentDisplay,
    pub trigger_led: Indicator,
    pub shutdown_led: Indicator,
}

impl Peripherals {
    pub fn new(io: Arc<dyn HardwareIo>, pins: &PinConfig, idle_level: f32) -> Self {
        Self {
            lamp: Lamp::new(Arc::clone(&io), pins.lamp, idle_level),
            display: SegmentDisplay::new(
                Arc::clone(&io),
                pins.segments.as_array(),
                pins.segments_active_high,
            ),
            trigger_led: Indicator::new(Arc::clone(&io), pins.trigger_led),
            shutdown_led: Indicator::new(io, pins.shutdown_led),
        }
    }

    pub fn leds(&self, on: bool) -> Result<(), HardwareError> {
        self.trigger_led.set(on)?;
        self.shutdown_led.set(on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;

    const PINS: [u32; 7] = [2, 3, 4, 17, 27, 22, 5];

    fn levels(hw: &SimulatedHardware) -> [bool; 7] {
        PINS.map(|pin| hw.output(pin).unwrap_or(false))
    }

    #[test]
    fn every_digit_decodes_back() {
        let hw = Arc::new(SimulatedHardware::new());
        let display = SegmentDisplay::new(hw.clone(), PINS, true);
        for digit in 0..=9 {
            display.show(digit).unwrap();
            assert_eq!(display.decode(levels(&hw)), Some(digit));
        }
        display.blank().unwrap();
        assert_eq!(display.decode(levels(&hw)), None);
    }

    #[test]
    fn active_low_inverts_levels() {
        let hw = Arc::new(SimulatedHardware::new());
        let display = SegmentDisplay::new(hw.clone(), PINS, false);
        display.show(1).unwrap();
        assert_eq!(
            levels(&hw),
            [true, false, false, true, true, true, true]
        );
        assert_eq!(display.decode(levels(&hw)), Some(1));
        display.blank().unwrap();
        assert_eq!(levels(&hw), [true; 7]);
    }

    #[test]
    fn lamp_levels() {
        let hw = Arc::new(SimulatedHardware::new());
        let lamp = Lamp::new(hw.clone(), 18, 0.1);
        lamp.idle().unwrap();
        assert_eq!(hw.pwm(18), Some(0.1));
        lamp.full().unwrap();
        assert_eq!(hw.pwm(18), Some(1.0));
        lamp.set_level(1.7).unwrap();
        assert_eq!(hw.pwm(18), Some(1.0));
        lamp.off().unwrap();
        assert_eq!(hw.pwm(18), Some(0.0));
    }

    #[test]
    fn unwired_indicator_is_silent() {
        let hw = Arc::new(SimulatedHardware::new());
        Indicator::new(hw.clone(), None).on().unwrap();
        assert!(hw.ops().is_empty());
    }
}
