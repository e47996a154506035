use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, trace};

use super::{Edge, EdgeCallback, HardwareIo, check_fraction};
use crate::error::HardwareError;

/// Operation applied to a simulated pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardwareOp {
    Output { pin: u32, level: bool },
    Pwm { pin: u32, level: f32 },
    Release,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordedOp {
    pub at: Instant,
    pub op: HardwareOp,
}

type SharedCallback = Arc<dyn Fn(Instant) + Send + Sync>;

#[derive(Default)]
struct State {
    outputs: HashMap<u32, bool>,
    inputs: HashMap<u32, bool>,
    pwm: HashMap<u32, f32>,
    callbacks: Vec<(u32, Edge, SharedCallback)>,
    log: Vec<RecordedOp>,
    released: bool,
}

/// In-memory pins for tests and bench runs without a Raspberry Pi.
///
/// Every output and PWM change is recorded with its timestamp; edges are
/// injected with [`SimulatedHardware::fire_edge`].
#[derive(Default)]
pub struct SimulatedHardware {
    state: Mutex<State>,
}

impl SimulatedHardware {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drive `pin` to the new level and dispatch matching callbacks now.
    pub fn fire_edge(&self, pin: u32, rising: bool) {
        self.fire_edge_at(pin, rising, Instant::now());
    }

    pub fn fire_edge_at(&self, pin: u32, rising: bool, at: Instant) {
        let targets: Vec<SharedCallback> = {
            let mut state = self.state();
            if state.released {
                debug!(pin, "edge ignored after release");
                return;
            }
            state.inputs.insert(pin, rising);
            state
                .callbacks
                .iter()
                .filter(|(p, edge, _)| *p == pin && edge.accepts(rising))
                .map(|(_, _, cb)| Arc::clone(cb))
                .collect()
        };
        trace!(pin, rising, callbacks = targets.len(), "simulated edge");
        for callback in targets {
            callback(at);
        }
    }

    pub fn set_input(&self, pin: u32, level: bool) {
        self.state().inputs.insert(pin, level);
    }

    pub fn output(&self, pin: u32) -> Option<bool> {
        self.state().outputs.get(&pin).copied()
    }

    pub fn pwm(&self, pin: u32) -> Option<f32> {
        self.state().pwm.get(&pin).copied()
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.state().log.clone()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    fn record(state: &mut State, op: HardwareOp) {
        state.log.push(RecordedOp {
            at: Instant::now(),
            op,
        });
    }
}

impl HardwareIo for SimulatedHardware {
    fn set_output(&self, pin: u32, level: bool) -> Result<(), HardwareError> {
        let mut state = self.state();
        if state.released {
            return Err(HardwareError::Released);
        }
        state.outputs.insert(pin, level);
        Self::record(&mut state, HardwareOp::Output { pin, level });
        Ok(())
    }

    fn read_input(&self, pin: u32) -> Result<bool, HardwareError> {
        let state = self.state();
        if state.released {
            return Err(HardwareError::Released);
        }
        state
            .inputs
            .get(&pin)
            .copied()
            .ok_or(HardwareError::UnknownPin(pin))
    }

    fn set_pwm(&self, pin: u32, fraction: f32) -> Result<(), HardwareError> {
        let level = check_fraction(fraction)?;
        let mut state = self.state();
        if state.released {
            return Err(HardwareError::Released);
        }
        state.pwm.insert(pin, level);
        Self::record(&mut state, HardwareOp::Pwm { pin, level });
        Ok(())
    }

    fn register_edge_callback(
        &self,
        pin: u32,
        edge: Edge,
        callback: EdgeCallback,
    ) -> Result<(), HardwareError> {
        let mut state = self.state();
        if state.released {
            return Err(HardwareError::Released);
        }
        state.inputs.entry(pin).or_insert(true);
        state.callbacks.push((pin, edge, Arc::from(callback)));
        Ok(())
    }

    fn release(&self) -> Result<(), HardwareError> {
        let mut state = self.state();
        if !state.released {
            state.released = true;
            state.callbacks.clear();
            Self::record(&mut state, HardwareOp::Release);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn records_outputs_in_order() {
        let hw = SimulatedHardware::new();
        hw.set_output(25, true).unwrap();
        hw.set_pwm(18, 0.5).unwrap();
        hw.set_output(25, false).unwrap();
        let ops: Vec<_> = hw.ops().into_iter().map(|r| r.op).collect();
        assert_eq!(
            ops,
            vec![
                HardwareOp::Output { pin: 25, level: true },
                HardwareOp::Pwm { pin: 18, level: 0.5 },
                HardwareOp::Output { pin: 25, level: false },
            ]
        );
        assert_eq!(hw.output(25), Some(false));
        assert_eq!(hw.pwm(18), Some(0.5));
    }

    #[test]
    fn callbacks_follow_edge_direction() {
        let hw = SimulatedHardware::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        hw.register_edge_callback(
            23,
            Edge::Falling,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        hw.fire_edge(23, false);
        hw.fire_edge(23, true);
        hw.fire_edge(24, false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hw.read_input(23).unwrap(), true);
    }

    #[test]
    fn release_stops_dispatch_and_outputs() {
        let hw = SimulatedHardware::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        hw.register_edge_callback(
            24,
            Edge::Both,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        hw.release().unwrap();
        hw.fire_edge(24, false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(matches!(hw.set_output(1, true), Err(HardwareError::Released)));
        assert!(hw.is_released());
    }
}
