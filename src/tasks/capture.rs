//! Trigger handling and the countdown/exposure sequence.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::{Camera, render_template};
use crate::config::{CaptureTiming, PictureLayout, PinConfig};
use crate::error::{CaptureError, HardwareError};
use crate::events::{Artifact, CaptureState, ControlInput};
use crate::hardware::HardwareIo;
use crate::peripherals::Peripherals;

/// First digit of the countdown.
pub const COUNTDOWN_FROM: u8 = 5;

const IDLE_POLL: Duration = Duration::from_millis(50);
const CANCEL_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    last_completed: Option<Instant>,
}

/// Admission control for trigger edges.
///
/// An edge is accepted only when no session is running and the refractory
/// period since the last completed session has elapsed. Both checks and
/// the transition to busy happen under one lock.
#[derive(Debug)]
pub struct TriggerGate {
    refractory: Duration,
    state: Mutex<GateState>,
}

impl TriggerGate {
    pub fn new(refractory: Duration) -> Self {
        Self {
            refractory,
            state: Mutex::new(GateState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Try to start a session for an edge observed at `now`.
    pub fn try_arm(&self, now: Instant) -> bool {
        let mut state = self.state();
        if state.busy {
            return false;
        }
        if let Some(last) = state.last_completed {
            if now.saturating_duration_since(last) < self.refractory {
                return false;
            }
        }
        state.busy = true;
        true
    }

    pub fn complete(&self, now: Instant) {
        let mut state = self.state();
        state.busy = false;
        state.last_completed = Some(now);
    }

    pub fn is_busy(&self) -> bool {
        self.state().busy
    }
}

/// Hook the trigger and shutdown buttons up to the controller's input queue.
///
/// Callbacks only consult the gate and post messages; all peripheral work
/// happens on the controller thread.
pub fn register_inputs(
    io: &dyn HardwareIo,
    pins: &PinConfig,
    gate: Arc<TriggerGate>,
    inputs: Sender<ControlInput>,
    cancel: CancellationToken,
) -> Result<(), HardwareError> {
    let trigger_tx = inputs.clone();
    io.register_edge_callback(
        pins.trigger,
        pins.trigger_edge,
        Box::new(move |at| {
            if gate.try_arm(at) {
                info!("trigger accepted");
                if trigger_tx.send(ControlInput::Trigger { at }).is_err() {
                    debug!("controller gone; trigger dropped");
                }
            } else {
                debug!("trigger ignored while busy or refractory");
            }
        }),
    )?;
    io.register_edge_callback(
        pins.shutdown,
        pins.shutdown_edge,
        Box::new(move |_| {
            info!("shutdown button pressed");
            cancel.cancel();
            let _ = inputs.send(ControlInput::Shutdown);
        }),
    )?;
    Ok(())
}

/// Owns the peripherals and camera; runs on a dedicated thread.
pub struct CaptureController {
    io: Arc<dyn HardwareIo>,
    peripherals: Peripherals,
    camera: Box<dyn Camera>,
    gate: Arc<TriggerGate>,
    layout: PictureLayout,
    timing: CaptureTiming,
    state: watch::Sender<CaptureState>,
    artifacts: mpsc::UnboundedSender<Artifact>,
}

impl CaptureController {
    pub fn new(
        io: Arc<dyn HardwareIo>,
        peripherals: Peripherals,
        camera: Box<dyn Camera>,
        gate: Arc<TriggerGate>,
        layout: PictureLayout,
        timing: CaptureTiming,
        artifacts: mpsc::UnboundedSender<Artifact>,
    ) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            io,
            peripherals,
            camera,
            gate,
            layout,
            timing,
            state,
            artifacts,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: CaptureState) {
        debug!(state = ?next, "capture state");
        self.state.send_replace(next);
    }

    /// Process inputs until shutdown, then return every device to rest.
    pub fn run(mut self, inputs: Receiver<ControlInput>, cancel: CancellationToken) -> Result<()> {
        if let Err(err) = self.prepare_idle() {
            self.shutdown();
            return Err(err);
        }
        info!("capture controller ready");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            match inputs.recv_timeout(IDLE_POLL) {
                Ok(ControlInput::Trigger { at }) => {
                    debug!(latency = ?at.elapsed(), "starting capture sequence");
                    if let Err(CaptureError::Cancelled) = self.run_sequence(&cancel) {
                        break;
                    }
                }
                Ok(ControlInput::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("input channel closed");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn prepare_idle(&self) -> Result<()> {
        self.peripherals
            .lamp
            .idle()
            .context("failed to set idle light")?;
        self.peripherals
            .display
            .blank()
            .context("failed to blank digit display")?;
        self.peripherals
            .leds(true)
            .context("failed to light indicators")
    }

    /// One full session. Only cancellation is reported to the caller;
    /// device failures are logged and the booth returns to idle.
    fn run_sequence(&mut self, cancel: &CancellationToken) -> Result<(), CaptureError> {
        let started = Instant::now();
        let captured = match self.expose(cancel) {
            Ok(path) => Some(path),
            Err(CaptureError::Cancelled) => return Err(CaptureError::Cancelled),
            Err(err) => {
                error!(error = %err, "capture sequence aborted");
                None
            }
        };
        // A shutdown during the hold still hands the captured picture over.
        let held = match captured {
            Some(_) => pause(cancel, self.timing.exposure_hold),
            None => Ok(()),
        };

        self.set_state(CaptureState::Cooldown);
        if let Err(err) = self.cool_down() {
            warn!(error = %err, "failed to reset peripherals after capture");
        }
        self.gate.complete(Instant::now());

        if let Some(path) = captured {
            info!(path = %path.display(), elapsed = ?started.elapsed(), "capture complete");
            let artifact = Artifact {
                path,
                created_at: SystemTime::now(),
            };
            if self.artifacts.send(artifact).is_err() {
                warn!("distribution worker stopped; artifact not forwarded");
            }
        }
        if held.is_err() {
            debug!("shutdown requested during exposure hold");
            return held;
        }
        self.set_state(CaptureState::Idle);
        Ok(())
    }

    fn expose(&mut self, cancel: &CancellationToken) -> Result<PathBuf, CaptureError> {
        self.set_state(CaptureState::Arming);
        self.peripherals.leds(false)?;
        self.camera.prepare()?;

        for digit in (1..=COUNTDOWN_FROM).rev() {
            check_cancel(cancel)?;
            self.set_state(CaptureState::Countdown(digit));
            let level = f32::from(COUNTDOWN_FROM - digit) / f32::from(COUNTDOWN_FROM);
            self.peripherals.lamp.set_level(level)?;
            self.peripherals.display.show(digit)?;
            if digit > 1 {
                pause(cancel, self.timing.countdown_step)?;
            }
        }
        check_cancel(cancel)?;
        self.set_state(CaptureState::Countdown(0));
        self.peripherals.display.show(0)?;
        self.peripherals.lamp.full()?;

        self.set_state(CaptureState::Exposing);
        let now = Local::now();
        let dir = self
            .layout
            .root
            .join(render_template(&self.layout.directory_template, now)?);
        Ok(self.camera.capture(&dir, &self.layout.name_template)?)
    }

    fn cool_down(&self) -> Result<(), HardwareError> {
        self.peripherals.lamp.idle()?;
        self.peripherals.display.blank()?;
        self.peripherals.leds(true)
    }

    fn shutdown(&mut self) {
        self.set_state(CaptureState::Shutdown);
        info!("shutting down capture controller");
        if let Err(err) = self.peripherals.lamp.off() {
            warn!(error = %err, "failed to switch off light");
        }
        if let Err(err) = self.peripherals.display.blank() {
            warn!(error = %err, "failed to blank digit display");
        }
        if let Err(err) = self.peripherals.leds(false) {
            warn!(error = %err, "failed to switch off indicators");
        }
        if let Err(err) = self.camera.close() {
            warn!(error = %err, "failed to close camera");
        }
        if let Err(err) = self.io.release() {
            warn!(error = %err, "failed to release hardware");
        }
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), CaptureError> {
    if cancel.is_cancelled() {
        Err(CaptureError::Cancelled)
    } else {
        Ok(())
    }
}

/// Sleep for `duration`, waking early when shutdown is requested.
fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), CaptureError> {
    let deadline = Instant::now() + duration;
    loop {
        check_cancel(cancel)?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}
