use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{Edge, EdgeCallback, EdgeDetector, HardwareIo, check_fraction};
use crate::config::HardwareConfig;
use crate::error::HardwareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_sysfs(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

struct Watch {
    pin: u32,
    value_path: PathBuf,
    detector: EdgeDetector,
    callback: EdgeCallback,
}

struct Inner {
    gpio_root: PathBuf,
    gpio_base: u32,
    pwm_chip: PathBuf,
    pwm_period: Duration,
    pwm_channels: BTreeMap<u32, u32>,
    poll_interval: Duration,
    debounce: Duration,
    pins: Mutex<HashMap<u32, Direction>>,
    pwm_enabled: Mutex<HashSet<u32>>,
    watches: Mutex<Vec<Watch>>,
    stop: AtomicBool,
    released: AtomicBool,
}

/// Linux sysfs GPIO and PWM backend.
///
/// Pins are exported lazily on first use. Inputs with edge callbacks are
/// sampled by a single polling thread started with the first registration.
pub struct SysfsHardware {
    inner: Arc<Inner>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_attr(path: &Path, value: &str) -> Result<(), HardwareError> {
    fs::write(path, value).map_err(|source| HardwareError::Sysfs {
        path: path.to_path_buf(),
        source,
    })
}

fn read_level(path: &Path) -> Result<bool, HardwareError> {
    let raw = fs::read_to_string(path).map_err(|source| HardwareError::Sysfs {
        path: path.to_path_buf(),
        source,
    })?;
    match raw.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(HardwareError::Parse {
            path: path.to_path_buf(),
            value: other.to_string(),
        }),
    }
}

impl Inner {
    fn gpio_dir(&self, pin: u32) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", pin + self.gpio_base))
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.gpio_dir(pin).join("value")
    }

    fn ensure_live(&self) -> Result<(), HardwareError> {
        if self.released.load(Ordering::SeqCst) {
            Err(HardwareError::Released)
        } else {
            Ok(())
        }
    }

    fn configure(&self, pin: u32, direction: Direction) -> Result<(), HardwareError> {
        let mut pins = lock(&self.pins);
        match pins.get(&pin) {
            Some(current) if *current == direction => return Ok(()),
            Some(_) => return Err(HardwareError::UnknownPin(pin)),
            None => {}
        }
        let dir = self.gpio_dir(pin);
        if !dir.exists() {
            write_attr(
                &self.gpio_root.join("export"),
                &(pin + self.gpio_base).to_string(),
            )?;
        }
        write_attr(&dir.join("direction"), direction.as_sysfs())?;
        debug!(pin, direction = direction.as_sysfs(), "gpio configured");
        pins.insert(pin, direction);
        Ok(())
    }

    fn pwm_dir(&self, channel: u32) -> PathBuf {
        self.pwm_chip.join(format!("pwm{channel}"))
    }

    fn enable_pwm(&self, channel: u32) -> Result<(), HardwareError> {
        let mut enabled = lock(&self.pwm_enabled);
        if enabled.contains(&channel) {
            return Ok(());
        }
        let dir = self.pwm_dir(channel);
        if !dir.exists() {
            write_attr(&self.pwm_chip.join("export"), &channel.to_string())?;
        }
        write_attr(&dir.join("duty_cycle"), "0")?;
        write_attr(
            &dir.join("period"),
            &self.pwm_period.as_nanos().to_string(),
        )?;
        write_attr(&dir.join("enable"), "1")?;
        debug!(channel, period = ?self.pwm_period, "pwm channel enabled");
        enabled.insert(channel);
        Ok(())
    }

    fn poll_once(&self) {
        let now = Instant::now();
        let mut watches = lock(&self.watches);
        for watch in watches.iter_mut() {
            match read_level(&watch.value_path) {
                Ok(level) => {
                    if watch.detector.sample(level, now) {
                        debug!(pin = watch.pin, level, "edge detected");
                        (watch.callback)(now);
                    }
                }
                Err(err) => warn!(pin = watch.pin, error = %err, "failed to sample input"),
            }
        }
    }

    fn poll_loop(self: Arc<Self>) {
        debug!(interval = ?self.poll_interval, "gpio polling started");
        while !self.stop.load(Ordering::SeqCst) {
            self.poll_once();
            thread::sleep(self.poll_interval);
        }
        debug!("gpio polling stopped");
    }
}

impl SysfsHardware {
    pub fn new(cfg: &HardwareConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                gpio_root: cfg.gpio_root.clone(),
                gpio_base: cfg.gpio_base,
                pwm_chip: cfg.pwm_chip.clone(),
                pwm_period: cfg.pwm_period,
                pwm_channels: cfg.pwm_channels.clone(),
                poll_interval: cfg.poll_interval,
                debounce: cfg.debounce,
                pins: Mutex::new(HashMap::new()),
                pwm_enabled: Mutex::new(HashSet::new()),
                watches: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                released: AtomicBool::new(false),
            }),
            poller: Mutex::new(None),
        }
    }

    fn ensure_poller(&self) -> Result<(), HardwareError> {
        let mut poller = lock(&self.poller);
        if poller.is_some() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("gpio-poll".into())
            .spawn(move || inner.poll_loop())
            .map_err(|source| HardwareError::Sysfs {
                path: self.inner.gpio_root.clone(),
                source,
            })?;
        *poller = Some(handle);
        Ok(())
    }
}

impl HardwareIo for SysfsHardware {
    fn set_output(&self, pin: u32, level: bool) -> Result<(), HardwareError> {
        self.inner.ensure_live()?;
        self.inner.configure(pin, Direction::Out)?;
        write_attr(&self.inner.value_path(pin), if level { "1" } else { "0" })
    }

    fn read_input(&self, pin: u32) -> Result<bool, HardwareError> {
        self.inner.ensure_live()?;
        self.inner.configure(pin, Direction::In)?;
        read_level(&self.inner.value_path(pin))
    }

    fn set_pwm(&self, pin: u32, fraction: f32) -> Result<(), HardwareError> {
        self.inner.ensure_live()?;
        let fraction = check_fraction(fraction)?;
        let channel = *self
            .inner
            .pwm_channels
            .get(&pin)
            .ok_or(HardwareError::NoPwmChannel(pin))?;
        self.inner.enable_pwm(channel)?;
        let period = self.inner.pwm_period.as_nanos() as f64;
        let duty = (period * f64::from(fraction)).round() as u64;
        write_attr(
            &self.inner.pwm_dir(channel).join("duty_cycle"),
            &duty.to_string(),
        )
    }

    fn register_edge_callback(
        &self,
        pin: u32,
        edge: Edge,
        callback: EdgeCallback,
    ) -> Result<(), HardwareError> {
        self.inner.ensure_live()?;
        self.inner.configure(pin, Direction::In)?;
        let value_path = self.inner.value_path(pin);
        let initial = read_level(&value_path)?;
        lock(&self.inner.watches).push(Watch {
            pin,
            value_path,
            detector: EdgeDetector::new(edge, self.inner.debounce, initial),
            callback,
        });
        info!(pin, ?edge, "edge callback registered");
        self.ensure_poller()
    }

    fn release(&self) -> Result<(), HardwareError> {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.poller).take() {
            if handle.join().is_err() {
                warn!("gpio polling thread panicked");
            }
        }
        lock(&self.inner.watches).clear();

        let mut first_error = None;
        for channel in lock(&self.inner.pwm_enabled).drain() {
            let dir = self.inner.pwm_dir(channel);
            let steps = [
                (dir.join("duty_cycle"), "0".to_string()),
                (dir.join("enable"), "0".to_string()),
                (self.inner.pwm_chip.join("unexport"), channel.to_string()),
            ];
            for (path, value) in steps {
                if let Err(err) = write_attr(&path, &value) {
                    warn!(channel, error = %err, "failed to release pwm channel");
                    first_error.get_or_insert(err);
                }
            }
        }
        for (pin, _) in lock(&self.inner.pins).drain() {
            let unexport = self.inner.gpio_root.join("unexport");
            if let Err(err) = write_attr(&unexport, &(pin + self.inner.gpio_base).to_string()) {
                warn!(pin, error = %err, "failed to unexport gpio");
                first_error.get_or_insert(err);
            }
        }
        info!("sysfs hardware released");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SysfsHardware {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }
}
