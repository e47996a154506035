//! Binary entrypoint for the capture station.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use photobooth::camera;
use photobooth::config::{Configuration, HardwareBackend, PinConfig};
use photobooth::events::{Artifact, ControlInput};
use photobooth::hardware::{Edge, HardwareIo, SimulatedHardware, SysfsHardware};
use photobooth::peripherals::Peripherals;
use photobooth::tasks::capture::{self, CaptureController, TriggerGate};
use photobooth::tasks::distribution::{self, DistributionSettings};

#[derive(Debug, Parser)]
#[command(name = "photobooth", version, about = "Photobooth capture station")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "photobooth.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("photobooth={level}").parse()?)
            .add_directive(format!("booth_protocol={level}").parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

/// Bench mode: every stdin line presses the trigger, EOF presses shutdown.
fn feed_simulated_buttons(hw: Arc<SimulatedHardware>, pins: PinConfig) -> Result<()> {
    let press = move |pin: u32, edge: Edge| hw.fire_edge(pin, matches!(edge, Edge::Rising));
    thread::Builder::new()
        .name("stdin-buttons".into())
        .spawn(move || {
            info!("simulated hardware: press enter to trigger, ctrl-d to shut down");
            for line in io::stdin().lock().lines() {
                if line.is_err() {
                    break;
                }
                press(pins.trigger, pins.trigger_edge);
            }
            press(pins.shutdown, pins.shutdown_edge);
        })
        .context("failed to spawn stdin reader")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", cli.config.display(), cfg);

    let io: Arc<dyn HardwareIo> = match cfg.hardware.backend {
        HardwareBackend::Sysfs => Arc::new(SysfsHardware::new(&cfg.hardware)),
        HardwareBackend::Simulated => {
            let sim = Arc::new(SimulatedHardware::new());
            feed_simulated_buttons(Arc::clone(&sim), cfg.pins.clone())?;
            sim
        }
    };
    let camera = camera::open(&cfg.camera).context("failed to open camera")?;
    info!(backend = ?cfg.hardware.backend, camera = ?cfg.camera.kind, "devices ready");

    let cancel = CancellationToken::new();
    let gate = Arc::new(TriggerGate::new(cfg.timing.refractory));
    let (input_tx, input_rx) = crossbeam_channel::unbounded::<ControlInput>();
    let (artifact_tx, artifact_rx) = mpsc::unbounded_channel::<Artifact>();

    let peripherals = Peripherals::new(Arc::clone(&io), &cfg.pins, cfg.lamp.idle_level);
    let controller = CaptureController::new(
        Arc::clone(&io),
        peripherals,
        camera,
        Arc::clone(&gate),
        cfg.pictures.clone(),
        cfg.timing,
        artifact_tx,
    );
    capture::register_inputs(io.as_ref(), &cfg.pins, gate, input_tx, cancel.clone())
        .context("failed to register button callbacks")?;

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // Distribution stops only once the capture thread has handed over its last picture.
    let distribution_cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    tasks.spawn({
        let settings = DistributionSettings::from_config(&cfg);
        let cancel = distribution_cancel.clone();
        async move {
            distribution::run(artifact_rx, settings, cancel)
                .await
                .context("distribution task failed")
        }
    });

    let controller_thread = thread::Builder::new()
        .name("capture".into())
        .spawn({
            let cancel = cancel.clone();
            move || controller.run(input_rx, cancel)
        })
        .context("failed to spawn capture thread")?;

    let outcome = tokio::task::spawn_blocking(move || controller_thread.join())
        .await
        .context("failed to wait for capture thread")?
        .map_err(|_| anyhow!("capture thread panicked"))?;
    if let Err(e) = outcome {
        tracing::error!("{e:?}");
    }
    cancel.cancel();
    distribution_cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }
    info!("photobooth stopped");
    Ok(())
}
