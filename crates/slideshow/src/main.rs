//! Binary entrypoint for the display station.

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, anyhow};
use booth_protocol::{DEFAULT_PORT, PictureId};
use clap::{ArgAction, Parser};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use winit::event_loop::EventLoop;

use slideshow::config::{SlideshowSettings, Tuning};
use slideshow::controller::SlideshowController;
use slideshow::events::InputEvent;
use slideshow::ingest;
use slideshow::pictures::PictureList;
use slideshow::screen::{UserEvent, WindowApp, WindowScreen};

#[derive(Debug, Parser)]
#[command(name = "slideshow", version, about = "Photobooth touch slideshow")]
struct Cli {
    /// Directory holding the display-sized pictures
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,

    /// Frame size in pixels
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [1920, 1080])]
    size: Vec<u32>,

    /// Seconds each picture stays on screen
    #[arg(short, long, default_value_t = 1)]
    time: u64,

    /// Port to listen on for new-picture notifications
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to listen on
    #[arg(long, default_value = "localhost")]
    address: String,

    /// Show the slideshow in a normal window instead of fullscreen
    #[arg(long)]
    windowed: bool,

    /// Optional YAML file with tuning overrides
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

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
            .add_directive(format!("slideshow={level}").parse()?)
            .add_directive(format!("booth_protocol={level}").parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let tuning = match &cli.config {
        Some(path) => Tuning::from_yaml_file(path)
            .with_context(|| format!("failed to load tuning from {}", path.display()))?,
        None => Tuning::default(),
    }
    .validated()
    .context("invalid tuning values")?;
    let size = match cli.size.as_slice() {
        [w, h] if *w > 0 && *h > 0 => (*w, *h),
        _ => return Err(anyhow!("--size needs a positive width and height")),
    };
    anyhow::ensure!(cli.time > 0, "--time must be at least one second");
    let settings = SlideshowSettings {
        picture_dir: cli.path.clone(),
        dwell: std::time::Duration::from_secs(cli.time),
        tuning,
    };
    tracing::debug!("slideshow settings:\n{settings:#?}");

    let pictures = PictureList::scan(&settings.picture_dir, settings.tuning.recursive)
        .context("failed to read picture directory")?;

    let cancel = CancellationToken::new();
    let (picture_tx, picture_rx) = crossbeam_channel::unbounded::<PictureId>();
    let (input_tx, input_rx) = crossbeam_channel::unbounded::<InputEvent>();

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

    let listener = ingest::bind(&cli.address, cli.port).await?;
    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cancel = cancel.clone();
        let read_timeout = settings.tuning.read_timeout;
        async move {
            ingest::run(listener, picture_tx, read_timeout, cancel)
                .await
                .context("ingest task failed")
        }
    });

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .context("failed to create event loop")?;
    let screen = WindowScreen::new(event_loop.create_proxy(), size)?;
    let controller = SlideshowController::new(
        screen,
        settings,
        pictures,
        picture_rx,
        input_rx,
        cancel.clone(),
    );
    let render_thread = thread::Builder::new()
        .name("slideshow".into())
        .spawn({
            let cancel = cancel.clone();
            move || {
                let result = controller.run();
                cancel.cancel();
                result
            }
        })
        .context("failed to spawn render thread")?;

    // The window loop owns the main thread until it exits.
    let mut app = WindowApp::new(!cli.windowed, size, input_tx, cancel.clone());
    if let Err(e) = event_loop.run_app(&mut app).context("window loop failed") {
        tracing::error!("{e:?}");
    }
    if let Some(e) = app.take_failure() {
        tracing::error!("{e:?}");
    }
    cancel.cancel();
    drop(app);

    let outcome = tokio::task::spawn_blocking(move || render_thread.join())
        .await
        .context("failed to wait for render thread")?
        .map_err(|_| anyhow!("render thread panicked"))?;
    if let Err(e) = outcome {
        tracing::error!("{e}");
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }
    info!("slideshow exited");
    Ok(())
}
