//! Display-sized copies of new pictures and their announcement to the slideshow.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use booth_protocol::{PictureId, encode_notification};
use image::imageops::FilterType;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::events::Artifact;

#[derive(Debug, Clone)]
pub struct DistributionSettings {
    /// Root the picture identifiers are relative to.
    pub picture_root: PathBuf,
    pub derivative_root: PathBuf,
    pub display_size: (u32, u32),
    pub remote: String,
    pub connect_timeout: Duration,
}

impl DistributionSettings {
    pub fn from_config(cfg: &Configuration) -> Self {
        let [width, height] = cfg.distribution.display_size;
        Self {
            picture_root: cfg.pictures.root.clone(),
            derivative_root: cfg.distribution.derivative_root.clone(),
            display_size: (width, height),
            remote: cfg.distribution.remote.clone(),
            connect_timeout: cfg.distribution.connect_timeout,
        }
    }
}

pub async fn run(
    mut artifacts: mpsc::UnboundedReceiver<Artifact>,
    settings: DistributionSettings,
    cancel: CancellationToken,
) -> Result<()> {
    info!(remote = %settings.remote, "distribution worker started");
    loop {
        tokio::select! {
            biased;
            next = artifacts.recv() => match next {
                Some(artifact) => handle(&settings, artifact).await,
                None => break,
            },
            _ = cancel.cancelled() => {
                // Pictures already queued are still on disk; finish them.
                artifacts.close();
                let mut drained = 0usize;
                while let Some(artifact) = artifacts.recv().await {
                    handle(&settings, artifact).await;
                    drained += 1;
                }
                debug!(drained, "distribution queue drained after cancel");
                break;
            }
        }
    }
    debug!("distribution worker stopped");
    Ok(())
}

async fn handle(settings: &DistributionSettings, artifact: Artifact) {
    if let Err(err) = distribute(settings, &artifact).await {
        warn!(path = %artifact.path.display(), error = ?err, "artifact dropped");
    }
}

/// Write the derivative, then announce it. No retry on failure.
pub async fn distribute(settings: &DistributionSettings, artifact: &Artifact) -> Result<()> {
    let started = Instant::now();
    let id = PictureId::relative_to(&artifact.path, &settings.picture_root)
        .context("artifact lies outside the picture root")?;

    let source = artifact.path.clone();
    let target = id.resolve(&settings.derivative_root);
    let size = settings.display_size;
    tokio::task::spawn_blocking(move || write_derivative(&source, &target, size))
        .await
        .map_err(|err| anyhow!("derivative task failed: {err}"))??;

    notify(&settings.remote, &id, settings.connect_timeout).await?;
    info!(id = %id, elapsed = ?started.elapsed(), "picture announced");
    Ok(())
}

/// Scale `source` to fit within `size`, preserving aspect ratio, and store it at `target`.
pub fn write_derivative(source: &Path, target: &Path, size: (u32, u32)) -> Result<()> {
    let img = image::open(source)
        .with_context(|| format!("failed to decode {}", source.display()))?;
    let (width, height) = size;
    let img = if img.width() > width || img.height() > height {
        img.resize(width, height, FilterType::Triangle)
    } else {
        img
    };
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    img.to_rgb8()
        .save(target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    debug!(
        target = %target.display(),
        width = img.width(),
        height = img.height(),
        "derivative written"
    );
    Ok(())
}

/// One connection, one line, no answer.
pub async fn notify(remote: &str, id: &PictureId, connect_timeout: Duration) -> Result<()> {
    let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect(remote))
        .await
        .map_err(|_| anyhow!("connecting to {remote} timed out"))?
        .with_context(|| format!("failed to connect to {remote}"))?;
    stream
        .write_all(&encode_notification(id))
        .await
        .with_context(|| format!("failed to send notification to {remote}"))?;
    stream.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn derivative_fits_display_and_keeps_aspect() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("big.jpeg");
        RgbImage::from_pixel(400, 300, Rgb([10, 20, 30]))
            .save(&source)
            .unwrap();
        let target = tmp.path().join("out").join("day").join("big.jpeg");
        write_derivative(&source, &target, (200, 200)).unwrap();
        let img = image::open(&target).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn small_pictures_are_not_upscaled() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("small.png");
        RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]))
            .save(&source)
            .unwrap();
        let target = tmp.path().join("copy.png");
        write_derivative(&source, &target, (1920, 1080)).unwrap();
        let img = image::open(&target).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_peer_is_an_error_not_a_hang() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let id = PictureId::parse("a.jpeg").unwrap();
        let started = Instant::now();
        let res = notify(&addr.to_string(), &id, Duration::from_secs(1)).await;
        assert!(res.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
