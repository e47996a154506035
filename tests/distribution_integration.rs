use booth_protocol::decode_notification;
use image::{Rgb, RgbImage};
use photobooth::events::Artifact;
use photobooth::tasks::distribution::{self, DistributionSettings};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::tempdir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn write_picture(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(width, height, Rgb([120, 80, 40]))
        .save(path)
        .unwrap();
}

fn artifact(path: PathBuf) -> Artifact {
    Artifact {
        path,
        created_at: SystemTime::now(),
    }
}

/// An address nothing listens on.
fn vacant_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn next_line(listener: &TcpListener) -> Vec<u8> {
    let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("timeout waiting for notification")
        .unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    buf
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn artifact_is_resized_and_announced() {
    let tmp = tempdir().unwrap();
    let pictures = tmp.path().join("pictures");
    let display = tmp.path().join("display");
    let shot = pictures
        .join("2024-05-01_Photomaton")
        .join("12-30-00_Photomaton.jpeg");
    write_picture(&shot, 640, 480);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let settings = DistributionSettings {
        picture_root: pictures.clone(),
        derivative_root: display.clone(),
        display_size: (320, 320),
        remote: listener.local_addr().unwrap().to_string(),
        connect_timeout: Duration::from_secs(2),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(distribution::run(rx, settings, cancel.clone()));

    tx.send(artifact(shot)).unwrap();
    let line = next_line(&listener).await;
    assert_eq!(line, b"2024-05-01_Photomaton/12-30-00_Photomaton.jpeg\n".to_vec());
    let id = decode_notification(&line).unwrap();

    let derivative = id.resolve(&display);
    assert!(derivative.exists());
    let img = image::open(&derivative).unwrap();
    assert_eq!((img.width(), img.height()), (320, 240));

    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_artifacts_are_dropped_and_worker_continues() {
    let tmp = tempdir().unwrap();
    let pictures = tmp.path().join("pictures");
    let elsewhere = tmp.path().join("elsewhere").join("stray.jpeg");
    let corrupt = pictures.join("broken.jpeg");
    let good = pictures.join("13-00-00_Photomaton.jpeg");
    write_picture(&elsewhere, 10, 10);
    write_picture(&good, 10, 10);
    fs::write(&corrupt, b"not a jpeg").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let settings = DistributionSettings {
        picture_root: pictures.clone(),
        derivative_root: tmp.path().join("display"),
        display_size: (100, 100),
        remote: listener.local_addr().unwrap().to_string(),
        connect_timeout: Duration::from_secs(2),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(distribution::run(rx, settings, cancel.clone()));

    tx.send(artifact(elsewhere)).unwrap();
    tx.send(artifact(corrupt)).unwrap();
    tx.send(artifact(good)).unwrap();
    let line = next_line(&listener).await;
    assert_eq!(line, b"13-00-00_Photomaton.jpeg\n".to_vec());

    drop(tx);
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_display_does_not_stop_the_worker() {
    let tmp = tempdir().unwrap();
    let pictures = tmp.path().join("pictures");
    let first = pictures.join("a.jpeg");
    let second = pictures.join("b.jpeg");
    write_picture(&first, 10, 10);
    write_picture(&second, 10, 10);

    let remote = vacant_address();

    let settings = DistributionSettings {
        picture_root: pictures.clone(),
        derivative_root: tmp.path().join("display"),
        display_size: (100, 100),
        remote,
        connect_timeout: Duration::from_millis(500),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(distribution::run(rx, settings, CancellationToken::new()));
    tx.send(artifact(first)).unwrap();
    tx.send(artifact(second)).unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("worker should drain the queue")
        .unwrap()
        .unwrap();
    assert!(tmp.path().join("display").join("b.jpeg").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_finishes_queued_artifacts() {
    let tmp = tempdir().unwrap();
    let pictures = tmp.path().join("pictures");
    let names = ["a.jpeg", "b.jpeg", "c.jpeg"];
    for name in names {
        write_picture(&pictures.join(name), 2000, 1500);
    }

    let settings = DistributionSettings {
        picture_root: pictures.clone(),
        derivative_root: tmp.path().join("display"),
        display_size: (200, 150),
        remote: vacant_address(),
        connect_timeout: Duration::from_millis(500),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    for name in names {
        tx.send(artifact(pictures.join(name))).unwrap();
    }
    let worker = tokio::spawn(distribution::run(rx, settings, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(1)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(20), worker)
        .await
        .expect("worker should finish the queue")
        .unwrap()
        .unwrap();
    for name in names {
        assert!(
            tmp.path().join("display").join(name).exists(),
            "missing derivative {name}"
        );
    }
    drop(tx);
}
