use std::time::Duration;

use booth_protocol::PictureId;
use crossbeam_channel::{Receiver, unbounded};
use slideshow::ingest;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

struct Server {
    addr: std::net::SocketAddr,
    rx: Receiver<PictureId>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start(read_timeout: Duration) -> Server {
    let listener = ingest::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = unbounded();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(ingest::run(listener, tx, read_timeout, cancel.clone()));
    Server {
        addr,
        rx,
        cancel,
        task,
    }
}

async fn send(addr: std::net::SocketAddr, bytes: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.shutdown().await.unwrap();
}

fn recv(rx: &Receiver<PictureId>) -> Option<PictureId> {
    rx.recv_timeout(Duration::from_secs(2)).ok()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn valid_line_is_queued() {
    let server = start(Duration::from_secs(2)).await;
    send(server.addr, b"2024-05-01_Photomaton/12-30-00_Photomaton.jpeg\n").await;
    let id = tokio::task::spawn_blocking({
        let rx = server.rx.clone();
        move || recv(&rx)
    })
    .await
    .unwrap()
    .expect("identifier queued");
    assert_eq!(id.as_str(), "2024-05-01_Photomaton/12-30-00_Photomaton.jpeg");
    server.cancel.cancel();
    server.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_messages_are_dropped() {
    let server = start(Duration::from_secs(2)).await;
    send(server.addr, &[0xff, 0xfe, b'\n']).await;
    send(server.addr, b"../etc/passwd\n").await;
    send(server.addr, b"\n").await;
    send(server.addr, b"after.jpeg\n").await;

    let rx = server.rx.clone();
    let received = tokio::task::spawn_blocking(move || {
        let mut ids = Vec::new();
        while let Ok(id) = rx.recv_timeout(Duration::from_millis(500)) {
            ids.push(id.as_str().to_string());
        }
        ids
    })
    .await
    .unwrap();
    assert_eq!(received, vec!["after.jpeg".to_string()]);
    server.cancel.cancel();
    server.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peer_is_timed_out_without_blocking_others() {
    let server = start(Duration::from_millis(200)).await;
    let _silent = TcpStream::connect(server.addr).await.unwrap();
    send(server.addr, b"other.jpeg\n").await;

    let rx = server.rx.clone();
    let first = tokio::task::spawn_blocking(move || recv(&rx)).await.unwrap();
    assert_eq!(first.unwrap().as_str(), "other.jpeg");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(server.rx.try_recv().is_err());
    server.cancel.cancel();
    server.task.await.unwrap().unwrap();
}
