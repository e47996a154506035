//! TCP listener for new-picture notifications.
//!
//! The server only decodes and queues identifiers; the render loop decides
//! what to do with them.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use booth_protocol::{MAX_MESSAGE_LEN, PictureId, decode_notification};
use crossbeam_channel::Sender;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn bind(address: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((address, port))
        .await
        .with_context(|| format!("failed to listen on {address}:{port}"))?;
    info!(addr = %listener.local_addr()?, "ingest server listening");
    Ok(listener)
}

pub async fn run(
    listener: TcpListener,
    queue: Sender<PictureId>,
    read_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, queue, read_timeout).await;
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },
        }
    }
    debug!("ingest server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    queue: Sender<PictureId>,
    read_timeout: Duration,
) {
    let buf = match read_message(stream, read_timeout).await {
        Ok(buf) => buf,
        Err(err) => {
            debug!(%peer, error = %err, "notification dropped");
            return;
        }
    };
    match decode_notification(&buf) {
        Ok(id) => {
            debug!(%peer, id = %id, "notification received");
            if queue.send(id).is_err() {
                debug!("slideshow gone; notification discarded");
            }
        }
        Err(err) => debug!(%peer, error = %err, "undecodable notification dropped"),
    }
}

/// Read until a newline arrives, the peer closes, or `MAX_MESSAGE_LEN` bytes were received.
async fn read_message(mut stream: TcpStream, read_timeout: Duration) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_MESSAGE_LEN];
    let mut filled = 0;
    let read = async {
        while filled < buf.len() {
            let n = stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
            if buf[..filled].contains(&b'\n') {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    };
    tokio::time::timeout(read_timeout, read)
        .await
        .map_err(|_| anyhow!("peer stayed silent for {read_timeout:?}"))?
        .context("read failed")?;
    buf.truncate(filled);
    Ok(buf)
}
