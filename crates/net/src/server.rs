use std::sync::atomic::{AtomicU64, Ordering};

use proto::NetstringDecoder;
use session::SessionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::channels::{NetToTick, NetTx, RegisterSession, RegisterTx, SessionWriteRx, UnregisterTx};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Run the TCP server until the shutdown signal flips, accepting
/// connections and spawning per-session tasks.
pub async fn run_tcp_server(
    addr: String,
    net_tx: NetTx,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let session_id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
                tracing::info!(?session_id, %peer_addr, "new connection");

                let net_tx = net_tx.clone();
                let register_tx = register_tx.clone();
                let unregister_tx = unregister_tx.clone();
                tokio::spawn(async move {
                    handle_session(stream, session_id, net_tx, register_tx, unregister_tx).await;
                });
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("tcp server stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_session(
    stream: tokio::net::TcpStream,
    session_id: SessionId,
    net_tx: NetTx,
    register_tx: RegisterTx,
    unregister_tx: UnregisterTx,
) {
    let (mut reader, mut writer) = stream.into_split();

    let (write_tx, mut write_rx): (_, SessionWriteRx) = tokio::sync::mpsc::unbounded_channel();
    let _ = register_tx.send(RegisterSession {
        session_id,
        write_tx,
    });
    let _ = net_tx.send(NetToTick::NewConnection { session_id });

    let writer_handle = tokio::spawn(async move {
        while let Some(bytes) = write_rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
        // Flush channel closed: let the socket close behind us.
        let _ = writer.shutdown().await;
    });

    let mut decoder = NetstringDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match decoder.feed(&buf[..n]) {
                Ok(frames) => {
                    for payload in frames {
                        let _ = net_tx.send(NetToTick::Frame {
                            session_id,
                            payload,
                        });
                    }
                }
                Err(e) => {
                    // Framing desync is unrecoverable on a byte stream.
                    tracing::warn!(?session_id, error = %e, "framing error, closing");
                    break;
                }
            },
            Err(_) => break,
        }
    }

    let _ = net_tx.send(NetToTick::Disconnected { session_id });
    let _ = unregister_tx.send(session_id);
    writer_handle.abort();
    tracing::info!(?session_id, "session ended");
}
