use std::collections::HashMap;

use session::SessionId;

use crate::channels::{OutputRx, RegisterRx, SessionWriteTx, UnregisterRx};

/// Routes flushed session bytes to the correct per-session write channel.
pub async fn run_output_router(
    mut output_rx: OutputRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
) {
    let mut writers: HashMap<SessionId, SessionWriteTx> = HashMap::new();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                tracing::debug!(session_id = ?reg.session_id, "output router: session registered");
                writers.insert(reg.session_id, reg.write_tx);
            }
            Some(session_id) = unregister_rx.recv() => {
                tracing::debug!(?session_id, "output router: session unregistered");
                writers.remove(&session_id);
            }
            Some(output) = output_rx.recv() => {
                if let Some(tx) = writers.get(&output.session_id) {
                    if tx.send(output.bytes).is_err() {
                        tracing::debug!(session_id = ?output.session_id,
                            "output router: write channel closed");
                        writers.remove(&output.session_id);
                    } else if output.disconnect {
                        tracing::debug!(session_id = ?output.session_id,
                            "output router: disconnect requested, dropping writer");
                        writers.remove(&output.session_id);
                    }
                }
            }
            else => break,
        }
    }

    tracing::info!("output router shutting down");
}
