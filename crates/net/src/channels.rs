use session::{SessionId, SessionOutput};
use tokio::sync::mpsc;

/// Messages from the network layer to the tick thread.
#[derive(Debug)]
pub enum NetToTick {
    /// A new TCP connection was accepted.
    NewConnection { session_id: SessionId },
    /// One complete netstring payload arrived.
    Frame {
        session_id: SessionId,
        payload: Vec<u8>,
    },
    /// Connection lost.
    Disconnected { session_id: SessionId },
}

/// Sender from network tasks to the tick thread.
pub type NetTx = mpsc::UnboundedSender<NetToTick>;
/// Receiver in the tick thread for network events.
pub type NetRx = mpsc::UnboundedReceiver<NetToTick>;

/// Sender from the tick thread to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-session write channel (tick thread -> output router -> writer task).
pub type SessionWriteTx = mpsc::UnboundedSender<Vec<u8>>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterSession {
    pub session_id: SessionId,
    pub write_tx: SessionWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterSession>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterSession>;

pub type UnregisterTx = mpsc::UnboundedSender<SessionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<SessionId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_roundtrip() {
        let (tx, mut rx) = mpsc::unbounded_channel::<NetToTick>();

        tx.send(NetToTick::NewConnection {
            session_id: SessionId(1),
        })
        .unwrap();
        tx.send(NetToTick::Frame {
            session_id: SessionId(1),
            payload: b"hello".to_vec(),
        })
        .unwrap();
        tx.send(NetToTick::Disconnected {
            session_id: SessionId(1),
        })
        .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            NetToTick::NewConnection { .. }
        ));
        match rx.recv().await.unwrap() {
            NetToTick::Frame { payload, .. } => assert_eq!(payload, b"hello"),
            other => panic!("expected Frame, got {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            NetToTick::Disconnected { .. }
        ));
    }
}
