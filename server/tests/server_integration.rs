//! Whole-stack test: real TCP sockets through the acceptor, output router
//! and tick thread, exercising the crypto handshake and login.

use std::collections::VecDeque;
use std::time::Duration;

use proto::{wrap_session_key, NetstringDecoder, Packet, SessionCipher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use world::{World, WorldConfig};
use world_db::WorldDb;

const KEY: &[u8; 16] = b"integration-key!";

struct TestConn {
    stream: TcpStream,
    decoder: NetstringDecoder,
    cipher: SessionCipher,
    pending: VecDeque<Vec<u8>>,
}

impl TestConn {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            decoder: NetstringDecoder::new(),
            cipher: SessionCipher::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next raw frame payload off the wire.
    async fn next_frame(&mut self) -> Vec<u8> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return frame;
            }
            let mut buf = [0u8; 4096];
            let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut buf))
                .await
                .expect("read timed out")
                .expect("read failed");
            assert!(n > 0, "connection closed while waiting for a frame");
            for frame in self.decoder.feed(&buf[..n]).unwrap() {
                self.pending.push_back(frame);
            }
        }
    }

    async fn next_packet(&mut self) -> Packet {
        let frame = self.next_frame().await;
        let plain = self.cipher.open(&frame).unwrap();
        Packet::decode(&plain).unwrap()
    }

    async fn send_packet(&mut self, packet: Packet) {
        let sealed = self.cipher.seal(&packet.encode()).unwrap();
        self.stream
            .write_all(&proto::netstring::encode(&sealed))
            .await
            .unwrap();
    }

    /// Run the key bootstrap through to the Welcome packet.
    async fn handshake(&mut self) {
        let pubkey = self.next_frame().await;
        let client_key = Packet::ClientKey {
            key: hex::encode(KEY),
        }
        .encode();
        let wrapped = wrap_session_key(&pubkey, &client_key).unwrap();
        self.stream
            .write_all(&proto::netstring::encode(&wrapped))
            .await
            .unwrap();
        self.cipher.install(KEY).unwrap();

        let welcome = self.next_packet().await;
        assert!(
            matches!(welcome, Packet::Welcome { .. }),
            "expected Welcome, got {welcome:?}"
        );
    }

    /// Collect packets until `pred` matches or the budget runs out.
    async fn wait_for(&mut self, pred: impl Fn(&Packet) -> bool) -> Packet {
        for _ in 0..64 {
            let packet = self.next_packet().await;
            if pred(&packet) {
                return packet;
            }
        }
        panic!("expected packet never arrived");
    }
}

fn spawn_stack() -> (std::net::SocketAddr, watch::Sender<bool>) {
    let (net_tx, mut net_rx) = tokio::sync::mpsc::unbounded_channel();
    let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
    let (register_tx, register_rx) = tokio::sync::mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = tokio::sync::mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Reserve a port the same way the OS would hand one out.
    let addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    tokio::spawn(net::router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));
    tokio::spawn(net::server::run_tcp_server(
        addr.to_string(),
        net_tx,
        register_tx,
        unregister_tx,
        shutdown_rx.clone(),
    ));

    std::thread::spawn(move || {
        let db = WorldDb::open_memory().unwrap();
        world_db::ensure_seeded(&db).unwrap();
        let cfg = WorldConfig {
            tick_rate: 50,
            rsa_bits: 1024,
            rng_seed: Some(3),
            map_dir: "/nonexistent".to_string(),
            ..Default::default()
        };
        let mut world = World::new(cfg, db).unwrap();
        let tick = Duration::from_millis(20);
        loop {
            if *shutdown_rx.borrow() {
                for output in world.shutdown() {
                    let _ = output_tx.send(output);
                }
                break;
            }
            let start = std::time::Instant::now();
            while let Ok(msg) = net_rx.try_recv() {
                match msg {
                    net::channels::NetToTick::NewConnection { session_id } => {
                        world.on_connect(session_id)
                    }
                    net::channels::NetToTick::Frame {
                        session_id,
                        payload,
                    } => world.on_frame(session_id, payload),
                    net::channels::NetToTick::Disconnected { session_id } => {
                        world.on_disconnect(session_id)
                    }
                }
            }
            for output in world.tick() {
                let _ = output_tx.send(output);
            }
            let elapsed = start.elapsed();
            if elapsed < tick {
                std::thread::sleep(tick - elapsed);
            }
        }
    });

    (addr, shutdown_tx)
}

#[tokio::test]
async fn handshake_register_login_move() {
    let (addr, _shutdown_tx) = spawn_stack();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut conn = TestConn::connect(addr).await;
    conn.handshake().await;

    conn.send_packet(Packet::Register {
        username: "tester".into(),
        password: "pw123".into(),
    })
    .await;
    let ack = conn.next_packet().await;
    assert!(matches!(ack, Packet::Ok), "got {ack:?}");

    conn.send_packet(Packet::Login {
        username: "tester".into(),
        password: "pw123".into(),
    })
    .await;
    conn.wait_for(|p| matches!(p, Packet::MoveRooms { room_id: Some(1) }))
        .await;
    conn.wait_for(|p| matches!(p, Packet::TickRate { hz: 50 }))
        .await;
    conn.wait_for(
        |p| matches!(p, Packet::ServerLog { text } if text == "tester has arrived."),
    )
    .await;

    // The session keeps working after the join bundle.
    conn.send_packet(Packet::Chat {
        message: "anyone here?".into(),
    })
    .await;
    conn.wait_for(|p| matches!(p, Packet::ServerLog { text } if text.contains("tester says:")))
        .await;
}

#[tokio::test]
async fn wrong_password_then_successful_login() {
    let (addr, _shutdown_tx) = spawn_stack();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut conn = TestConn::connect(addr).await;
    conn.handshake().await;

    conn.send_packet(Packet::Register {
        username: "alice".into(),
        password: "correct".into(),
    })
    .await;
    assert!(matches!(conn.next_packet().await, Packet::Ok));

    conn.send_packet(Packet::Login {
        username: "alice".into(),
        password: "nope".into(),
    })
    .await;
    let deny = conn.next_packet().await;
    assert!(
        matches!(&deny, Packet::Deny { reason } if reason == "Incorrect password"),
        "got {deny:?}"
    );

    conn.send_packet(Packet::Login {
        username: "alice".into(),
        password: "correct".into(),
    })
    .await;
    conn.wait_for(|p| matches!(p, Packet::Ok)).await;
}

#[tokio::test]
async fn shutdown_sends_farewell_and_closes() {
    let (addr, shutdown_tx) = spawn_stack();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut conn = TestConn::connect(addr).await;
    conn.handshake().await;

    shutdown_tx.send(true).unwrap();
    let farewell = conn
        .wait_for(|p| matches!(p, Packet::ServerLog { text } if text.contains("going down")))
        .await;
    assert!(matches!(farewell, Packet::ServerLog { .. }));

    // The router drops the writer: the socket reaches EOF.
    let mut buf = [0u8; 64];
    loop {
        match tokio::time::timeout(Duration::from_secs(5), conn.stream.read(&mut buf))
            .await
            .expect("read timed out")
        {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}
