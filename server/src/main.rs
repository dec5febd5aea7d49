mod config;
mod logging;
mod shutdown;

use std::time::{Duration, Instant};

use net::channels::{NetRx, NetToTick, OutputTx};
use world::World;
use world_db::WorldDb;

use crate::config::{parse_cli_args, ServerConfig};
use crate::shutdown::{shutdown_channel, ShutdownRx};

#[tokio::main]
async fn main() {
    logging::init_logging();

    let config = parse_cli_args();
    tracing::info!("world server starting");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let server_config = config.clone();
    let server_future = async move {
        run_server(server_config, shutdown_rx).await;
    };

    tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("shutdown signal received, stopping server");
            shutdown_tx.trigger();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        _ = server_future => {}
    }

    tracing::info!("server stopped");
}

async fn run_server(config: ServerConfig, shutdown_rx: ShutdownRx) {
    // Channels between the async edge and the tick thread.
    let (net_tx, net_rx) = tokio::sync::mpsc::unbounded_channel();
    let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
    let (register_tx, register_rx) = tokio::sync::mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(net::router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));

    let listen_addr = config.net.listen_addr.clone();
    let tcp_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = net::server::run_tcp_server(
            listen_addr,
            net_tx,
            register_tx,
            unregister_tx,
            tcp_shutdown.into_inner(),
        )
        .await
        {
            tracing::error!("tcp server error: {}", e);
        }
    });

    // The tick thread is the single ordering authority.
    let tick_shutdown = shutdown_rx;
    let tick_handle = std::thread::spawn(move || {
        run_tick_thread(net_rx, output_tx, config, tick_shutdown);
    });

    let _ = tokio::task::spawn_blocking(move || tick_handle.join()).await;
}

fn run_tick_thread(
    mut net_rx: NetRx,
    output_tx: OutputTx,
    config: ServerConfig,
    shutdown_rx: ShutdownRx,
) {
    let db = match WorldDb::open(&config.database.path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("failed to open world database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = world_db::ensure_seeded(&db) {
        tracing::error!("failed to seed world database: {}", e);
        std::process::exit(1);
    }

    let mut world = match World::new(config.to_world_config(), db) {
        Ok(world) => world,
        Err(e) => {
            tracing::error!("failed to initialize world: {}", e);
            std::process::exit(1);
        }
    };

    let tick_duration = Duration::from_secs_f64(1.0 / config.tick.tps.max(1) as f64);
    tracing::info!(tps = config.tick.tps, "tick loop running");

    loop {
        if shutdown_rx.is_shutdown() {
            tracing::info!("tick loop: shutdown signal received");
            for output in world.shutdown() {
                let _ = output_tx.send(output);
            }
            break;
        }

        let tick_start = Instant::now();

        // Drain network events; per-session fairness is enforced inside
        // the world (one inbound packet per session per tick).
        while let Ok(msg) = net_rx.try_recv() {
            match msg {
                NetToTick::NewConnection { session_id } => world.on_connect(session_id),
                NetToTick::Frame {
                    session_id,
                    payload,
                } => world.on_frame(session_id, payload),
                NetToTick::Disconnected { session_id } => world.on_disconnect(session_id),
            }
        }

        for output in world.tick() {
            let _ = output_tx.send(output);
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick_duration {
            std::thread::sleep(tick_duration - elapsed);
        } else {
            tracing::warn!(
                tick = world.tick_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "tick overran its budget"
            );
        }
    }

    tracing::info!("tick loop stopped");
}
