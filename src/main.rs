mod command;
mod config;
mod connection;
mod peer;
mod transport;

use anyhow::{anyhow, Result};
use clap::Parser;
use command::Dispatcher;
use config::Config;
use futures::future::join_all;
use ship_bridge_shared::limits;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long peer links may keep flushing after the dispatcher stops
const PEER_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "ship-net-bridge", version, about = "Bridge between a remote MQTT control application and the ship's local services")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow!("invalid logLevel {:?}: {}", config.log_level, e))?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("[MAIN] ship-net-bridge starting: ship {}", config.mqtt.ship_id);
    info!("  broker: {}", config.mqtt.broker);
    info!("  ship-control: {}", config.ship_control.socket_name);
    info!("  ship-nav: {}", config.ship_nav.socket_name);

    let result = run(config).await;
    if let Err(e) = &result {
        error!("[MAIN] {:#}", e);
    }
    info!("[MAIN] ship-net-bridge stopped");
    result
}

async fn run(config: Config) -> Result<()> {
    let (handle, inbox) = Dispatcher::channel(
        limits::DISPATCHER_QUEUE_CAPACITY,
        config.waypoint_field_failure,
    );

    let (broker, session) = connection::mqtt_broker(&config.mqtt, handle.clone())?;
    let (control, control_link) = peer::ship_control(&config.ship_control, handle.clone());
    let (nav, nav_link) = peer::ship_nav(&config.ship_nav, handle);

    let (core_stop_tx, core_stop_rx) = watch::channel(false);
    let (adapters_stop_tx, adapters_stop_rx) = watch::channel(false);

    let peer_tasks = vec![
        tokio::spawn(control_link.run(adapters_stop_rx.clone())),
        tokio::spawn(nav_link.run(adapters_stop_rx.clone())),
    ];
    let mut broker_task = tokio::spawn(session.run(adapters_stop_rx));

    let mut dispatcher = Dispatcher::new(inbox, control, nav, broker, config.announce_interval());
    let core_task = tokio::spawn(async move {
        dispatcher.run(core_stop_rx).await;
    });

    let broker_result = tokio::select! {
        _ = shutdown_signal() => {
            info!("[MAIN] shutdown requested");
            None
        }
        result = &mut broker_task => {
            error!("[MAIN] broker session ended, shutting down");
            Some(result)
        }
    };

    // Dispatcher first, so its drained calls still reach the adapters
    let _ = core_stop_tx.send(true);
    if let Err(e) = core_task.await {
        error!("[MAIN] dispatcher task failed: {}", e);
    }

    // Peer links end by themselves once their queues are flushed
    let peers = join_all(peer_tasks);
    tokio::pin!(peers);
    let peer_results = tokio::select! {
        results = &mut peers => results,
        _ = tokio::time::sleep(PEER_DRAIN_GRACE) => {
            warn!("[MAIN] peer links still busy, stopping them");
            let _ = adapters_stop_tx.send(true);
            peers.await
        }
    };
    for result in peer_results {
        if let Err(e) = result {
            error!("[MAIN] peer link task failed: {}", e);
        }
    }

    let _ = adapters_stop_tx.send(true);
    let broker_result = match broker_result {
        Some(result) => result,
        None => broker_task.await,
    };

    match broker_result {
        Ok(result) => result,
        Err(e) => Err(anyhow!("broker task failed: {}", e)),
    }
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("[MAIN] failed to listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("[MAIN] failed to listen for Ctrl-C: {}", e);
            }
        }
    }
}
