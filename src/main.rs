//! Raffle Sync Service
//!
//! Main entry point for one raffle instance. This service provides:
//! - the ticket reservation/purchase state machine with a periodic expiry sweep
//! - file-backed persistence of the campaign and local purchase history
//! - an optional WebSocket relay mirroring purchases to other processes
//! - an operator console on stdin

use raffle_sync::admin::AdminGate;
use raffle_sync::broadcast::BroadcastHub;
use raffle_sync::clock::SystemClock;
use raffle_sync::config::AppConfig;
use raffle_sync::console;
use raffle_sync::error::AppError;
use raffle_sync::generator::HttpGenerator;
use raffle_sync::instance::{InstanceSettings, RaffleInstance};
use raffle_sync::relay::WsRelay;
use raffle_sync::store::{FileStore, MemoryStore, RaffleStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("raffle_sync={}", config.log_level).into());
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Raffle sync service starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!(
        "Pool: {} numbers, limit {} per purchase, {} per phone/email",
        config.campaign.total_numbers,
        config.campaign.max_purchase_limit,
        config.campaign.max_entries_per_phone
    );

    // =========================================================================
    // PERSISTENCE
    // =========================================================================
    let store: Arc<dyn RaffleStore> = match FileStore::open(&config.store.data_dir) {
        Ok(store) => {
            info!("✓ Persisting to {}", store.dir().display());
            Arc::new(store)
        }
        Err(e) => {
            warn!("{}; running with in-memory storage only", e);
            Arc::new(MemoryStore::new())
        }
    };

    // =========================================================================
    // BROADCAST AND RELAY
    // =========================================================================
    let hub = BroadcastHub::new(config.sync.broadcast_capacity);
    let relay = WsRelay::new(hub.clone());

    let relay_handle = if let Some(port) = config.sync.relay_port {
        let addr: SocketAddr = format!("0.0.0.0:{}", port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid relay address: {}", e)))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Message(format!("Failed to bind relay: {}", e)))?;
        info!("✓ Relay listening on {}", addr);
        Some(tokio::spawn(relay.clone().serve(listener)))
    } else {
        None
    };

    for peer in &config.sync.relay_peers {
        // A dead peer only costs us sync, never availability.
        if let Err(e) = relay.connect(peer).await {
            warn!("{}", e);
        }
    }

    // =========================================================================
    // INSTANCE
    // =========================================================================
    let settings = InstanceSettings {
        campaign: config.campaign.clone(),
        reservation_ttl_ms: config.reservation.ttl_ms(),
        sweep_interval: config.reservation.sweep_interval(),
    };
    let instance = RaffleInstance::load(settings, store, &hub, Arc::new(SystemClock));
    let (mut handle, instance_task) = instance.spawn();
    info!("✓ Instance {} running", handle.instance_id());

    if let Some(generator) = HttpGenerator::from_config(&config.generator) {
        handle = handle.with_generator(Arc::new(generator));
        info!("✓ Prize content generator configured");
    }

    let gate = AdminGate::new(&config.admin);
    let console_handle = handle.clone();
    let console_task = tokio::spawn(async move { console::run(console_handle, gate).await });

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        result = console_task => {
            if let Ok(Err(e)) = result {
                error!("Console failed: {}", e);
            }
        }
        _ = async {
            match relay_handle {
                Some(handle) => {
                    handle.await.ok();
                }
                None => futures::future::pending::<()>().await,
            }
        } => {
            error!("Relay exited unexpectedly");
        }
    }

    handle.shutdown().await;
    if let Err(e) = instance_task.await {
        error!("Instance task panicked: {}", e);
    }

    info!("Raffle sync service shutdown complete");
    Ok(())
}
