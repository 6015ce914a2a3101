//! Authoritative server core for the terminal shooter.
//!
//! Clients speak an MQTT 3.1.1 subset over TCP. Inbound packets become game
//! mutations, the simulation advances on a fixed 60 Hz cadence, and state
//! diffs fan out to every connected session.

pub mod config;
pub mod controller;
pub mod game;
pub mod http;
pub mod mqtt;
pub mod proto;
pub mod stats;
pub mod util;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::Config;
use crate::controller::Controller;
use crate::game::state::{DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH};
use crate::game::GameState;
use crate::mqtt::{Broker, MqttServer};

/// How long graceful shutdown may take before giving up on stragglers
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the simulation-to-publisher event channel
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Wire everything together and serve until `shutdown` fires
pub async fn run(config: Config, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let game = Arc::new(GameState::new(DEFAULT_GRID_WIDTH, DEFAULT_GRID_HEIGHT));
    let broker = Arc::new(Broker::new());
    let controller = Arc::new(Controller::new(broker.clone(), game.clone()));

    // Simulation loop feeding the publish loop
    let (events_tx, events_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    let simulation = tokio::spawn(game.clone().run_update_loop(events_tx, shutdown.clone()));
    let publisher = tokio::spawn(
        controller
            .clone()
            .run_publish_loop(events_rx, shutdown.clone()),
    );

    // Metrics endpoint
    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "metrics server listening");
    let mut metrics_shutdown = shutdown.clone();
    let metrics = tokio::spawn(async move {
        axum::serve(metrics_listener, http::build_router())
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.changed().await;
            })
            .await
    });

    // MQTT front-end
    let server = MqttServer::bind(config.mqtt_addr, controller).await?;
    let handle = server.start();

    // Wait for the shutdown signal, tolerating an already-signaled channel
    if !*shutdown.borrow_and_update() {
        let _ = shutdown.changed().await;
    }

    handle.shutdown(SHUTDOWN_TIMEOUT).await?;
    simulation.await?;
    publisher.await?;
    metrics.await??;

    Ok(())
}
