//! Prometheus metrics for the game server

use std::sync::OnceLock;

use prometheus::{Histogram, HistogramOpts, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Currently connected clients
    pub active_clients: IntGauge,
    /// Wall time spent fanning one update batch out to the sessions
    pub publish_states_duration: Histogram,
    /// Wall time of one simulation tick
    pub game_loop_duration: Histogram,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Process-global metrics, registered on first use
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let active_clients = IntGauge::new(
            "terminal_shooter_active_clients",
            "The number of active clients",
        )
        .expect("metric definition is valid");

        let publish_states_duration = Histogram::with_opts(HistogramOpts::new(
            "terminal_shooter_publish_states_duration_seconds",
            "Time spent publishing state updates to all clients",
        ))
        .expect("metric definition is valid");

        let game_loop_duration = Histogram::with_opts(HistogramOpts::new(
            "terminal_shooter_game_loop_duration_seconds",
            "Time spent in one game loop tick",
        ))
        .expect("metric definition is valid");

        registry
            .register(Box::new(active_clients.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(publish_states_duration.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(game_loop_duration.clone()))
            .expect("metric registers once");

        Metrics {
            registry,
            active_clients,
            publish_states_duration,
            game_loop_duration,
        }
    })
}

/// Render the registry in the text exposition format
pub fn gather() -> String {
    TextEncoder::new()
        .encode_to_string(&metrics().registry.gather())
        .unwrap_or_default()
}
