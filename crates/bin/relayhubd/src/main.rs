//! # relayhubd: relayhub daemon
//!
//! Composition root that wires all adapters together and runs the bindings.
//!
//! ## Responsibilities
//! - Parse configuration (CLI argument, env vars, config file)
//! - Initialize tracing
//! - Register every adapter factory
//! - Build the hub: services, bindings, sequences
//! - Start services and wait for SIGINT/SIGTERM
//! - Stop services on shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all adapter crates.
//! It is the wiring layer; no binding logic belongs here.

mod config;

use anyhow::Context;
use relayhub_adapter_bond::BondService;
use relayhub_adapter_http::HttpService;
use relayhub_adapter_lutron::LutronService;
use relayhub_adapter_mqtt::MqttService;
use relayhub_adapter_nuki::NukiService;
use relayhub_adapter_shell::ShellService;
use relayhub_app::{Hub, ServiceRegistry};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

fn registry() -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry
        .register(relayhub_adapter_mqtt::KIND, MqttService::factory)
        .register(relayhub_adapter_lutron::KIND, LutronService::factory)
        .register(relayhub_adapter_bond::KIND, BondService::factory)
        .register(relayhub_adapter_shell::KIND, ShellService::factory)
        .register(relayhub_adapter_http::KIND, HttpService::factory)
        .register(relayhub_adapter_nuki::KIND, NukiService::factory);
    registry
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config::resolve_path(
        std::env::args().nth(1),
        std::env::var("RELAYHUB_CONFIG").ok(),
    );
    let config = Config::load(&path).with_context(|| format!("unable to load {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %path.display(),
        services = config.hub.services.len(),
        bindings = config.hub.bindings.len(),
        sequences = config.hub.sequences.len(),
        "starting relayhubd"
    );

    let registry = registry();
    let hub = Hub::build(config.hub, &registry);
    if !hub.failures().is_empty() {
        tracing::warn!(failures = hub.failures().len(), "some configuration entries were skipped");
    }
    tracing::info!(
        bindings = hub.binding_count(),
        sequences = hub.sequencers().len(),
        "hub wired"
    );

    hub.start();
    shutdown_signal()
        .await
        .context("unable to install signal handlers")?;

    tracing::info!("shutting down");
    hub.stop();
    Ok(())
}
