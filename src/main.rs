//! Origin gate (v1)
//!
//! Admission-control reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     ORIGIN GATE                      │
//!                    │                                                      │
//!   Client Request   │  ┌─────────┐   ┌──────────┐   ┌──────────────────┐   │
//!   ─────────────────┼─▶│  http   │──▶│  origin  │──▶│  rules (cascade) │◀──┼── Redis
//!                    │  │ server  │   │ resolver │◀──┼──────────────────┘   │
//!                    │  └────┬────┘   └────┬─────┘   │                      │
//!                    │       │             └─────────┼── origin metadata    │
//!                    │       ▼                       ▼                      │
//!                    │  ┌──────────┐   drop   ┌──────────┐                  │
//!   403 / 400 / 502  │  │ admission│─────────▶│ response │                  │
//!   ◀────────────────┼──│ decision │          └──────────┘                  │
//!                    │  └────┬─────┘                                        │
//!                    │       │ allow                                        │
//!   Upstream Response│       ▼                                              │
//!   ◀────────────────┼── forwarder (per-SNI pools, streaming) ──────────────┼──▶ Upstream
//!                    └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use origin_gate::config::ConfigArgs;
use origin_gate::lifecycle::{wait_for_signal, Shutdown};
use origin_gate::observability::init_tracing;
use origin_gate::GatewayServer;

#[derive(Parser)]
#[command(name = "origin-gate", version, about = "Origin-aware admission gateway")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.config.resolve()?;

    init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "origin-gate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        origin = %config.origin.endpoint,
        rule_store = %config.rule_store.address,
        inbound_tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(config)?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let mut serve = tokio::spawn(server.run(listener, rx));

    tokio::select! {
        result = &mut serve => {
            // Server exited on its own, e.g. unreadable TLS material.
            result??;
            return Ok(());
        }
        _ = wait_for_signal() => {}
    }
    shutdown.trigger();
    serve.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
