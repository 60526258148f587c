//! Canton MCP tool server binary.
//!
//! # Usage
//!
//! ```bash
//! cmcp-server serve
//! ```
//!
//! # Environment Variables
//!
//! - `MCP_SERVER_URL` — Advertised server URL (default `http://localhost:7284`)
//! - `MCP_PORT` — Listen port override (default from the URL, else 7284)
//! - `X402_ENABLED`, `X402_WALLET_ADDRESS`, `X402_NETWORK`, `X402_TOKEN`,
//!   `X402_FACILITATOR_URL` — EVM payment rail
//! - `CANTON_ENABLED`, `CANTON_FACILITATOR_URL`, `CANTON_PAYEE_PARTY`,
//!   `CANTON_NETWORK` — Canton payment rail
//! - `DCAP_ENABLED`, `DCAP_MULTICAST_IP`, `DCAP_PORT`, `DCAP_SERVER_ID`,
//!   `DCAP_SERVER_NAME`, `DCAP_DISCOVER_INTERVAL_SEC` — UDP telemetry
//! - `RESOURCE_DIR`, `PROMPT_DIR`, `RESOURCE_RELOAD_SEC` — served content
//! - `LOG_LEVEL` / `RUST_LOG` — log filter

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cmcp::config::ServerConfig;
use cmcp::gate::PaymentGate;
use cmcp::rail::PaymentRail;
use cmcp::rails::{CantonRail, EvmRail};
use cmcp::registry::ToolRegistry;
use cmcp::request::RequestManager;
use cmcp::telemetry::DcapEmitter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cmcp_server::resources::{PromptStore, ResourceStore};
use cmcp_server::server::{router, AppState, LogControl};
use cmcp_server::{discovery, tools};

#[derive(Parser, Debug)]
#[command(name = "cmcp-server", version)]
#[command(about = "Canton MCP tool server with x402 payments and DCAP telemetry")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server until interrupted.
    Serve,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()))
    });
    let (filter_layer, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Serve => {
            if let Err(e) = serve(LogControl::new(reload_handle)).await {
                tracing::error!("Server failed: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn serve(log_control: LogControl) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(ServerConfig::from_env()?);
    let registry = Arc::new(ToolRegistry::build(tools::catalogue())?);
    tracing::info!(tools = registry.len(), "tool registry built");

    let mut rails: Vec<Arc<dyn PaymentRail>> = Vec::new();
    if let Some(evm) = &config.evm {
        tracing::info!(network = %evm.network, wallet = %evm.wallet_address, "EVM rail enabled");
        rails.push(Arc::new(EvmRail::new(evm.clone())));
    }
    if let Some(canton) = &config.canton {
        tracing::info!(network = %canton.network, payee = %canton.payee_party, "Canton rail enabled");
        rails.push(Arc::new(CantonRail::new(canton.clone())));
    }
    let gate = Arc::new(
        PaymentGate::new(rails).with_internal_key(config.internal_api_key.clone()),
    );

    let telemetry = config.dcap.clone().map(|dcap| {
        tracing::info!(target = %dcap.target, sid = %dcap.server_id, "telemetry enabled");
        DcapEmitter::start(dcap)
    });

    let resources = Arc::new(ResourceStore::load(&config.content.resource_dir));
    let prompts = Arc::new(PromptStore::load(&config.content.prompt_dir));
    tracing::info!(
        resources = resources.len(),
        prompts = prompts.list().len(),
        "content loaded"
    );
    if let Some(interval) = config.content.reload_interval {
        Arc::clone(&resources).spawn_reload(interval);
        Arc::clone(&prompts).spawn_reload(interval);
    }

    if let Some(emitter) = &telemetry {
        discovery::spawn_broadcast(
            emitter.clone(),
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&gate),
        );
    }

    let state = AppState {
        registry,
        gate,
        requests: Arc::new(RequestManager::new()),
        telemetry,
        resources,
        prompts,
        server_info: AppState::default_server_info(),
        config: Arc::clone(&config),
        log_control,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
