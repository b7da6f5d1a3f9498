#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! The velum relay server.
//!
//! Wires the JSON-RPC ledger, the sled store and the relay pipeline into
//! an HTTP surface. Configuration comes from flags with environment
//! fallback; a `.env` file is honored for local runs.

mod routes;

use clap::Parser;
use ethers::core::types::H160;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use velum_relay::{EthersLedger, RelayConfig, RelayError, Relayer};
use velum_store::SledStore;

/// Runtime configuration. Every flag falls back to a `VELUM_`-prefixed
/// environment variable.
#[derive(Debug, Parser)]
#[command(name = "velum-server", about = "Anonymous voting relay server")]
struct Config {
    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "VELUM_RPC_URL")]
    rpc_url: String,

    /// Hex private key of the relayer account.
    #[arg(long, env = "VELUM_RELAYER_KEY", hide_env_values = true)]
    relayer_key: String,

    /// Address of the voting contract.
    #[arg(long, env = "VELUM_CONTRACT_ADDRESS")]
    contract_address: String,

    /// Directory for the embedded database.
    #[arg(long, env = "VELUM_DB_PATH", default_value = "velum-db")]
    db_path: PathBuf,

    /// Socket address to listen on.
    #[arg(long, env = "VELUM_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let contract_address: H160 = config.contract_address.parse().map_err(|_| {
        RelayError::NotConfigured(format!(
            "invalid contract address: {}",
            config.contract_address
        ))
    })?;
    let ledger = Arc::new(
        EthersLedger::connect(&config.rpc_url, &config.relayer_key, contract_address).await?,
    );
    tracing::info!(relayer = ?ledger.address(), "connected to chain node");

    let store = Arc::new(SledStore::open(&config.db_path)?);
    let relayer = Arc::new(Relayer::new(ledger, store, RelayConfig::default()));

    let router = routes::build_router(relayer);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!(listen = %config.listen, "serving");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install shutdown handler");
    }
}
