use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{reqwest, Client, Http};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod chain;
mod config;
mod error;
mod relay;

use api::AppState;
use chain::{AlloyLedger, Ledger, LogFetcher, MessageAggregator, DEFAULT_EVENT_CANDIDATES};
use config::Config;
use error::{RelayerError, Result};
use relay::{RateLimiter, RelayService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting Board Relayer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Contract: {}", config.contract_address);
    tracing::info!("Deployment block: {}", config.deployment_block);
    tracing::info!(
        "Log chunk size: {} blocks ({:?})",
        config.log_chunk_size,
        config.log_fetch_policy
    );
    if !config.rpc_configured {
        tracing::warn!("BASE_RPC_URL not set, using {}", config.rpc_url);
    }

    let signer: PrivateKeySigner = config
        .relayer_private_key
        .parse()
        .map_err(|e| RelayerError::Config(format!("Invalid RELAYER_PRIVATE_KEY: {e}")))?;
    tracing::info!("Relayer address: {}", signer.address());

    let rpc_url: reqwest::Url = config
        .rpc_url
        .parse()
        .map_err(|e| RelayerError::Config(format!("Invalid RPC URL: {e}")))?;
    // Receipt waits are driven by the client's poll interval
    let client = RpcClient::new(Http::<Client>::new(rpc_url), false)
        .with_poll_interval(config.confirmation_poll);

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_client(client);

    let chain_head = provider.get_block_number().await?;
    tracing::info!("Chain head: {}", chain_head);

    let ledger: Arc<dyn Ledger> = Arc::new(AlloyLedger::<_, Http<Client>>::new(
        provider,
        config.confirmation_timeout,
    ));

    let limiter = Arc::new(RateLimiter::new(config.rate_window_ms, config.rate_max));
    tracing::info!(
        "Rate limit: {} requests per {}ms per caller",
        config.rate_max,
        config.rate_window_ms
    );

    let relay = RelayService::new(
        ledger.clone(),
        config.contract_address,
        config.api_key.clone(),
        limiter.clone(),
    );
    let messages = MessageAggregator::new(
        ledger.clone(),
        LogFetcher::new(ledger, config.rpc_requests_per_second)
            .with_policy(config.log_fetch_policy),
        config.contract_address,
        config.deployment_block,
        config.log_chunk_size,
        DEFAULT_EVENT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = {
        let limiter = limiter.clone();
        let mut shutdown_rx = shutdown_rx.clone();

        tokio::spawn(async move {
            let period = Duration::from_millis(limiter.window_ms().max(1_000));
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = limiter.evict_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, tracked = limiter.len(), "Evicted expired rate-limit entries");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let state = AppState::new(relay, messages, config);

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        RelayerError::Config(format!("Failed to bind to {}: {}", addr, e))
    })?;

    tracing::info!("Relayer listening on {}", addr);

    let router = api::create_router(state);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await?;

    sweeper_handle.await.ok();

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    notify_shutdown(wait_for_signal(), shutdown_tx).await;
}

async fn notify_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: std::future::Future<Output = &'static str>,
{
    let received = signal.await;
    tracing::info!(signal = received, "Draining connections before exit");
    shutdown_tx.send_replace(true);
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable, only Ctrl+C stops the relayer: {e}");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        name = wait_for_ctrl_c() => name,
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl+C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
