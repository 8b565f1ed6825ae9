//! Tollgate - caching forward proxy with host blacklisting.
//!
//! This is the main binary that runs:
//! - The forward proxy (CONNECT tunneling, blacklist, response cache)
//! - The management API and dashboard

use anyhow::Context;
use clap::Parser;
use tokio::sync::oneshot;

use tollgate_app::bootstrap::{initial_blacklist, open_store};
use tollgate_app::logging::init_logging;
use tollgate_app::Args;
use tollgate_core::{Blacklist, RequestLog};
use tollgate_proxy::{ProxyConfig, ProxyServer};
use tollgate_server::{AppState, Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.debug, &args.log_level);

    let store = open_store(args.store.clone());
    let blacklist = Blacklist::with_patterns(initial_blacklist(store.as_deref(), &args.block));
    let request_log = RequestLog::new();

    let mut proxy_config = ProxyConfig::new()
        .with_addr(args.proxy_addr())
        .with_cache_capacity(args.cache_capacity)
        .with_blacklist(blacklist.clone())
        .with_request_log(request_log.clone());
    if args.no_cache {
        proxy_config = proxy_config.without_caching();
    }
    if let Some(files) = args.tls_files() {
        proxy_config = proxy_config.with_tls(files);
    }

    let proxy = ProxyServer::new(proxy_config)
        .context("Failed to configure proxy")?
        .start()
        .await
        .context("Failed to start proxy")?;
    tracing::info!("Proxy listening on {}", proxy.addr());

    let mut state = AppState::new(blacklist, request_log);
    if let Some(store) = store {
        state = state.with_store(store);
    }
    let server_config = ServerConfig::default()
        .with_host(args.host.to_string())
        .with_port(args.api_port)
        .with_dashboard_dir(Some(args.dashboard_dir.clone()));
    let server = Server::new(server_config, state).context("Failed to configure API server")?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut api = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");
        }
        result = &mut api => {
            proxy.stop().await;
            result.context("API server task failed")??;
            anyhow::bail!("API server exited unexpectedly");
        }
    }

    proxy.stop().await;
    let _ = stop_tx.send(());
    api.await.context("API server task failed")??;

    tracing::info!("Tollgate stopped");
    Ok(())
}
