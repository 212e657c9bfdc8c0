use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use gramgrab_api::create_router;
use gramgrab_core::Config;
use gramgrab_proxy::DownloadProxy;

/// In-flight downloads get this long to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Serve the HTTP API until a shutdown signal arrives.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let proxy = DownloadProxy::new(&config.proxy).context("Failed to build download proxy")?;
    let router = create_router(Arc::new(proxy));

    let http_address = config.http_address();
    let http_addr: SocketAddr = http_address
        .parse()
        .with_context(|| format!("Invalid HTTP address '{http_address}'"))?;
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP address {http_addr}"))?;

    info!("HTTP server listening on {}", http_addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let graceful = async move {
        let _ = shutdown_rx.changed().await;
    };
    let mut handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
    });

    tokio::select! {
        result = &mut handle => {
            error!("HTTP server stopped unexpectedly");
            result??;
            return Ok(());
        }
        () = shutdown_signal() => {
            info!("Shutdown signal received, starting graceful shutdown...");
        }
    }

    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(joined) => {
            joined?.context("HTTP server error")?;
            info!("HTTP server shut down gracefully");
        }
        Err(_) => warn!("Downloads still active after {:?}, exiting anyway", DRAIN_TIMEOUT),
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
