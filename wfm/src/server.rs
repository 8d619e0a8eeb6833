//! Server lifecycle management
//!
//! Starts the gRPC and HTTP servers, waits for a shutdown signal, lets both
//! drain their in-flight requests and only then closes the database cluster.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use wfm_cluster::Cluster;
use wfm_core::Config;

/// WFM server - manages all server components
pub struct WfmServer {
    config: Config,
    cluster: Arc<Cluster>,
}

impl WfmServer {
    pub const fn new(config: Config, cluster: Arc<Cluster>) -> Self {
        Self { config, cluster }
    }

    /// Start all servers and wait for shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting WFM server...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut grpc_handle = self.start_grpc_server(shutdown_rx.clone())?;
        let mut http_handle = self.start_http_server(shutdown_rx).await?;

        info!("All servers started successfully");

        // A handle that won the select is spent and must not be awaited again
        let running = tokio::select! {
            _ = &mut grpc_handle => {
                error!("gRPC server stopped unexpectedly");
                vec![("HTTP", http_handle)]
            }
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                vec![("gRPC", grpc_handle)]
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                vec![("gRPC", grpc_handle), ("HTTP", http_handle)]
            }
        };

        let _ = shutdown_tx.send(true);

        self.shutdown(running).await;

        Ok(())
    }

    /// Drain the servers still running, then release the database
    async fn shutdown(&self, running: Vec<(&'static str, JoinHandle<()>)>) {
        info!("Shutting down WFM server...");

        let drain_timeout = self.config.shutdown.drain_timeout();
        info!("Waiting up to {}s for in-flight requests to drain...", drain_timeout.as_secs());

        let drained = tokio::time::timeout(drain_timeout, async {
            for (name, handle) in running {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("{} server task failed: {}", name, e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Drain timeout reached, proceeding with shutdown");
        }

        info!("Closing database cluster...");
        self.cluster.close().await;
        info!("Database cluster closed");

        info!("WFM server shut down complete");
    }

    fn start_grpc_server(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
        let grpc_addr: std::net::SocketAddr = self
            .config
            .grpc_address()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid gRPC address '{}': {}", self.config.grpc_address(), e))?;
        let cluster = self.cluster.clone();
        let interval = self.config.database.cluster.update_interval();

        Ok(tokio::spawn(async move {
            if let Err(e) = crate::grpc::serve(grpc_addr, cluster, interval, shutdown_rx).await {
                error!("gRPC server error: {}", e);
            }
        }))
    }

    async fn start_http_server(&self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let http_addr: std::net::SocketAddr = http_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {}", http_address, e))?;

        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {}: {}", http_addr, e))?;
        let http_router = crate::http::create_router(self.cluster.clone());

        Ok(tokio::spawn(async move {
            info!("HTTP server listening on {}", http_addr);

            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, http_router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        }))
    }
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
