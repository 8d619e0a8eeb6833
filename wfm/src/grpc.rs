//! gRPC server hosting the standard health service

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;
use tracing::{debug, info};
use wfm_cluster::Cluster;

/// Serve gRPC on `addr` until `shutdown_rx` flips
pub async fn serve(
    addr: std::net::SocketAddr,
    cluster: Arc<Cluster>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (reporter, health_service) = tonic_health::server::health_reporter();
    update_health(&reporter, &cluster).await;

    let reporter_task = tokio::spawn(report_health(
        reporter,
        cluster,
        interval,
        shutdown_rx.clone(),
    ));

    info!("gRPC server listening on {}", addr);
    let result = tonic::transport::Server::builder()
        .add_service(health_service)
        .serve_with_shutdown(addr, async move {
            let _ = shutdown_rx.changed().await;
        })
        .await;

    reporter_task.abort();
    result?;
    info!("gRPC server shut down gracefully");
    Ok(())
}

/// Overall serving status follows the cluster health check
async fn report_health(
    reporter: HealthReporter,
    cluster: Arc<Cluster>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => update_health(&reporter, &cluster).await,
            _ = shutdown_rx.changed() => {
                reporter.set_service_status("", ServingStatus::NotServing).await;
                debug!("gRPC health reporter stopped");
                return;
            }
        }
    }
}

async fn update_health(reporter: &HealthReporter, cluster: &Cluster) {
    let status = match cluster.health_check() {
        Ok(()) => ServingStatus::Serving,
        Err(e) => {
            debug!("Reporting NOT_SERVING: {}", e);
            ServingStatus::NotServing
        }
    };
    reporter.set_service_status("", status).await;
}
