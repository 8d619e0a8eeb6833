//! Database cluster initialization

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use wfm_cluster::{Cluster, ClusterOptions, Connection, PostgresConnection};

use crate::config::{mask_database_url, DatabaseConfig};
use crate::metrics::MetricsTracer;

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
}

/// Build the database cluster from configuration
///
/// Pools connect lazily, so unreachable nodes only show up as dead in the
/// first check round. With `startup_wait_seconds` set, waits that long for a
/// primary and fails startup if none appears.
pub async fn init_database_cluster(config: &DatabaseConfig) -> Result<Arc<Cluster>> {
    let mut connections: Vec<Arc<dyn Connection>> = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        info!(node = %node.name, url = %mask_database_url(&node.url), "Adding database node");
        let conn = PostgresConnection::connect_lazy(&node.name, &node.url, pool_options(config))
            .map_err(|e| anyhow::anyhow!("Invalid database node {}: {}", node.name, e))?;
        connections.push(Arc::new(conn));
    }

    let cluster_config = &config.cluster;
    let options = ClusterOptions::default()
        .with_update_interval(cluster_config.update_interval())
        .with_update_timeout(cluster_config.update_timeout())
        .with_checker(cluster_config.checker.build())
        .with_picker(cluster_config.picker.build())
        .with_periodic_updates(cluster_config.periodic_updates)
        .with_tracer(Arc::new(MetricsTracer::default()));

    let cluster = Arc::new(Cluster::new(connections, options).await?);

    if let Some(wait) = cluster_config.startup_wait() {
        info!("Waiting up to {:?} for a primary database", wait);
        if let Err(e) = cluster.wait_for_primary_timeout(wait).await {
            cluster.close().await;
            return Err(anyhow::anyhow!("No primary database available at startup: {e}"));
        }
    }

    match cluster.health_check() {
        Ok(()) => info!("Database cluster ready"),
        Err(e) => warn!("Database cluster started without a primary: {e}"),
    }

    Ok(cluster)
}
