//! Prometheus metrics for the database cluster
//!
//! All metrics live in one registry exposed via the /metrics endpoint.

use std::time::Duration;

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_gauge_with_registry, CounterVec, Encoder, HistogramVec, IntGauge, Registry,
    TextEncoder,
};
use wfm_cluster::{CheckedNode, CheckedNodes, ClusterNode, LogTracer, Tracer};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Nodes that passed the latest check round
pub static DB_CLUSTER_ALIVE_NODES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "db_cluster_alive_nodes",
        "Database nodes alive after the latest check round",
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_ALIVE_NODES")
});

pub static DB_CLUSTER_PRIMARY_NODES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "db_cluster_primary_nodes",
        "Database nodes in the primary role",
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_PRIMARY_NODES")
});

pub static DB_CLUSTER_STANDBY_NODES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "db_cluster_standby_nodes",
        "Database nodes in the standby role",
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_STANDBY_NODES")
});

pub static DB_CLUSTER_NODE_CHECK_FAILURES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "db_cluster_node_check_failures_total",
        "Failed database node checks",
        &["node"],
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_NODE_CHECK_FAILURES")
});

pub static DB_CLUSTER_NODE_TRANSITIONS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
    register_counter_vec_with_registry!(
        "db_cluster_node_transitions_total",
        "Database node liveness transitions",
        &["node", "state"],
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_NODE_TRANSITIONS")
});

pub static DB_CLUSTER_NODE_CHECK_LATENCY: std::sync::LazyLock<HistogramVec> = std::sync::LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        "db_cluster_node_check_latency_seconds",
        "Database node check latency in seconds",
        &["node"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        REGISTRY.clone()
    )
    .expect("Failed to register DB_CLUSTER_NODE_CHECK_LATENCY")
});

/// Cluster tracer that records metrics and then logs like [`LogTracer`]
#[derive(Debug, Default)]
pub struct MetricsTracer {
    log: LogTracer,
}

impl Tracer for MetricsTracer {
    fn update_nodes(&self) {
        self.log.update_nodes();
    }

    fn node_checked(&self, node: &ClusterNode, latency: Duration, err: Option<&wfm_cluster::Error>) {
        DB_CLUSTER_NODE_CHECK_LATENCY
            .with_label_values(&[node.addr()])
            .observe(latency.as_secs_f64());
        if err.is_some() {
            DB_CLUSTER_NODE_CHECK_FAILURES.with_label_values(&[node.addr()]).inc();
        }
        self.log.node_checked(node, latency, err);
    }

    fn node_alive(&self, node: &CheckedNode) {
        DB_CLUSTER_NODE_TRANSITIONS
            .with_label_values(&[node.addr(), "alive"])
            .inc();
        self.log.node_alive(node);
    }

    fn node_dead(&self, node: &ClusterNode, err: &wfm_cluster::Error) {
        DB_CLUSTER_NODE_TRANSITIONS
            .with_label_values(&[node.addr(), "dead"])
            .inc();
        self.log.node_dead(node, err);
    }

    fn updated_nodes(&self, nodes: &CheckedNodes) {
        DB_CLUSTER_ALIVE_NODES.set(gauge_value(nodes.alive().len()));
        DB_CLUSTER_PRIMARY_NODES.set(gauge_value(nodes.primaries().len()));
        DB_CLUSTER_STANDBY_NODES.set(gauge_value(nodes.standbys().len()));
        self.log.updated_nodes(nodes);
    }

    fn waiters_notified(&self, count: usize) {
        self.log.waiters_notified(count);
    }
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Expose metrics in Prometheus format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
