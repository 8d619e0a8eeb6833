//! HTTP probes, metrics and a diagnostic view of the database cluster

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use wfm_cluster::{Cluster, NodeRole, NodeState};

#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<Cluster>,
}

pub fn create_router(cluster: Arc<Cluster>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route("/cluster", get(cluster_status))
        .with_state(AppState { cluster })
}

/// Basic health check (always returns OK if server is running)
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Ready only while a primary database is available
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.cluster.health_check() {
        Ok(()) => (StatusCode::OK, "OK".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn metrics() -> impl IntoResponse {
    match wfm_core::metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[derive(Debug, Serialize)]
struct ClusterView {
    checked_at: Option<DateTime<Utc>>,
    nodes: Vec<NodeView>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct NodeView {
    addr: String,
    state: NodeState,
    role: NodeRole,
    latency_ms: Option<f64>,
    replication_lag_ms: Option<f64>,
}

async fn cluster_status(State(state): State<AppState>) -> Json<ClusterView> {
    let snapshot = state.cluster.checked_nodes();

    let nodes = state
        .cluster
        .nodes()
        .iter()
        .map(|node| {
            let checked = snapshot.alive().iter().find(|c| c.addr() == node.addr());
            NodeView {
                addr: node.addr().to_string(),
                state: node.state(),
                role: checked.map_or(NodeRole::Unknown, |c| c.role()),
                latency_ms: checked.map(|c| c.latency().as_secs_f64() * 1000.0),
                replication_lag_ms: checked
                    .and_then(|c| c.replication_lag())
                    .map(|lag| lag.as_secs_f64() * 1000.0),
            }
        })
        .collect();

    Json(ClusterView {
        checked_at: snapshot.checked_at(),
        nodes,
        error: snapshot.err().map(ToString::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_cluster;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn router(addrs: &[&'static str]) -> Router {
        create_router(fake_cluster(addrs).await)
    }

    async fn fetch(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let (status, body) = fetch(router(&["db-down"]).await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_ready_follows_primary() {
        let (status, _) = fetch(router(&["db-primary"]).await, "/ready").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = fetch(router(&["db-down"]).await, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("Primary database not alive"));
    }

    #[tokio::test]
    async fn test_cluster_view() {
        let (status, body) = fetch(router(&["db-primary", "db-down"]).await, "/cluster").await;
        assert_eq!(status, StatusCode::OK);

        let view: serde_json::Value = serde_json::from_str(&body).expect("json");
        let nodes = view["nodes"].as_array().expect("nodes");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["addr"], "db-primary");
        assert_eq!(nodes[0]["role"], "primary");
        assert_eq!(nodes[0]["state"], "alive");
        assert_eq!(nodes[1]["state"], "dead");
        assert_eq!(nodes[1]["role"], "unknown");
        assert!(view["error"].as_str().expect("error").contains("db-down"));
    }
}
