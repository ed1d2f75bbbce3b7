//! Readiness/liveness/metrics HTTP surface (spec §6.4).

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::clients::{DeliveryClient, QueueClient};
use crate::consumer::ConsumerStats;

/// The single value injected into every health handler. Cheap to clone:
/// everything behind it is already an `Arc`.
#[derive(Clone)]
pub struct HealthState {
    queue: Arc<dyn QueueClient>,
    delivery: Arc<dyn DeliveryClient>,
    stream_name: String,
    stats: Arc<ConsumerStats>,
    delivery_timeout: Duration,
    metrics_handle: PrometheusHandle,
}

impl HealthState {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        delivery: Arc<dyn DeliveryClient>,
        stream_name: String,
        stats: Arc<ConsumerStats>,
        delivery_timeout: Duration,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            queue,
            delivery,
            stream_name,
            stats,
            delivery_timeout,
            metrics_handle,
        }
    }

    /// Readiness: the queue answers, the delivery stream is active, and the
    /// receive loop has not accumulated 3 or more consecutive failures.
    async fn is_ready(&self) -> bool {
        if self.stats.consecutive_receive_failures.load(Ordering::Relaxed) >= 3 {
            return false;
        }
        if self.queue.receive(0, 0, 0).await.is_err() {
            return false;
        }
        self.delivery.describe_stream_active(&self.stream_name).await
    }

    /// Liveness: either delivery activity happened recently, or there is
    /// nothing pending to deliver (a quiet queue is not a stuck process).
    fn is_live(&self) -> bool {
        let last = self.stats.last_activity_unix_ms.load(Ordering::Relaxed);
        if last == 0 {
            return true;
        }
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        now_ms.saturating_sub(last) <= self.delivery_timeout.as_millis() as u64
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health/readiness", get(readiness))
        .route("/health/liveness", get(liveness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn readiness(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    if state.is_ready().await {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "not_ready" }),
        )
    }
}

async fn liveness(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    if state.is_live() {
        (StatusCode::OK, Json(HealthResponse { status: "live" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "stuck" }),
        )
    }
}

async fn metrics(State(state): State<HealthState>) -> String {
    state.metrics_handle.render()
}
