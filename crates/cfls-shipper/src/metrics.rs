//! Queue depth metrics endpoint
//!
//! `GET /metrics` answers with a single plain-text metric line, readable by a
//! Prometheus scraper:
//!
//! ```text
//! cloudfront_logs_shipper_queue_length 12
//! ```

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::queue::WorkQueue;

pub const QUEUE_LENGTH_METRIC: &str = "cloudfront_logs_shipper_queue_length";

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Render the current queue depth as a metric line
pub fn render(queue: &WorkQueue) -> String {
    format!("{} {}\n", QUEUE_LENGTH_METRIC, queue.len())
}

async fn metrics(State(queue): State<Arc<WorkQueue>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE_TEXT)], render(&queue))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub fn router(queue: Arc<WorkQueue>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(queue)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
}

/// Serve the metrics router on `0.0.0.0:<port>` until `shutdown` resolves
pub async fn serve<F>(queue: Arc<WorkQueue>, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint listening");

    axum::serve(listener, router(queue))
        .with_graceful_shutdown(shutdown)
        .await
}
