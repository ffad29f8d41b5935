//! HTTP API for head health checks

use crate::config::ApiConfig;
use crate::error::KeepaliveResult;
use crate::health::HealthCache;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the API router over a health cache
pub fn router(cache: HealthCache) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

/// Run the HTTP API server until `cancel` fires
pub async fn run_server(
    config: ApiConfig,
    cache: HealthCache,
    cancel: CancellationToken,
) -> KeepaliveResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Start and serving on {}", addr);

    axum::serve(listener, router(cache))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

/// Latest head report
async fn health_check(State(cache): State<HealthCache>) -> Response {
    match cache.snapshot().await {
        Some(report) => (
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(report.as_ref().clone()),
        )
            .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "The API is not available now",
        )
            .into_response(),
    }
}

/// Liveness probe
async fn ping() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthReport;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use ethers::types::U64;
    use tower::ServiceExt;

    async fn get(cache: HealthCache, uri: &str) -> Response {
        router(cache)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_unavailable_before_first_refresh() {
        let response = get(HealthCache::new(), "/health").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"The API is not available now");
    }

    #[tokio::test]
    async fn test_health_returns_report() {
        let cache = HealthCache::new();
        cache
            .set(HealthReport {
                healthy: true,
                height: U64::from(0xe90cc9u64),
                timestamp: Utc.timestamp_opt(1_710_555_125, 0).unwrap(),
            })
            .await;

        let response = get(cache, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["latest_block_number"], "0xe90cc9");
        assert_eq!(json["latest_block_timestamp"], "2024-03-16T02:12:05Z");
    }

    #[tokio::test]
    async fn test_ping() {
        let response = get(HealthCache::new(), "/ping").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
