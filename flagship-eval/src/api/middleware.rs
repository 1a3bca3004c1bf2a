//! Request middleware: CORS and request-scoped logging.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn, Instrument};

/// Permissive CORS for the read-only evaluation surface.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(86_400))
}

/// Request logging middleware
pub struct RequestLogger;

impl RequestLogger {
    /// Attach a request id to the request's tracing span and log the
    /// outcome. Handler-level error logs inherit the id through the span.
    pub async fn log(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let request_id = uuid::Uuid::new_v4().to_string();

        let span = tracing::info_span!("request", request_id = %request_id);

        async move {
            let start = Instant::now();
            let response = next.run(req).await;
            let status = response.status();
            let duration_ms = start.elapsed().as_millis() as u64;

            if status.is_server_error() {
                warn!(%method, %uri, %status, duration_ms, "request failed");
            } else {
                info!(%method, %uri, %status, duration_ms, "request completed");
            }

            response
        }
        .instrument(span)
        .await
    }
}
