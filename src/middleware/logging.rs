//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency.

use super::rate_limit::client_identity;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Skipped to keep probes out of the logs.
const HEALTHCHECK_PATH: &str = "/v1/healthcheck";

/// Middleware that logs HTTP requests with timing information.
///
/// Logs at INFO level for successful and 4xx requests, WARN level for 5xx.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == HEALTHCHECK_PATH {
        return next.run(request).await;
    }

    let client = client_identity(&request);
    let start = Instant::now();
    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        client_ip = %client,
    );

    let response = next.run(request).instrument(span).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            client_ip = %client,
            "Request failed (5xx)"
        );
    } else if status >= 400 {
        info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            client_ip = %client,
            "Request completed (4xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            "Request completed"
        );
    }

    response
}
