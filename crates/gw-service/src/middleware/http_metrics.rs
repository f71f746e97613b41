//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so it captures every response, including
//! framework-level rejections (404, 405, 415, body parse failures) that
//! never reach a handler or the admission stages.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Record method, normalized path, status, and duration for each response.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed();
    record_http_request(&method, &path, response.status().as_u16(), duration);

    response
}
