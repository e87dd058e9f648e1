use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::logging::{LogEvent, Logger, RequestInfo, ResponseInfo};

pub const REQUEST_TAGS: [&str; 1] = ["request"];

/// Emits one event per completed request carrying `req`, `res` and
/// `responseTime` fields.
pub async fn log_requests(State(logger): State<Logger>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let req = RequestInfo::new(request.method().as_str(), host.as_deref(), &url);

    let response = next.run(request).await;

    let status = response.status();
    let event = LogEvent::new(&REQUEST_TAGS, "request completed")
        .with_request(req)
        .with_response(ResponseInfo::new(status.as_u16(), status.canonical_reason()))
        .with_response_time(started.elapsed());
    logger.emit(&event);

    response
}
