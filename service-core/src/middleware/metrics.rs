use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use prometheus::{
    HistogramVec, IntCounterVec, histogram_opts, opts, register_histogram_vec,
    register_int_counter_vec,
};
use std::time::Instant;

static HTTP_REQUESTS_TOTAL: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"]
    )
    .ok()
});

static HTTP_REQUEST_DURATION: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "http_request_duration_seconds",
            "HTTP request duration",
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        ),
        &["method", "path"]
    )
    .ok()
});

/// Record request count and latency in the default prometheus registry.
///
/// The route template (`/api/charges/:id`) is used as the path label so ids
/// do not explode label cardinality.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();

    if let Some(counter) = HTTP_REQUESTS_TOTAL.as_ref() {
        counter
            .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
            .inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION.as_ref() {
        histogram
            .with_label_values(&[method.as_str(), path.as_str()])
            .observe(start.elapsed().as_secs_f64());
    }

    response
}
