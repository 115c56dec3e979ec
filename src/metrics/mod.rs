//! Ambient Prometheus instrumentation (§A.4). Exposed at `GET /metrics` via
//! `metrics-exporter-prometheus`; not itself a core concern, carried because
//! the reference backend instruments every service this way regardless of
//! which domain features are in scope.

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_MATCHED_TOTAL: &str = "orders_matched_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const ORDER_MATCH_DURATION_SECONDS: &str = "order_match_duration_seconds";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_UNITS: &str = "trade_volume_units";

    pub const PRODUCTION_RUNS_TOTAL: &str = "production_runs_total";
    pub const PRODUCTION_YIELD_UNITS: &str = "production_yield_units";

    pub const ORDERBOOK_DEPTH: &str = "orderbook_depth";

    pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
    pub const WS_MESSAGES_SENT_TOTAL: &str = "ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
    pub const WS_LOGIN_FAILURES_TOTAL: &str = "ws_login_failures_total";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";
}

pub mod labels {
    pub const PRODUCT: &str = "product";
    pub const SIDE: &str = "side";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const PATH: &str = "path";
}

/// Builds and installs the global Prometheus recorder, returning a handle
/// `GET /metrics` renders on each scrape.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
        )
        .unwrap_or_else(|_| PrometheusBuilder::new())
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_MATCH_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1],
        )
        .unwrap_or_else(|_| PrometheusBuilder::new())
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::PATH => path.to_string(),
        labels::STATUS_CODE => status.to_string()
    )
    .increment(1);
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::PATH => path.to_string()
    )
    .record(duration_secs);
}

pub fn set_http_requests_in_flight(count: i64) {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).set(count as f64);
}

pub fn record_order_submitted(product: &str, side: &str) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::PRODUCT => product.to_string(),
        labels::SIDE => side.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled(product: &str) {
    counter!(names::ORDERS_CANCELLED_TOTAL, labels::PRODUCT => product.to_string()).increment(1);
}

pub fn record_order_rejected(product: &str) {
    counter!(names::ORDERS_REJECTED_TOTAL, labels::PRODUCT => product.to_string()).increment(1);
}

pub fn record_order_match_duration(duration_secs: f64) {
    histogram!(names::ORDER_MATCH_DURATION_SECONDS).record(duration_secs);
}

pub fn record_trade_executed(product: &str, quantity: i64) {
    counter!(names::TRADES_EXECUTED_TOTAL, labels::PRODUCT => product.to_string()).increment(1);
    counter!(names::TRADE_VOLUME_UNITS, labels::PRODUCT => product.to_string()).increment(quantity as u64);
}

pub fn record_production_run(product: &str, yield_units: i64) {
    counter!(names::PRODUCTION_RUNS_TOTAL, labels::PRODUCT => product.to_string()).increment(1);
    counter!(names::PRODUCTION_YIELD_UNITS, labels::PRODUCT => product.to_string()).increment(yield_units as u64);
}

pub fn set_orderbook_depth(product: &str, side: &str, depth: i64) {
    gauge!(
        names::ORDERBOOK_DEPTH,
        labels::PRODUCT => product.to_string(),
        labels::SIDE => side.to_string()
    )
    .set(depth as f64);
}

pub fn set_ws_connections_active(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_sent() {
    counter!(names::WS_MESSAGES_SENT_TOTAL).increment(1);
}

pub fn record_ws_message_received() {
    counter!(names::WS_MESSAGES_RECEIVED_TOTAL).increment(1);
}

pub fn record_ws_login_failure() {
    counter!(names::WS_LOGIN_FAILURES_TOTAL).increment(1);
}

pub fn record_rate_limit_rejection(team_name: &str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "team" => team_name.to_string()).increment(1);
}
