//! Metrics module for academy-service.
//! Provides Prometheus metrics for billing, plan and outbox operations.

use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder,
    HistogramTimer, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Store query duration histogram
pub static DB_QUERY_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Generated charges by outcome (created, updated, skipped, unpriced)
pub static CHARGES_GENERATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Charge status transitions
pub static CHARGE_STATUS_CHANGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Plan change requests by outcome
pub static PLAN_CHANGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payment processor webhook events
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Outbox emails by outcome (enqueued, sent, retry, failed)
pub static EMAILS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn init_counter(cell: &OnceLock<IntCounterVec>, name: &str, help: &str, labels: &[&str]) {
    if cell.get().is_some() {
        return;
    }
    match register_int_counter_vec!(opts!(name, help), labels) {
        Ok(counter) => {
            let _ = cell.set(counter);
        }
        Err(e) => tracing::warn!(metric = name, error = %e, "Failed to register metric"),
    }
}

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    if DB_QUERY_DURATION.get().is_none() {
        match register_histogram_vec!(
            histogram_opts!(
                "academy_db_query_duration_seconds",
                "Store query duration",
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
            ),
            &["operation"]
        ) {
            Ok(histogram) => {
                let _ = DB_QUERY_DURATION.set(histogram);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to register DB_QUERY_DURATION"),
        }
    }

    init_counter(
        &CHARGES_GENERATED_TOTAL,
        "academy_charges_generated_total",
        "Monthly charge generation results by outcome",
        &["outcome"],
    );
    init_counter(
        &CHARGE_STATUS_CHANGES_TOTAL,
        "academy_charge_status_changes_total",
        "Charge status transitions by source and target status",
        &["from", "to", "trigger"],
    );
    init_counter(
        &PLAN_CHANGES_TOTAL,
        "academy_plan_changes_total",
        "Plan change requests by target plan and outcome",
        &["plan_code", "outcome"],
    );
    init_counter(
        &WEBHOOK_EVENTS_TOTAL,
        "academy_webhook_events_total",
        "Payment processor webhook events by type and outcome",
        &["event_type", "outcome"],
    );
    init_counter(
        &EMAILS_TOTAL,
        "academy_emails_total",
        "Outbox emails by kind and outcome",
        &["kind", "outcome"],
    );
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Start a query timer; observed when dropped.
pub fn db_timer(operation: &str) -> Option<HistogramTimer> {
    DB_QUERY_DURATION
        .get()
        .map(|h| h.with_label_values(&[operation]).start_timer())
}

fn inc(cell: &OnceLock<IntCounterVec>, labels: &[&str], by: u64) {
    if let Some(counter) = cell.get() {
        counter.with_label_values(labels).inc_by(by);
    }
}

/// Record generator results.
pub fn record_generation(created: u64, updated: u64, skipped: u64, unpriced: u64) {
    inc(&CHARGES_GENERATED_TOTAL, &["created"], created);
    inc(&CHARGES_GENERATED_TOTAL, &["updated"], updated);
    inc(&CHARGES_GENERATED_TOTAL, &["skipped"], skipped);
    inc(&CHARGES_GENERATED_TOTAL, &["unpriced"], unpriced);
}

/// Record a charge status transition.
pub fn record_charge_status_change(from: &str, to: &str, trigger: &str) {
    inc(&CHARGE_STATUS_CHANGES_TOTAL, &[from, to, trigger], 1);
}

/// Record a plan change request.
pub fn record_plan_change(plan_code: &str, outcome: &str) {
    inc(&PLAN_CHANGES_TOTAL, &[plan_code, outcome], 1);
}

/// Record a webhook event.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    inc(&WEBHOOK_EVENTS_TOTAL, &[event_type, outcome], 1);
}

/// Record an outbox email outcome.
pub fn record_email(kind: &str, outcome: &str) {
    inc(&EMAILS_TOTAL, &[kind, outcome], 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_exported_after_init() {
        init_metrics();
        init_metrics();
        record_generation(2, 0, 1, 0);
        record_plan_change("free", "rejected");
        let text = get_metrics();
        assert!(text.contains("academy_charges_generated_total"));
        assert!(text.contains("academy_plan_changes_total"));
    }
}
