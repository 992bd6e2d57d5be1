//! Prometheus metrics for signal recording, scoring and the periodic jobs

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

/// Job runs by job name and status (completed/skipped/error)
static JOB_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signal_job_runs_total",
        "Total number of periodic job runs",
        &["job", "status"]
    )
    .expect("failed to register signal_job_runs_total")
});

/// Items handled by the periodic jobs (succeeded/failed)
static JOB_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signal_job_items_total",
        "Items processed by periodic jobs",
        &["job", "outcome"]
    )
    .expect("failed to register signal_job_items_total")
});

static JOB_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "signal_job_duration_seconds",
        "Duration of periodic job runs",
        &["job"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .expect("failed to register signal_job_duration_seconds")
});

/// Penalties applied during scoring, by rule
static PENALTIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signal_scoring_penalties_total",
        "Exclusion penalties applied to recommendation candidates",
        &["rule"]
    )
    .expect("failed to register signal_scoring_penalties_total")
});

static EXCLUSION_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signal_exclusion_writes_total",
        "Exclusion upserts and removals",
        &["operation", "exclusion_type"]
    )
    .expect("failed to register signal_exclusion_writes_total")
});

static SIGNALS_RECORDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "signal_events_recorded_total",
        "Signals appended to the event store",
        &["event_type"]
    )
    .expect("failed to register signal_events_recorded_total")
});

pub fn record_job_run(job: &str, status: &str, duration: Duration) {
    JOB_RUNS_TOTAL.with_label_values(&[job, status]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn record_job_items(job: &str, outcome: &str, count: u64) {
    JOB_ITEMS_TOTAL.with_label_values(&[job, outcome]).inc_by(count);
}

pub fn record_penalty(rule: &str) {
    PENALTIES_TOTAL.with_label_values(&[rule]).inc();
}

pub fn record_exclusion_write(operation: &str, exclusion_type: &str) {
    EXCLUSION_WRITES_TOTAL
        .with_label_values(&[operation, exclusion_type])
        .inc();
}

pub fn record_signal(event_type: &str) {
    SIGNALS_RECORDED_TOTAL.with_label_values(&[event_type]).inc();
}

/// Text exposition of the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
