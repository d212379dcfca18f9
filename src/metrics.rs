// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Beacon operator.
//!
//! Every metric is prefixed with `beacon_firestoned_io_` (prometheus-safe version of
//! "beacon.firestoned.io") and registered in [`METRICS_REGISTRY`], which `main` serves on
//! `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - reconcile outcomes, durations and requeues per kind
//! - **Resource Lifecycle Metrics** - objects created, updated and deleted by the operator
//! - **Error Metrics** - errors by class
//! - **Association Metrics** - rollouts delayed by the version gate
//!
//! # Example
//!
//! ```rust,no_run
//! use beacon::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("Beat", std::time::Duration::from_millis(120));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

/// Namespace prefix for all Beacon metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "beacon_firestoned_io";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Every operator metric.
struct Metrics {
    /// Labels: `resource_type`, `status` (`success`, `error`, `requeue`)
    reconciliations: CounterVec,
    /// Labels: `resource_type`
    reconciliation_duration: HistogramVec,
    /// Labels: `resource_type`, `reason`
    requeues: CounterVec,
    /// Labels: `resource_type`
    created: CounterVec,
    /// Labels: `resource_type`
    updated: CounterVec,
    /// Labels: `resource_type`
    deleted: CounterVec,
    /// Labels: `resource_type`, `error_type`
    errors: CounterVec,
    /// Labels: `resource_type`, `association_type`
    delayed_rollouts: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<CounterVec, prometheus::Error> {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)?;
    METRICS_REGISTRY.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let duration_opts = HistogramOpts::new(
            format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
            "Duration of reconciliations in seconds by resource type",
        )
        .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
        let reconciliation_duration = HistogramVec::new(duration_opts, &["resource_type"])?;
        METRICS_REGISTRY.register(Box::new(reconciliation_duration.clone()))?;

        Ok(Self {
            reconciliations: counter(
                "reconciliations_total",
                "Total number of reconciliations by resource type and status",
                &["resource_type", "status"],
            )?,
            reconciliation_duration,
            requeues: counter(
                "requeues_total",
                "Total number of requeue operations by resource type and reason",
                &["resource_type", "reason"],
            )?,
            created: counter(
                "resources_created_total",
                "Total number of resources created by type",
                &["resource_type"],
            )?,
            updated: counter(
                "resources_updated_total",
                "Total number of resources updated by type",
                &["resource_type"],
            )?,
            deleted: counter(
                "resources_deleted_total",
                "Total number of resources deleted by type",
                &["resource_type"],
            )?,
            errors: counter(
                "errors_total",
                "Total number of errors by resource type and error category",
                &["resource_type", "error_type"],
            )?,
            delayed_rollouts: counter(
                "delayed_rollouts_total",
                "Total number of rollouts delayed until an associated resource is upgraded",
                &["resource_type", "association_type"],
            )?,
        })
    }
}

static METRICS: LazyLock<Option<Metrics>> = LazyLock::new(|| match Metrics::new() {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        warn!("Failed to register metrics, metrics are disabled: {e}");
        None
    }
});

fn with_metrics(f: impl FnOnce(&Metrics)) {
    if let Some(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled (e.g., `Beat`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    with_metrics(|m| {
        m.reconciliations.with_label_values(&[resource_type, "success"]).inc();
        m.reconciliation_duration
            .with_label_values(&[resource_type])
            .observe(duration.as_secs_f64());
    });
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    with_metrics(|m| {
        m.reconciliations.with_label_values(&[resource_type, "error"]).inc();
        m.reconciliation_duration
            .with_label_values(&[resource_type])
            .observe(duration.as_secs_f64());
    });
}

/// Record a reconciliation requeue
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `reason` - Reason for requeue (`conflict`, `error`, `association_pending`, `periodic`)
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    with_metrics(|m| {
        m.reconciliations.with_label_values(&[resource_type, "requeue"]).inc();
        m.requeues.with_label_values(&[resource_type, reason]).inc();
    });
}

/// Record the creation of an object owned by the operator.
pub fn record_resource_created(resource_type: &str) {
    with_metrics(|m| m.created.with_label_values(&[resource_type]).inc());
}

/// Record the update of an object owned by the operator.
pub fn record_resource_updated(resource_type: &str) {
    with_metrics(|m| m.updated.with_label_values(&[resource_type]).inc());
}

/// Record the deletion of an object owned by the operator.
pub fn record_resource_deleted(resource_type: &str) {
    with_metrics(|m| m.deleted.with_label_values(&[resource_type]).inc());
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where error occurred
/// * `error_type` - Category of error (e.g., `InvalidSpec`, `ReconcileFailed`)
pub fn record_error(resource_type: &str, error_type: &str) {
    with_metrics(|m| m.errors.with_label_values(&[resource_type, error_type]).inc());
}

/// Record a rollout held back by the version gate.
pub fn record_delayed_rollout(resource_type: &str, association_type: &str) {
    with_metrics(|m| {
        m.delayed_rollouts
            .with_label_values(&[resource_type, association_type])
            .inc();
    });
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    LazyLock::force(&METRICS);
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
