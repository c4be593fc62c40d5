//! Structured lifecycle events for aggregation batches.
//!
//! Every event carries an `event` field so log pipelines can filter on it:
//! `batch.started`, `product.started`, `product.finished`, `product.failed`,
//! `component.skipped`, `workspace.released`.

use std::path::Path;

use tracing::{info, warn};

use crate::metrics::{Metric, METRICS};
use crate::model::{ComponentOutcome, SkipReason};

/// Span tagging every log line emitted while one product area aggregates.
///
/// Attach it to the product's future with [`tracing::Instrument`] so it
/// stays correct across await points.
pub fn product_span(product_id: &str) -> tracing::Span {
    tracing::info_span!("prodcov.product", product_id = %product_id)
}

pub fn emit_batch_started(product_areas: usize) {
    info!(event = "batch.started", product_areas = product_areas);
}

pub fn emit_product_started(product_id: &str, components: usize) {
    info!(event = "product.started", product_id = %product_id, components = components);
}

/// Emit event: product aggregated, with the overall percentage when defined.
pub fn emit_product_finished(
    product_id: &str,
    components: usize,
    overall_lines_to_cover: u64,
    overall_covered_ratio: Option<f64>,
) {
    match overall_covered_ratio {
        Some(ratio) => info!(
            event = "product.finished",
            product_id = %product_id,
            components = components,
            overall_lines_to_cover = overall_lines_to_cover,
            overall_percent = (ratio * 100.0).round(),
        ),
        None => info!(
            event = "product.finished",
            product_id = %product_id,
            components = components,
            overall_lines_to_cover = overall_lines_to_cover,
        ),
    }
}

/// Emit event: product degraded to a placeholder result.
pub fn emit_product_failed(product_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "product.failed", product_id = %product_id, error = %error);
}

pub fn emit_component_skipped(stage: &str, component: &str, reason: &SkipReason) {
    warn!(event = "component.skipped", stage = stage, component = %component, reason = %reason);
}

/// Record a component dropping out of `stage` and return the skip outcome.
pub fn skip<T>(stage: &str, component: &str, reason: SkipReason) -> ComponentOutcome<T> {
    METRICS.inc(Metric::ComponentsSkipped);
    emit_component_skipped(stage, component, &reason);
    ComponentOutcome::skipped(component, reason)
}

pub fn emit_workspace_released(path: &Path) {
    info!(event = "workspace.released", path = %path.display());
}
