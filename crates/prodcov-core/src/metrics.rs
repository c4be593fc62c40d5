//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does this after each batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Counted pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    DownloadsSucceeded,
    DownloadsFailed,
    ComponentsResolved,
    ComponentsSkipped,
    ProductsAggregated,
    ProductsDegraded,
    WorkspacesAcquired,
    WorkspacesReleased,
    ReportsRendered,
    ReportsFailed,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::DownloadsSucceeded,
        Metric::DownloadsFailed,
        Metric::ComponentsResolved,
        Metric::ComponentsSkipped,
        Metric::ProductsAggregated,
        Metric::ProductsDegraded,
        Metric::WorkspacesAcquired,
        Metric::WorkspacesReleased,
        Metric::ReportsRendered,
        Metric::ReportsFailed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::DownloadsSucceeded => "downloads_succeeded",
            Metric::DownloadsFailed => "downloads_failed",
            Metric::ComponentsResolved => "components_resolved",
            Metric::ComponentsSkipped => "components_skipped",
            Metric::ProductsAggregated => "products_aggregated",
            Metric::ProductsDegraded => "products_degraded",
            Metric::WorkspacesAcquired => "workspaces_acquired",
            Metric::WorkspacesReleased => "workspaces_released",
            Metric::ReportsRendered => "reports_rendered",
            Metric::ReportsFailed => "reports_failed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Fixed set of relaxed atomic counters.
pub struct Metrics {
    counters: [AtomicU64; 10],
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            counters: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    pub fn inc(&self, metric: Metric) {
        self.counters[metric.index()].fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = metric.name(), "counter incremented");
    }

    pub fn get(&self, metric: Metric) -> u64 {
        self.counters[metric.index()].load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            downloads_succeeded = self.get(Metric::DownloadsSucceeded),
            downloads_failed = self.get(Metric::DownloadsFailed),
            components_resolved = self.get(Metric::ComponentsResolved),
            components_skipped = self.get(Metric::ComponentsSkipped),
            products_aggregated = self.get(Metric::ProductsAggregated),
            products_degraded = self.get(Metric::ProductsDegraded),
            workspaces_acquired = self.get(Metric::WorkspacesAcquired),
            workspaces_released = self.get(Metric::WorkspacesReleased),
            reports_rendered = self.get(Metric::ReportsRendered),
            reports_failed = self.get(Metric::ReportsFailed),
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.get(Metric::DownloadsFailed), 0);
        m.inc(Metric::DownloadsFailed);
        m.inc(Metric::DownloadsFailed);
        assert_eq!(m.get(Metric::DownloadsFailed), 2);

        m.inc(Metric::ReportsRendered);
        assert_eq!(m.get(Metric::ReportsRendered), 1);
        assert_eq!(m.get(Metric::ReportsFailed), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        for metric in Metric::ALL {
            m.inc(metric);
        }
        m.reset();
        for metric in Metric::ALL {
            assert_eq!(m.get(metric), 0, "{}", metric.name());
        }
    }

    #[test]
    fn metric_indices_are_distinct() {
        for (idx, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), idx);
        }
    }
}
