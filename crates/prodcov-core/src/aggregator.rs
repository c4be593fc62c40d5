//! Product-level roll-up of component line coverage.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::SkipList;
use crate::model::{ComponentCoverage, ProductCoverage};

/// Weights component ratios by their line counts, leaving out components
/// matched by the skip list.
#[derive(Debug, Clone, Default)]
pub struct ProductAggregator {
    skip_list: SkipList,
}

impl ProductAggregator {
    pub fn new(skip_list: SkipList) -> Self {
        Self { skip_list }
    }

    /// Skipped components stay in the per-component map; they only drop out
    /// of the overall figures. Covered lines are truncated per component
    /// before summing.
    pub fn aggregate(
        &self,
        product_id: &str,
        components: BTreeMap<String, ComponentCoverage>,
    ) -> ProductCoverage {
        let mut overall_lines_to_cover = 0u64;
        let mut overall_covered_lines = 0u64;

        for (name, coverage) in &components {
            if self.skip_list.matches(name) {
                debug!(component = %name, "excluded from overall ratio by skip list");
                continue;
            }
            overall_covered_lines += (coverage.lines_to_cover as f64 * coverage.covered_ratio) as u64;
            overall_lines_to_cover += coverage.lines_to_cover;
        }

        let overall_covered_ratio = (overall_lines_to_cover > 0)
            .then(|| overall_covered_lines as f64 / overall_lines_to_cover as f64);

        ProductCoverage {
            product_id: product_id.to_string(),
            components,
            overall_lines_to_cover,
            overall_covered_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, u64, f64)]) -> BTreeMap<String, ComponentCoverage> {
        entries
            .iter()
            .map(|(name, lines, ratio)| (name.to_string(), ComponentCoverage::new(*lines, *ratio)))
            .collect()
    }

    #[test]
    fn test_weighted_by_lines() {
        let agg = ProductAggregator::default();
        let cov = agg.aggregate("P1", map(&[("a", 100, 0.5), ("b", 300, 1.0)]));
        assert_eq!(cov.overall_lines_to_cover, 400);
        assert_eq!(cov.overall_covered_ratio, Some(350.0 / 400.0));
    }

    #[test]
    fn test_single_component() {
        let cov = ProductAggregator::default().aggregate("P1", map(&[("svc-a", 100, 0.8)]));
        assert_eq!(cov.overall_lines_to_cover, 100);
        assert_eq!(cov.overall_covered_ratio, Some(0.8));
    }

    #[test]
    fn test_no_lines_means_no_ratio() {
        let agg = ProductAggregator::default();
        let cov = agg.aggregate("P1", BTreeMap::new());
        assert_eq!(cov.overall_lines_to_cover, 0);
        assert_eq!(cov.overall_covered_ratio, None);

        let cov = agg.aggregate("P1", map(&[("empty", 0, 0.0)]));
        assert_eq!(cov.overall_covered_ratio, None);
        assert_eq!(cov.components.len(), 1);
    }

    #[test]
    fn test_skip_list_excludes_from_overall_only() {
        let agg = ProductAggregator::new(SkipList::parse("legacy"));
        let cov = agg.aggregate(
            "P1",
            map(&[("legacy-auth", 50, 0.0), ("auth-legacy-v2", 50, 0.0), ("core", 10, 0.5)]),
        );
        assert_eq!(cov.components.len(), 3);
        assert_eq!(cov.overall_lines_to_cover, 10);
        assert_eq!(cov.overall_covered_ratio, Some(0.5));
    }

    #[test]
    fn test_covered_lines_truncate_per_component() {
        // 3 * 0.5 = 1.5 -> 1, twice: 2 covered of 6 rather than 3.
        let cov = ProductAggregator::default().aggregate("P1", map(&[("a", 3, 0.5), ("b", 3, 0.5)]));
        assert_eq!(cov.overall_lines_to_cover, 6);
        assert_eq!(cov.overall_covered_ratio, Some(2.0 / 6.0));
    }
}
