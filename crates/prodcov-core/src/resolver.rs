//! Per-component coverage resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::analysis::{AnalysisJob, CoverageAnalyzer};
use crate::fetcher::FetchedComponent;
use crate::merger::MergedSession;
use crate::metrics::{Metric, METRICS};
use crate::model::{ComponentCoverage, ComponentOutcome, CoverageCounters, SkipReason};
use crate::obs;

/// A fetched component together with its counted coverage.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub component: FetchedComponent,
    pub counters: CoverageCounters,
}

impl ResolvedComponent {
    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn coverage(&self) -> ComponentCoverage {
        ComponentCoverage::from(&self.counters)
    }
}

/// Runs the analysis collaborator over each component's class subtree.
pub struct ComponentResolver {
    analyzer: Arc<dyn CoverageAnalyzer>,
    package_path: String,
}

impl ComponentResolver {
    pub fn new(analyzer: Arc<dyn CoverageAnalyzer>, package_path: impl Into<String>) -> Self {
        Self {
            analyzer,
            package_path: package_path.into(),
        }
    }

    /// Analyse components one at a time against the merged session.
    ///
    /// A component without a class tree under the package path, or whose
    /// analysis fails, is skipped; the rest carry on.
    pub async fn resolve(
        &self,
        session: &MergedSession,
        components: Vec<FetchedComponent>,
    ) -> Vec<ComponentOutcome<ResolvedComponent>> {
        let mut outcomes = Vec::with_capacity(components.len());
        for component in components {
            let class_root = component.classes_dir.join(&self.package_path);
            if !class_root.is_dir() {
                outcomes.push(obs::skip("resolve", component.name(), SkipReason::MissingClasses));
                continue;
            }

            let job = AnalysisJob {
                component: component.name().to_string(),
                class_root,
            };
            match self.analyzer.analyze(session, &job).await {
                Ok(counters) => {
                    METRICS.inc(Metric::ComponentsResolved);
                    debug!(
                        component = %job.component,
                        lines = counters.line.total(),
                        covered = counters.line.covered,
                        "component analysed"
                    );
                    outcomes.push(ComponentOutcome::Ready(ResolvedComponent {
                        component,
                        counters,
                    }));
                }
                Err(e) => outcomes.push(obs::skip(
                    "resolve",
                    &job.component,
                    SkipReason::AnalysisFailed(e.to_string()),
                )),
            }
        }
        outcomes
    }

    /// Component-name-keyed coverage of every resolved component.
    pub fn coverage_map(
        outcomes: &[ComponentOutcome<ResolvedComponent>],
    ) -> BTreeMap<String, ComponentCoverage> {
        outcomes
            .iter()
            .filter_map(ComponentOutcome::ready)
            .map(|resolved| (resolved.name().to_string(), resolved.coverage()))
            .collect()
    }
}
