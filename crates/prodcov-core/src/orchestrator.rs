//! Batch orchestration across product areas.
//!
//! Per product area: fetch, merge, resolve, aggregate, report. Product areas
//! run one after another, each inside its own workspace, and any error that
//! escapes a product area turns its result into a placeholder without
//! touching its siblings. Report emission never fails a product area.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};

use crate::aggregator::ProductAggregator;
use crate::analysis::{CoverageAnalyzer, ReportRenderer};
use crate::config::ServiceConfig;
use crate::emitter::ReportEmitter;
use crate::error::Result;
use crate::fetcher::{ArtifactFetcher, ArtifactSource, CiArtifactClient, FetchedComponent};
use crate::merger::ExecutionRecordMerger;
use crate::metrics::{Metric, METRICS};
use crate::model::{
    ComponentOutcome, CoverageRequest, CoverageResponse, ProductArea, ProductAreaResult,
    ProductCoverage,
};
use crate::obs;
use crate::resolver::{ComponentResolver, ResolvedComponent};
use crate::workspace::WorkspaceManager;

pub struct BatchOrchestrator {
    fetcher: ArtifactFetcher,
    resolver: ComponentResolver,
    aggregator: ProductAggregator,
    emitter: ReportEmitter,
    workspaces: WorkspaceManager,
    permits: Semaphore,
}

impl BatchOrchestrator {
    pub fn new(
        config: &ServiceConfig,
        source: Arc<dyn ArtifactSource>,
        analyzer: Arc<dyn CoverageAnalyzer>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        Self {
            fetcher: ArtifactFetcher::new(source, &config.ci),
            resolver: ComponentResolver::new(analyzer, config.analysis.package_path.clone()),
            aggregator: ProductAggregator::new(config.skip_components.clone()),
            emitter: ReportEmitter::new(renderer, config.storage.reports_root.clone()),
            workspaces: WorkspaceManager::new(config.workspace_root()),
            permits: Semaphore::new(config.max_concurrent_requests.max(1)),
        }
    }

    /// Build an orchestrator that downloads from the configured CI server.
    pub fn from_config(
        config: &ServiceConfig,
        analyzer: Arc<dyn CoverageAnalyzer>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Result<Self> {
        config.validate()?;
        let source = Arc::new(CiArtifactClient::new(&config.ci)?);
        Ok(Self::new(config, source, analyzer, renderer))
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Parse, validate and run a JSON request body.
    ///
    /// A body that is not a well-formed product list yields
    /// `Invalid request data` before any I/O.
    pub async fn handle_json(&self, body: &[u8]) -> CoverageResponse {
        match CoverageRequest::from_json(body) {
            Ok(request) => self.run(&request).await,
            Err(e) => {
                warn!(error = %e, "rejecting coverage request");
                CoverageResponse::invalid_request()
            }
        }
    }

    /// Aggregate every product area of `request`.
    ///
    /// Always succeeds; degraded product areas show up as placeholders.
    pub async fn run(&self, request: &CoverageRequest) -> CoverageResponse {
        // The semaphore is never closed, so acquisition cannot fail.
        let _permit = self.permits.acquire().await.ok();
        obs::emit_batch_started(request.product_areas.len());

        let mut results = Vec::with_capacity(request.product_areas.len());
        for area in &request.product_areas {
            let outcome = self
                .aggregate_product(area)
                .instrument(obs::product_span(&area.product_id))
                .await;
            let result = match outcome {
                Ok(coverage) => {
                    METRICS.inc(Metric::ProductsAggregated);
                    obs::emit_product_finished(
                        &coverage.product_id,
                        coverage.components.len(),
                        coverage.overall_lines_to_cover,
                        coverage.overall_covered_ratio,
                    );
                    ProductAreaResult::from(coverage)
                }
                Err(e) => {
                    METRICS.inc(Metric::ProductsDegraded);
                    obs::emit_product_failed(&area.product_id, &e);
                    ProductAreaResult::placeholder(area.product_id.clone())
                }
            };
            results.push(result);
        }

        METRICS.flush();
        CoverageResponse::success(results)
    }

    async fn aggregate_product(&self, area: &ProductArea) -> Result<ProductCoverage> {
        obs::emit_product_started(&area.product_id, area.components.len());
        let workspace = self.workspaces.acquire()?;

        let fetched: Vec<FetchedComponent> = self
            .fetcher
            .fetch_all(&area.components, &workspace)
            .await
            .into_iter()
            .filter_map(ComponentOutcome::into_ready)
            .collect();

        let records: Vec<_> = fetched
            .iter()
            .flat_map(|c| c.execution_files.iter().cloned())
            .collect();
        let merged = ExecutionRecordMerger::merge(
            &area.product_id,
            &records,
            &workspace.merged_session_path(),
        )?;

        let outcomes = self.resolver.resolve(&merged, fetched).await;
        let coverage = self
            .aggregator
            .aggregate(&area.product_id, ComponentResolver::coverage_map(&outcomes));

        let resolved: Vec<ResolvedComponent> = outcomes
            .into_iter()
            .filter_map(ComponentOutcome::into_ready)
            .collect();
        let reports = self.emitter.emit(&area.product_id, &merged, &resolved).await;
        let rendered = reports.iter().filter(|r| r.is_ready()).count();
        info!(
            product_id = %area.product_id,
            rendered,
            failed = reports.len() - rendered,
            "reports emitted"
        );

        if let Err(e) = workspace.release() {
            error!(product_id = %area.product_id, error = %e, "workspace release failed");
        }
        Ok(coverage)
    }
}
