//! Durable report trees per product area and component.
//!
//! ```text
//! {reports_root}/{product_id}/
//!   manifest.json
//!   {component}/index.html ...      rendered report
//!   {component}/report.xml
//!   {component}/compiled-files/...  class tree the report was built from
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{RenderJob, ReportRenderer};
use crate::archive::copy_dir_all;
use crate::error::Result;
use crate::merger::MergedSession;
use crate::metrics::{Metric, METRICS};
use crate::model::{ComponentOutcome, SkipReason};
use crate::obs;
use crate::resolver::ResolvedComponent;

pub const COMPILED_FILES_DIR: &str = "compiled-files";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Provenance of one rendered component report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub component: String,
    pub job_path: String,
    pub execution_sha256: String,
    pub resources_sha256: String,
}

/// Written next to a product's component reports after every emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifest {
    pub product_id: String,
    pub generated_at: DateTime<Utc>,
    pub components: Vec<ManifestEntry>,
}

pub struct ReportEmitter {
    renderer: Arc<dyn ReportRenderer>,
    reports_root: PathBuf,
}

impl ReportEmitter {
    pub fn new(renderer: Arc<dyn ReportRenderer>, reports_root: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            reports_root: reports_root.into(),
        }
    }

    pub fn product_dir(&self, product_id: &str) -> PathBuf {
        self.reports_root.join(product_id)
    }

    /// Render every resolved component of a product area.
    ///
    /// Returns the report directory of each component, or the reason it has
    /// none. Report storage problems never fail the product area; a manifest
    /// that cannot be written is logged and counted as a failed report.
    pub async fn emit(
        &self,
        product_id: &str,
        session: &MergedSession,
        components: &[ResolvedComponent],
    ) -> Vec<ComponentOutcome<PathBuf>> {
        let product_dir = self.product_dir(product_id);
        let mut outcomes = Vec::with_capacity(components.len());
        let mut entries = Vec::new();

        for resolved in components {
            let name = resolved.name();
            let output_dir = product_dir.join(name);
            match self.render_component(session, resolved, &output_dir).await {
                Ok(()) => {
                    METRICS.inc(Metric::ReportsRendered);
                    entries.push(ManifestEntry {
                        component: name.to_string(),
                        job_path: resolved.component.reference.job_path.clone(),
                        execution_sha256: resolved.component.execution_sha256.clone(),
                        resources_sha256: resolved.component.resources_sha256.clone(),
                    });
                    outcomes.push(ComponentOutcome::Ready(output_dir));
                }
                Err(e) => {
                    METRICS.inc(Metric::ReportsFailed);
                    remove_partial(&output_dir).await;
                    outcomes.push(obs::skip("render", name, SkipReason::RenderFailed(e.to_string())));
                }
            }
        }

        let manifest = ReportManifest {
            product_id: product_id.to_string(),
            generated_at: Utc::now(),
            components: entries,
        };
        if let Err(e) = write_manifest(&product_dir, &manifest).await {
            METRICS.inc(Metric::ReportsFailed);
            warn!(
                product_id = %product_id,
                path = %product_dir.display(),
                error = %e,
                "could not write report manifest"
            );
        }
        outcomes
    }

    async fn render_component(
        &self,
        session: &MergedSession,
        resolved: &ResolvedComponent,
        output_dir: &Path,
    ) -> Result<()> {
        if tokio::fs::try_exists(output_dir).await? {
            tokio::fs::remove_dir_all(output_dir).await?;
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let job = RenderJob {
            component: resolved.name().to_string(),
            classes_dir: resolved.component.classes_dir.clone(),
            sources_dir: resolved.component.sources_dir.clone(),
            output_dir: output_dir.to_path_buf(),
        };
        self.renderer.render(session, &job).await?;

        let from = job.classes_dir;
        let to = output_dir.join(COMPILED_FILES_DIR);
        tokio::task::spawn_blocking(move || copy_dir_all(&from, &to))
            .await
            .map_err(|e| std::io::Error::other(format!("copy task failed: {e}")))??;
        Ok(())
    }
}

async fn remove_partial(output_dir: &Path) {
    if !tokio::fs::try_exists(output_dir).await.unwrap_or(false) {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(output_dir).await {
        warn!(path = %output_dir.display(), error = %e, "could not clean partial report");
    }
}

async fn write_manifest(product_dir: &Path, manifest: &ReportManifest) -> Result<()> {
    tokio::fs::create_dir_all(product_dir).await?;
    let json = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(product_dir.join(MANIFEST_FILE), json).await?;
    Ok(())
}
