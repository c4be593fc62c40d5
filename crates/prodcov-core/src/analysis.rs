//! Contracts of the external coverage engines.
//!
//! The pipeline never counts coverage or renders reports itself; it drives
//! these two collaborators. `prodcov-jacoco` implements both on top of the
//! JaCoCo command-line tool, tests use in-memory fakes.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::merger::MergedSession;
use crate::model::CoverageCounters;

/// Inputs for analysing one component.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub component: String,
    /// Root of the component's class subtree (`classes/{package_path}`).
    pub class_root: PathBuf,
}

/// Inputs for rendering one component's report tree.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub component: String,
    pub classes_dir: PathBuf,
    /// Absent when the resources archive carried no sources.
    pub sources_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

/// Counts covered/missed lines, branches, methods and instructions.
#[async_trait]
pub trait CoverageAnalyzer: Send + Sync {
    async fn analyze(&self, session: &MergedSession, job: &AnalysisJob) -> Result<CoverageCounters>;
}

/// Materialises a browsable report tree into `job.output_dir`.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, session: &MergedSession, job: &RenderJob) -> Result<()>;
}
