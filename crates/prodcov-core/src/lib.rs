//! prodcov core library
//!
//! Aggregates JaCoCo coverage of CI-built components into per-product-area
//! figures and report trees.

pub mod aggregator;
pub mod analysis;
pub mod archive;
pub mod config;
pub mod emitter;
pub mod error;
pub mod exec;
pub mod fetcher;
pub mod lookup;
pub mod merger;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod resolver;
pub mod source_report;
pub mod telemetry;
pub mod workspace;

pub use aggregator::ProductAggregator;
pub use analysis::{AnalysisJob, CoverageAnalyzer, RenderJob, ReportRenderer};
pub use config::{AnalysisConfig, CiConfig, Credential, ServiceConfig, SkipList, StorageConfig};
pub use emitter::{ManifestEntry, ReportEmitter, ReportManifest};
pub use error::{CoverageError, Result};
pub use exec::{ClassExecution, ExecutionSession, SessionInfo};
pub use fetcher::{ArtifactFetcher, ArtifactSource, CiArtifactClient, FetchedComponent};
pub use lookup::{LookupStatus, ReportKind, ReportLookup, ReportLookupResult};
pub use merger::{ExecutionRecordMerger, MergedSession};
pub use model::{
    ComponentCoverage, ComponentOutcome, ComponentRef, Counter, CoverageCounters,
    CoverageRequest, CoverageResponse, ProductArea, ProductAreaResult, ProductCoverage,
    ResponseStatus, SkipReason,
};
pub use orchestrator::BatchOrchestrator;
pub use resolver::{ComponentResolver, ResolvedComponent};
pub use source_report::{SourceFileCounters, SourceFileQuery, SourceFileReport};
pub use workspace::{Workspace, WorkspaceManager};
