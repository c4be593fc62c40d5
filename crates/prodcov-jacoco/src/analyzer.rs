//! [`CoverageAnalyzer`] backed by `jacococli report --csv`.

use std::ffi::OsString;

use async_trait::async_trait;
use prodcov_core::{AnalysisJob, CoverageAnalyzer, CoverageCounters, CoverageError, MergedSession};
use tracing::debug;

use crate::csv::parse_counters;
use crate::error::JacocoError;
use crate::runner::JacocoCli;

pub struct JacocoAnalyzer {
    cli: JacocoCli,
}

impl JacocoAnalyzer {
    pub fn new(cli: JacocoCli) -> Self {
        Self { cli }
    }

    async fn counters(&self, session: &MergedSession, job: &AnalysisJob) -> Result<CoverageCounters, JacocoError> {
        let scratch = tempfile::tempdir()?;
        let csv_path = scratch.path().join("coverage.csv");

        self.cli
            .report(vec![
                session.path.clone().into_os_string(),
                OsString::from("--classfiles"),
                job.class_root.clone().into_os_string(),
                OsString::from("--name"),
                OsString::from(&job.component),
                OsString::from("--csv"),
                csv_path.clone().into_os_string(),
                OsString::from("--quiet"),
            ])
            .await?;

        let csv = tokio::fs::read_to_string(&csv_path).await?;
        let counters = parse_counters(&csv)?;
        debug!(component = %job.component, lines = counters.line.total(), "jacoco analysis done");
        Ok(counters)
    }
}

#[async_trait]
impl CoverageAnalyzer for JacocoAnalyzer {
    async fn analyze(&self, session: &MergedSession, job: &AnalysisJob) -> prodcov_core::Result<CoverageCounters> {
        self.counters(session, job)
            .await
            .map_err(|e| CoverageError::Analysis {
                component: job.component.clone(),
                detail: e.to_string(),
            })
    }
}
