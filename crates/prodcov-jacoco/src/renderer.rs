//! [`ReportRenderer`] backed by `jacococli report --html --xml`.

use std::ffi::OsString;

use async_trait::async_trait;
use prodcov_core::{CoverageError, MergedSession, RenderJob, ReportRenderer};

use crate::runner::JacocoCli;

/// File name of the XML report inside the output directory.
pub const XML_REPORT_FILE: &str = "report.xml";

pub struct JacocoRenderer {
    cli: JacocoCli,
}

impl JacocoRenderer {
    pub fn new(cli: JacocoCli) -> Self {
        Self { cli }
    }

    fn arguments(session: &MergedSession, job: &RenderJob) -> Vec<OsString> {
        let mut args = vec![
            session.path.clone().into_os_string(),
            OsString::from("--classfiles"),
            job.classes_dir.clone().into_os_string(),
        ];
        if let Some(sources) = &job.sources_dir {
            args.push(OsString::from("--sourcefiles"));
            args.push(sources.clone().into_os_string());
        }
        args.extend([
            OsString::from("--name"),
            OsString::from(&job.component),
            OsString::from("--html"),
            job.output_dir.clone().into_os_string(),
            OsString::from("--xml"),
            job.output_dir.join(XML_REPORT_FILE).into_os_string(),
            OsString::from("--quiet"),
        ]);
        args
    }
}

#[async_trait]
impl ReportRenderer for JacocoRenderer {
    async fn render(&self, session: &MergedSession, job: &RenderJob) -> prodcov_core::Result<()> {
        self.cli
            .report(Self::arguments(session, job))
            .await
            .map(|_| ())
            .map_err(|e| CoverageError::Render {
                component: job.component.clone(),
                detail: e.to_string(),
            })
    }
}
