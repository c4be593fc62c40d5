//! Locating rendered reports.
//!
//! Lookup never fails: every outcome, including bad input, is a typed
//! [`ReportLookupResult`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::model::is_path_segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Html,
    Xml,
}

impl ReportKind {
    /// Entry file of this report kind inside a component's report directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportKind::Html => "index.html",
            ReportKind::Xml => "report.xml",
        }
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ReportKind::Html),
            "xml" => Ok(ReportKind::Xml),
            other => Err(format!("unknown report type '{other}'")),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Html => f.write_str("html"),
            ReportKind::Xml => f.write_str("xml"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupStatus {
    #[serde(rename = "Success")]
    Success,
    #[serde(rename = "Report missing")]
    ReportMissing,
    #[serde(rename = "Invalid report type")]
    InvalidReportType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLookupResult {
    pub report_path: Option<String>,
    pub component_name: String,
    pub status: LookupStatus,
}

impl ReportLookupResult {
    fn without_path(component_name: &str, status: LookupStatus) -> Self {
        Self {
            report_path: None,
            component_name: component_name.to_string(),
            status,
        }
    }
}

pub struct ReportLookup {
    reports_root: PathBuf,
    base_url: Option<String>,
}

impl ReportLookup {
    pub fn new(reports_root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            reports_root: reports_root.into(),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(storage.reports_root.clone(), storage.report_base_url.clone())
    }

    pub fn reports_root(&self) -> &Path {
        &self.reports_root
    }

    /// Look up a report by kind string (`html` or `xml`).
    pub fn lookup(&self, product_id: &str, component_name: &str, kind: &str) -> ReportLookupResult {
        match kind.parse::<ReportKind>() {
            Ok(kind) => self.lookup_kind(product_id, component_name, kind),
            Err(_) => ReportLookupResult::without_path(component_name, LookupStatus::InvalidReportType),
        }
    }

    pub fn lookup_kind(
        &self,
        product_id: &str,
        component_name: &str,
        kind: ReportKind,
    ) -> ReportLookupResult {
        if !is_path_segment(product_id) || !is_path_segment(component_name) {
            return ReportLookupResult::without_path(component_name, LookupStatus::ReportMissing);
        }

        let file = self
            .reports_root
            .join(product_id)
            .join(component_name)
            .join(kind.file_name());
        if !file.is_file() {
            return ReportLookupResult::without_path(component_name, LookupStatus::ReportMissing);
        }

        let report_path = match &self.base_url {
            Some(base) => format!("{base}/{product_id}/{component_name}/{}", kind.file_name()),
            None => file.display().to_string(),
        };
        ReportLookupResult {
            report_path: Some(report_path),
            component_name: component_name.to_string(),
            status: LookupStatus::Success,
        }
    }
}
