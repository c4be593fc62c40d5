//! Request, response and coverage value types.
//!
//! Wire types use camelCase field names so the JSON payloads match what the
//! dashboard consuming this service already sends and expects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// A named grouping of CI components whose coverage is rolled up together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductArea {
    pub product_id: String,
    /// CI job paths, e.g. `"platform/svc-auth"`.
    #[serde(default)]
    pub components: Vec<String>,
}

/// Incoming aggregation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRequest {
    pub product_areas: Vec<ProductArea>,
}

impl CoverageRequest {
    /// Parse and validate a JSON request body.
    ///
    /// Fails with [`CoverageError::InvalidRequest`] on malformed JSON, a
    /// missing `productAreas` list, or a product area without an identifier.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let request: CoverageRequest = serde_json::from_slice(body)
            .map_err(|e| CoverageError::InvalidRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Product identifiers key report directories, so they must be usable
    /// as a single path segment.
    pub fn validate(&self) -> Result<()> {
        for (idx, area) in self.product_areas.iter().enumerate() {
            if area.product_id.trim().is_empty() {
                return Err(CoverageError::InvalidRequest(format!(
                    "product area #{idx} has an empty productId"
                )));
            }
            if !is_path_segment(&area.product_id) {
                return Err(CoverageError::InvalidRequest(format!(
                    "productId '{}' is not a valid path segment",
                    area.product_id
                )));
            }
        }
        Ok(())
    }
}

/// A CI job path plus the canonical component name derived from it.
///
/// The canonical name is the last non-empty `/` segment and keys storage
/// paths, report directories and skip-list matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    pub job_path: String,
    pub name: String,
}

impl ComponentRef {
    /// Returns `None` when the reference has no usable last segment, or when
    /// that segment could escape the workspace (`.` / `..`).
    pub fn parse(reference: &str) -> Option<Self> {
        let job_path = reference.trim().trim_matches('/');
        let name = job_path.rsplit('/').next()?.trim();
        if !is_path_segment(name) {
            return None;
        }
        Some(Self {
            job_path: job_path.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_path)
    }
}

/// Missed/covered pair for one coverage metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub missed: u64,
    pub covered: u64,
}

impl Counter {
    pub fn new(missed: u64, covered: u64) -> Self {
        Self { missed, covered }
    }

    pub fn total(&self) -> u64 {
        self.missed + self.covered
    }

    /// Covered fraction in `[0, 1]`; `0.0` for an empty counter.
    pub fn covered_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.covered as f64 / total as f64,
        }
    }

    pub fn add(&mut self, other: Counter) {
        self.missed += other.missed;
        self.covered += other.covered;
    }
}

/// Everything the analysis collaborator counts for a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageCounters {
    pub line: Counter,
    pub branch: Counter,
    pub method: Counter,
    pub instruction: Counter,
}

/// Line coverage of a single component as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCoverage {
    pub lines_to_cover: u64,
    pub covered_ratio: f64,
}

impl ComponentCoverage {
    pub fn new(lines_to_cover: u64, covered_ratio: f64) -> Self {
        Self {
            lines_to_cover,
            covered_ratio,
        }
    }
}

impl From<&CoverageCounters> for ComponentCoverage {
    fn from(counters: &CoverageCounters) -> Self {
        Self {
            lines_to_cover: counters.line.total(),
            covered_ratio: counters.line.covered_ratio(),
        }
    }
}

/// Aggregated coverage for one product area.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCoverage {
    pub product_id: String,
    pub components: BTreeMap<String, ComponentCoverage>,
    pub overall_lines_to_cover: u64,
    /// `None` iff `overall_lines_to_cover == 0`.
    pub overall_covered_ratio: Option<f64>,
}

/// Per-product entry of the response.
///
/// A `None` `component_coverage` marks a product area whose aggregation
/// failed outright (placeholder result).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAreaResult {
    pub product_id: String,
    pub component_coverage: Option<BTreeMap<String, ComponentCoverage>>,
    pub overall_lines_to_cover: Option<String>,
    pub overall_covered_ratio: Option<String>,
}

impl ProductAreaResult {
    /// Placeholder for a product area that could not be aggregated.
    pub fn placeholder(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            component_coverage: None,
            overall_lines_to_cover: None,
            overall_covered_ratio: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.component_coverage.is_none()
    }
}

impl From<ProductCoverage> for ProductAreaResult {
    fn from(coverage: ProductCoverage) -> Self {
        Self {
            product_id: coverage.product_id,
            component_coverage: Some(coverage.components),
            overall_lines_to_cover: Some(coverage.overall_lines_to_cover.to_string()),
            overall_covered_ratio: coverage.overall_covered_ratio.map(format_ratio),
        }
    }
}

/// Top-level response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "Success")]
    Success,
    #[serde(rename = "Invalid request data")]
    InvalidRequestData,
}

/// Response of one aggregation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResponse {
    pub status: ResponseStatus,
    pub product_areas: Vec<ProductAreaResult>,
}

impl CoverageResponse {
    pub fn success(product_areas: Vec<ProductAreaResult>) -> Self {
        Self {
            status: ResponseStatus::Success,
            product_areas,
        }
    }

    pub fn invalid_request() -> Self {
        Self {
            status: ResponseStatus::InvalidRequestData,
            product_areas: Vec::new(),
        }
    }

    /// Number of product areas that degraded to placeholders.
    pub fn placeholder_count(&self) -> usize {
        self.product_areas
            .iter()
            .filter(|p| p.is_placeholder())
            .count()
    }
}

/// Why a component dropped out of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SkipReason {
    /// The reference has no usable canonical name.
    InvalidReference,
    /// One of the component's archives could not be downloaded or unpacked.
    Unavailable(String),
    /// The execution archive held no execution data file.
    NoExecutionData,
    /// No compiled class tree under the configured package path.
    MissingClasses,
    /// Another reference in the same product area has the same name.
    Duplicate,
    /// The analysis collaborator failed.
    AnalysisFailed(String),
    /// The rendering collaborator failed; coverage numbers are unaffected.
    RenderFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidReference => f.write_str("invalid component reference"),
            SkipReason::Unavailable(detail) => write!(f, "artifacts unavailable: {detail}"),
            SkipReason::NoExecutionData => f.write_str("no execution data in archive"),
            SkipReason::MissingClasses => f.write_str("compiled class tree missing"),
            SkipReason::Duplicate => f.write_str("duplicate component name"),
            SkipReason::AnalysisFailed(detail) => write!(f, "analysis failed: {detail}"),
            SkipReason::RenderFailed(detail) => write!(f, "report rendering failed: {detail}"),
        }
    }
}

/// Result of a per-component stage: either a value or a recorded skip.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentOutcome<T> {
    Ready(T),
    Skipped { component: String, reason: SkipReason },
}

impl<T> ComponentOutcome<T> {
    pub fn skipped(component: impl Into<String>, reason: SkipReason) -> Self {
        ComponentOutcome::Skipped {
            component: component.into(),
            reason,
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ComponentOutcome::Ready(value) => Some(value),
            ComponentOutcome::Skipped { .. } => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            ComponentOutcome::Ready(value) => Some(value),
            ComponentOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ComponentOutcome::Ready(_))
    }
}

/// True when `s` can be joined onto a directory without leaving it.
pub fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

/// Format a ratio for the response payload.
///
/// Integral values keep one fractional digit (`1.0`, `0.0`) so consumers that
/// parse the field as a decimal never see a bare integer.
pub fn format_ratio(ratio: f64) -> String {
    let s = ratio.to_string();
    if s.contains('.') || s.contains('e') || !ratio.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}
