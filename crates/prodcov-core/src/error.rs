//! Error taxonomy for the coverage aggregation pipeline.
//!
//! Only [`CoverageError::NoExecutionData`] and [`CoverageError::InvalidRequest`]
//! are allowed to cross a product-area boundary; everything below that is
//! absorbed per component and surfaces as a [`SkipReason`](crate::model::SkipReason).

use thiserror::Error;

/// Errors produced by the coverage aggregation pipeline.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// An artifact could not be downloaded from the CI server.
    #[error("download failed for {url}: {detail}")]
    Download { url: String, detail: String },

    /// None of the product area's components yielded execution data.
    #[error("no execution data available for product area '{product_id}'")]
    NoExecutionData { product_id: String },

    /// The coverage analysis collaborator failed for a component.
    #[error("coverage analysis failed for component '{component}': {detail}")]
    Analysis { component: String, detail: String },

    /// The report rendering collaborator failed for a component.
    #[error("report rendering failed for component '{component}': {detail}")]
    Render { component: String, detail: String },

    /// The incoming request was not a well-formed product list.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An execution data file could not be decoded or merged.
    #[error("execution data error: {0}")]
    ExecData(String),

    /// A downloaded archive could not be unpacked.
    #[error("archive error: {0}")]
    Archive(String),

    /// The service configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A rendered XML report could not be parsed.
    #[error("report xml error: {0}")]
    ReportXml(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CoverageError {
    fn from(err: reqwest::Error) -> Self {
        CoverageError::Http(err.to_string())
    }
}

impl From<quick_xml::Error> for CoverageError {
    fn from(err: quick_xml::Error) -> Self {
        CoverageError::ReportXml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for CoverageError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        CoverageError::ReportXml(err.to_string())
    }
}

impl From<zip::result::ZipError> for CoverageError {
    fn from(err: zip::result::ZipError) -> Self {
        CoverageError::Archive(err.to_string())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CoverageError>;
