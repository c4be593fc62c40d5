//! prodcov JaCoCo adapters
//!
//! Implements the coverage analysis and report rendering collaborators of
//! `prodcov-core` by shelling out to `java -jar jacococli.jar report`.

pub mod analyzer;
pub mod csv;
pub mod error;
pub mod renderer;
pub mod runner;

pub use analyzer::JacocoAnalyzer;
pub use error::{JacocoError, Result};
pub use renderer::{JacocoRenderer, XML_REPORT_FILE};
pub use runner::{run_command, CommandOutput, JacocoCli};
