//! prodcov - product-area coverage aggregation CLI
//!
//! ## Commands
//!
//! - `aggregate`: run a coverage request and print the response
//! - `report`: locate a rendered component report
//! - `source`: per-source-file counters from a rendered XML report
//! - `merge`: merge local JaCoCo execution data files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, Level};

use prodcov_core::{
    BatchOrchestrator, ExecutionRecordMerger, ReportLookup, ServiceConfig, SourceFileQuery,
};
use prodcov_jacoco::{JacocoAnalyzer, JacocoCli, JacocoRenderer};

#[derive(Parser)]
#[command(name = "prodcov")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Product-area coverage aggregation", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "PRODCOV_CONFIG")]
    config: Option<PathBuf>,

    /// Override the reports storage root
    #[arg(long, global = true)]
    reports_root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate coverage for the product areas of a request
    Aggregate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        request: String,

        /// Java executable used to run the JaCoCo CLI
        #[arg(long, env = "PRODCOV_JAVA", default_value = "java")]
        java: String,

        /// Path to jacococli.jar
        #[arg(long, env = "PRODCOV_JACOCO_CLI", default_value = "jacococli.jar")]
        jacoco_cli: PathBuf,

        /// Timeout for one JaCoCo invocation, in seconds
        #[arg(long, default_value = "300")]
        jacoco_timeout: u64,
    },

    /// Look up a rendered component report
    Report {
        /// Product area identifier
        #[arg(short, long)]
        product: String,

        /// Component name
        #[arg(long)]
        component: String,

        /// Report type: html or xml
        #[arg(short, long, default_value = "html")]
        kind: String,
    },

    /// Show per-source-file coverage from a component's XML report
    Source {
        /// Product area identifier
        #[arg(short, long)]
        product: String,

        /// Component name
        #[arg(long)]
        component: String,

        /// Slash-separated package, e.g. org/acme/auth
        #[arg(long)]
        package: String,

        /// Source file names, e.g. TokenService.java
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Merge JaCoCo execution data files into one
    Merge {
        /// Execution data files to merge
        files: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    prodcov_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Aggregate {
            request,
            java,
            jacoco_cli,
            jacoco_timeout,
        } => {
            let config = load_config(cli.config.as_deref(), cli.reports_root)?;
            let jacoco = JacocoCli::new(java, jacoco_cli, jacoco_timeout);
            cmd_aggregate(&config, jacoco, &request).await
        }
        Commands::Report {
            product,
            component,
            kind,
        } => {
            let config = load_config(cli.config.as_deref(), cli.reports_root)?;
            cmd_report(&config, &product, &component, &kind)
        }
        Commands::Source {
            product,
            component,
            package,
            files,
        } => {
            let config = load_config(cli.config.as_deref(), cli.reports_root)?;
            cmd_source(&config, &product, &component, &package, &files)
        }
        Commands::Merge { files, output } => cmd_merge(&files, &output),
    }
}

fn load_config(path: Option<&Path>, reports_root: Option<PathBuf>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load(path).context("Failed to load configuration")?;
    if let Some(root) = reports_root {
        config.storage.reports_root = root;
    }
    Ok(config)
}

async fn read_request(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("Failed to read request from stdin")?;
        Ok(body)
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read request file {source}"))
    }
}

async fn cmd_aggregate(config: &ServiceConfig, jacoco: JacocoCli, request: &str) -> Result<()> {
    let body = read_request(request).await?;
    let orchestrator = BatchOrchestrator::from_config(
        config,
        Arc::new(JacocoAnalyzer::new(jacoco.clone())),
        Arc::new(JacocoRenderer::new(jacoco)),
    )
    .context("Invalid service configuration")?;

    let response = orchestrator.handle_json(&body).await;
    info!(
        product_areas = response.product_areas.len(),
        placeholders = response.placeholder_count(),
        "aggregation complete"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_report(config: &ServiceConfig, product: &str, component: &str, kind: &str) -> Result<()> {
    let result = ReportLookup::from_config(&config.storage).lookup(product, component, kind);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn source_queries(
    product: &str,
    component: &str,
    package: &str,
    files: &[String],
) -> Vec<SourceFileQuery> {
    files
        .iter()
        .map(|file| SourceFileQuery {
            product_id: product.to_string(),
            component_name: component.to_string(),
            package_name: package.to_string(),
            source_file: file.clone(),
        })
        .collect()
}

fn cmd_source(
    config: &ServiceConfig,
    product: &str,
    component: &str,
    package: &str,
    files: &[String],
) -> Result<()> {
    let queries = source_queries(product, component, package, files);
    let reports = ReportLookup::from_config(&config.storage).source_files(&queries);
    if reports.len() < queries.len() {
        info!(
            requested = queries.len(),
            found = reports.len(),
            "some source files have no coverage data"
        );
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn cmd_merge(files: &[PathBuf], output: &Path) -> Result<()> {
    let merged = ExecutionRecordMerger::merge("local", files, output)
        .with_context(|| format!("Failed to merge into {}", output.display()))?;
    println!(
        "Merged {} file(s), {} class(es) into {}",
        merged.record_count,
        merged.session.class_count(),
        output.display()
    );
    Ok(())
}
