//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by `PRODCOV_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) yields a usable config once the CI base URL is supplied.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

pub const ENV_CI_URL: &str = "PRODCOV_CI_URL";
pub const ENV_CI_USERNAME: &str = "PRODCOV_CI_USERNAME";
pub const ENV_CI_PASSWORD: &str = "PRODCOV_CI_PASSWORD";
pub const ENV_CI_BASIC_AUTH: &str = "PRODCOV_CI_BASIC_AUTH";
pub const ENV_SKIP_COMPONENTS: &str = "PRODCOV_SKIP_COMPONENTS";
pub const ENV_REPORTS_ROOT: &str = "PRODCOV_REPORTS_ROOT";
pub const ENV_WORKSPACE_ROOT: &str = "PRODCOV_WORKSPACE_ROOT";
pub const ENV_REPORT_BASE_URL: &str = "PRODCOV_REPORT_BASE_URL";

/// Substrings that exclude matching components from the overall ratio.
///
/// Matching is containment against the canonical component name, so one
/// entry such as `"legacy"` covers `legacy-auth` and `auth-legacy-v2`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipList(Vec<String>);

impl SkipList {
    /// Build from entries; blank entries are dropped so a trailing comma
    /// never turns into a match-everything pattern.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Parse a comma-separated list.
    pub fn parse(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn matches(&self, component_name: &str) -> bool {
        self.0.iter().any(|entry| component_name.contains(entry.as_str()))
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for SkipList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Csv(String),
            List(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Csv(csv) => SkipList::parse(&csv),
            Repr::List(list) => SkipList::new(list),
        })
    }
}

/// How requests to the CI server authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    UserPassword { username: String, password: String },
    /// Pre-encoded base64 `user:password` token sent as-is.
    Encoded(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Encoded(_) => f.write_str("Encoded(<redacted>)"),
        }
    }
}

/// CI server connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    pub base_url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing)]
    pub basic_auth: Option<String>,
    /// Transport timeout for one artifact download.
    pub timeout_secs: u64,
    pub max_parallel_downloads: usize,
    /// Artifact path (relative to `lastSuccessfulBuild/`) of the execution data archive.
    pub execution_archive: String,
    /// Artifact path of the compiled-class and source archive.
    pub resources_archive: String,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            password: None,
            basic_auth: None,
            timeout_secs: 120,
            max_parallel_downloads: 4,
            execution_archive: "artifact/coverage/jacoco-data.zip".to_string(),
            resources_archive: "artifact/coverage/jacoco-resources.zip".to_string(),
        }
    }
}

impl CiConfig {
    /// A pre-encoded token wins over a username/password pair.
    pub fn credential(&self) -> Option<Credential> {
        if let Some(token) = self.basic_auth.as_ref().filter(|t| !t.is_empty()) {
            return Some(Credential::Encoded(token.clone()));
        }
        self.username.as_ref().map(|username| Credential::UserPassword {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

impl fmt::Debug for CiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiConfig")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential())
            .field("timeout_secs", &self.timeout_secs)
            .field("max_parallel_downloads", &self.max_parallel_downloads)
            .field("execution_archive", &self.execution_archive)
            .field("resources_archive", &self.resources_archive)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable root of the rendered report trees.
    pub reports_root: PathBuf,
    /// Parent of per-request workspaces; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
    /// Public URL prefix under which `reports_root` is served.
    pub report_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_root: PathBuf::from("coverage-reports"),
            workspace_root: None,
            report_base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Package sub-path of the class tree that analysis is rooted at.
    pub package_path: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            package_path: "org".to_string(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub ci: CiConfig,
    pub skip_components: SkipList,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub max_concurrent_requests: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ci: CiConfig::default(),
            skip_components: SkipList::default(),
            storage: StorageConfig::default(),
            analysis: AnalysisConfig::default(),
            max_concurrent_requests: 1,
        }
    }
}

impl ServiceConfig {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoverageError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CoverageError::Config(e.to_string()))
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_CI_URL) {
            self.ci.base_url = v;
        }
        if let Some(v) = lookup(ENV_CI_USERNAME) {
            self.ci.username = Some(v);
        }
        if let Some(v) = lookup(ENV_CI_PASSWORD) {
            self.ci.password = Some(v);
        }
        if let Some(v) = lookup(ENV_CI_BASIC_AUTH) {
            self.ci.basic_auth = Some(v);
        }
        if let Some(v) = lookup(ENV_SKIP_COMPONENTS) {
            self.skip_components = SkipList::parse(&v);
        }
        if let Some(v) = lookup(ENV_REPORTS_ROOT) {
            self.storage.reports_root = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_WORKSPACE_ROOT) {
            self.storage.workspace_root = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_REPORT_BASE_URL) {
            self.storage.report_base_url = Some(v);
        }
    }

    /// Check the settings an aggregation run depends on.
    pub fn validate(&self) -> Result<()> {
        let url = self.ci.base_url.trim();
        if url.is_empty() {
            return Err(CoverageError::Config("ci.base_url is not set".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoverageError::Config(format!(
                "ci.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.ci.max_parallel_downloads == 0 {
            return Err(CoverageError::Config(
                "ci.max_parallel_downloads must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(CoverageError::Config(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Workspace parent directory, falling back to the system temp dir.
    pub fn workspace_root(&self) -> PathBuf {
        self.storage
            .workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
