//! Artifact acquisition from the CI server.
//!
//! For every component the fetcher downloads two archives of the job's last
//! successful build (execution data, and compiled classes plus sources) into
//! the component's private workspace subtree and unpacks them there.
//! Failures never leave this module as errors: a component that cannot be
//! fetched comes back as [`ComponentOutcome::Skipped`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::archive::{extract_zip, find_files_with_extension};
use crate::config::{CiConfig, Credential};
use crate::error::{CoverageError, Result};
use crate::metrics::{Metric, METRICS};
use crate::model::{ComponentOutcome, ComponentRef, SkipReason};
use crate::obs;
use crate::workspace::{Workspace, CLASSES_DIR, SOURCES_DIR};

pub const LAST_SUCCESSFUL_BUILD: &str = "lastSuccessfulBuild";

/// Where build artifacts come from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Download `artifact_path` of the last successful build of `job_path`
    /// into `dest`, returning the number of bytes written.
    async fn download(&self, job_path: &str, artifact_path: &str, dest: &Path) -> Result<u64>;
}

/// [`ArtifactSource`] backed by the CI server's HTTP API.
pub struct CiArtifactClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl CiArtifactClient {
    pub fn new(config: &CiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("prodcov/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: config.credential(),
        })
    }

    /// `{base_url}/{job_path}/lastSuccessfulBuild/{artifact_path}`
    pub fn artifact_url(&self, job_path: &str, artifact_path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            job_path.trim_matches('/'),
            LAST_SUCCESSFUL_BUILD,
            artifact_path.trim_start_matches('/')
        )
    }
}

fn download_error(url: &str, err: reqwest::Error) -> CoverageError {
    CoverageError::Download {
        url: url.to_string(),
        detail: err.to_string(),
    }
}

#[async_trait]
impl ArtifactSource for CiArtifactClient {
    async fn download(&self, job_path: &str, artifact_path: &str, dest: &Path) -> Result<u64> {
        let url = self.artifact_url(job_path, artifact_path);
        let request = match &self.credential {
            Some(Credential::UserPassword { username, password }) => {
                self.http.get(&url).basic_auth(username, Some(password))
            }
            Some(Credential::Encoded(token)) => {
                self.http.get(&url).header(AUTHORIZATION, format!("Basic {token}"))
            }
            None => self.http.get(&url),
        };

        let mut response = request.send().await.map_err(|e| download_error(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoverageError::Download {
                url,
                detail: format!("status {status}"),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| download_error(&url, e))? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(url = %url, bytes = written, "artifact downloaded");
        Ok(written)
    }
}

/// A component whose archives were downloaded and unpacked.
#[derive(Debug, Clone)]
pub struct FetchedComponent {
    pub reference: ComponentRef,
    /// `*.exec` files found in the execution archive, sorted.
    pub execution_files: Vec<PathBuf>,
    pub classes_dir: PathBuf,
    pub sources_dir: Option<PathBuf>,
    pub execution_sha256: String,
    pub resources_sha256: String,
}

impl FetchedComponent {
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

#[derive(Debug, Clone)]
struct ArchivePaths {
    execution: String,
    resources: String,
}

/// Workspace locations of one component, resolved before its task spawns.
#[derive(Debug, Clone)]
struct ComponentPaths {
    root: PathBuf,
    execution_archive: PathBuf,
    resources_archive: PathBuf,
    execution_dir: PathBuf,
    resources_dir: PathBuf,
}

impl ComponentPaths {
    fn new(workspace: &Workspace, name: &str) -> Self {
        Self {
            root: workspace.component_dir(name),
            execution_archive: workspace.execution_archive(name),
            resources_archive: workspace.resources_archive(name),
            execution_dir: workspace.execution_dir(name),
            resources_dir: workspace.resources_dir(name),
        }
    }
}

/// Fans component downloads out over a bounded number of tasks.
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
    archives: ArchivePaths,
    max_parallel: usize,
}

impl ArtifactFetcher {
    pub fn new(source: Arc<dyn ArtifactSource>, config: &CiConfig) -> Self {
        Self {
            source,
            archives: ArchivePaths {
                execution: config.execution_archive.clone(),
                resources: config.resources_archive.clone(),
            },
            max_parallel: config.max_parallel_downloads.max(1),
        }
    }

    /// Fetch every referenced component into `workspace`.
    ///
    /// Returns one outcome per reference, in request order.
    pub async fn fetch_all(
        &self,
        references: &[String],
        workspace: &Workspace,
    ) -> Vec<ComponentOutcome<FetchedComponent>> {
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut slots: Vec<Option<ComponentOutcome<FetchedComponent>>> =
            Vec::with_capacity(references.len());
        let mut seen = HashSet::new();
        let mut join_set = JoinSet::new();

        for (idx, raw) in references.iter().enumerate() {
            let Some(reference) = ComponentRef::parse(raw) else {
                slots.push(Some(obs::skip("fetch", raw, SkipReason::InvalidReference)));
                continue;
            };
            if !seen.insert(reference.name.clone()) {
                slots.push(Some(obs::skip("fetch", &reference.name, SkipReason::Duplicate)));
                continue;
            }
            slots.push(None);

            let source = Arc::clone(&self.source);
            let archives = self.archives.clone();
            let paths = ComponentPaths::new(workspace, &reference.name);
            let permits = Arc::clone(&permits);
            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = fetch_component(source.as_ref(), &archives, reference, paths).await;
                (idx, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "artifact fetch task aborted"),
            }
        }

        slots
            .into_iter()
            .zip(references)
            .map(|(slot, raw)| {
                slot.unwrap_or_else(|| {
                    obs::skip(
                        "fetch",
                        raw,
                        SkipReason::Unavailable("fetch task aborted".to_string()),
                    )
                })
            })
            .collect()
    }
}

async fn fetch_component(
    source: &dyn ArtifactSource,
    archives: &ArchivePaths,
    reference: ComponentRef,
    paths: ComponentPaths,
) -> ComponentOutcome<FetchedComponent> {
    let name = reference.name.clone();
    match try_fetch(source, archives, reference, paths).await {
        Ok(Some(fetched)) => ComponentOutcome::Ready(fetched),
        Ok(None) => obs::skip("fetch", &name, SkipReason::NoExecutionData),
        Err(e) => obs::skip("fetch", &name, SkipReason::Unavailable(e.to_string())),
    }
}

async fn try_fetch(
    source: &dyn ArtifactSource,
    archives: &ArchivePaths,
    reference: ComponentRef,
    paths: ComponentPaths,
) -> Result<Option<FetchedComponent>> {
    tokio::fs::create_dir_all(&paths.root).await?;

    for (artifact, dest) in [
        (&archives.execution, &paths.execution_archive),
        (&archives.resources, &paths.resources_archive),
    ] {
        if let Err(e) = source.download(&reference.job_path, artifact, dest).await {
            METRICS.inc(Metric::DownloadsFailed);
            warn!(component = %reference.name, artifact = %artifact, error = %e, "artifact download failed");
            if tokio::fs::try_exists(dest).await.unwrap_or(false) {
                if let Err(rm) = tokio::fs::remove_file(dest).await {
                    warn!(path = %dest.display(), error = %rm, "could not remove partial download");
                }
            }
            return Err(e);
        }
        METRICS.inc(Metric::DownloadsSucceeded);
    }

    let unpacked = tokio::task::spawn_blocking(move || unpack(&paths))
        .await
        .map_err(|e| CoverageError::Archive(format!("unpack task failed: {e}")))??;

    if unpacked.execution_files.is_empty() {
        return Ok(None);
    }
    Ok(Some(FetchedComponent {
        reference,
        execution_files: unpacked.execution_files,
        classes_dir: unpacked.classes_dir,
        sources_dir: unpacked.sources_dir,
        execution_sha256: unpacked.execution_sha256,
        resources_sha256: unpacked.resources_sha256,
    }))
}

struct Unpacked {
    execution_files: Vec<PathBuf>,
    classes_dir: PathBuf,
    sources_dir: Option<PathBuf>,
    execution_sha256: String,
    resources_sha256: String,
}

fn unpack(paths: &ComponentPaths) -> Result<Unpacked> {
    let execution_sha256 = file_sha256(&paths.execution_archive)?;
    let resources_sha256 = file_sha256(&paths.resources_archive)?;

    extract_zip(&paths.execution_archive, &paths.execution_dir)?;
    extract_zip(&paths.resources_archive, &paths.resources_dir)?;

    let sources_dir = paths.resources_dir.join(SOURCES_DIR);
    Ok(Unpacked {
        execution_files: find_files_with_extension(&paths.execution_dir, "exec")?,
        classes_dir: paths.resources_dir.join(CLASSES_DIR),
        sources_dir: sources_dir.is_dir().then_some(sources_dir),
        execution_sha256,
        resources_sha256,
    })
}

fn file_sha256(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceManager;
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Serves canned archives keyed by `{job_path}/{artifact_path}`.
    #[derive(Default)]
    struct FakeSource {
        artifacts: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_component(mut self, job: &str, exec: &[(&str, &[u8])], resources: &[(&str, &[u8])]) -> Self {
            let ci = CiConfig::default();
            self.artifacts
                .insert(format!("{job}/{}", ci.execution_archive), zip_bytes(exec));
            self.artifacts
                .insert(format!("{job}/{}", ci.resources_archive), zip_bytes(resources));
            self
        }
    }

    #[async_trait]
    impl ArtifactSource for FakeSource {
        async fn download(&self, job_path: &str, artifact_path: &str, dest: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = format!("{job_path}/{artifact_path}");
            match self.artifacts.get(&key) {
                Some(bytes) => {
                    std::fs::write(dest, bytes)?;
                    Ok(bytes.len() as u64)
                }
                None => {
                    // Leave a partial file behind like an interrupted stream would.
                    std::fs::write(dest, b"partial")?;
                    Err(CoverageError::Download {
                        url: key,
                        detail: "status 404 Not Found".to_string(),
                    })
                }
            }
        }
    }

    fn fetcher(source: FakeSource) -> ArtifactFetcher {
        ArtifactFetcher::new(Arc::new(source), &CiConfig::default())
    }

    #[tokio::test]
    async fn test_fetch_unpacks_into_component_subtree() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).acquire().unwrap();
        let source = FakeSource::default().with_component(
            "org/svc-a",
            &[("jacoco.exec", b"exec")],
            &[("classes/org/A.class", b"c"), ("sources/org/A.java", b"s")],
        );

        let outcomes = fetcher(source)
            .fetch_all(&["org/svc-a".to_string()], &ws)
            .await;
        let fetched = outcomes[0].ready().unwrap();
        assert_eq!(fetched.name(), "svc-a");
        assert_eq!(fetched.execution_files, vec![ws.execution_dir("svc-a").join("jacoco.exec")]);
        assert!(fetched.classes_dir.join("org/A.class").is_file());
        assert!(fetched.sources_dir.is_some());
        assert_eq!(fetched.execution_sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_failed_download_is_isolated_and_cleaned() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).acquire().unwrap();
        let source = FakeSource::default().with_component(
            "org/svc-a",
            &[("jacoco.exec", b"exec")],
            &[("classes/org/A.class", b"c")],
        );

        let outcomes = fetcher(source)
            .fetch_all(&["org/svc-a".to_string(), "org/svc-b".to_string()], &ws)
            .await;
        assert!(outcomes[0].is_ready());
        assert!(matches!(
            &outcomes[1],
            ComponentOutcome::Skipped { component, reason: SkipReason::Unavailable(_) } if component == "svc-b"
        ));
        assert!(!ws.execution_archive("svc-b").exists());
    }

    #[tokio::test]
    async fn test_missing_exec_file_skips_component() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).acquire().unwrap();
        let source = FakeSource::default().with_component(
            "svc-a",
            &[("README.txt", b"nothing here")],
            &[("classes/org/A.class", b"c")],
        );

        let outcomes = fetcher(source).fetch_all(&["svc-a".to_string()], &ws).await;
        assert!(matches!(
            &outcomes[0],
            ComponentOutcome::Skipped { reason: SkipReason::NoExecutionData, .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_references() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).acquire().unwrap();
        let source = FakeSource::default().with_component(
            "a/svc",
            &[("jacoco.exec", b"exec")],
            &[("classes/org/A.class", b"c")],
        );
        let source = Arc::new(source);
        let fetcher = ArtifactFetcher::new(source.clone(), &CiConfig::default());

        let refs = ["/".to_string(), "a/svc".to_string(), "b/svc".to_string()];
        let outcomes = fetcher.fetch_all(&refs, &ws).await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            &outcomes[0],
            ComponentOutcome::Skipped { reason: SkipReason::InvalidReference, .. }
        ));
        assert!(outcomes[1].is_ready());
        assert!(matches!(
            &outcomes[2],
            ComponentOutcome::Skipped { reason: SkipReason::Duplicate, .. }
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_artifact_url() {
        let client = CiArtifactClient::new(&CiConfig {
            base_url: "https://ci.example.com/job/".to_string(),
            ..CiConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.artifact_url("/org/svc-a/", "artifact/coverage/jacoco-data.zip"),
            "https://ci.example.com/job/org/svc-a/lastSuccessfulBuild/artifact/coverage/jacoco-data.zip"
        );
    }
}
