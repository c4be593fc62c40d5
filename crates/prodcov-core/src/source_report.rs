//! Per-source-file drill-down into a rendered component report.
//!
//! Counters come from the component's `report.xml`; the compiled class a
//! source file produced is located under its `compiled-files/` tree.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::emitter::COMPILED_FILES_DIR;
use crate::error::{CoverageError, Result};
use crate::lookup::{ReportKind, ReportLookup};
use crate::model::{is_path_segment, Counter};

/// One source file of one component to report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFileQuery {
    pub product_id: String,
    pub component_name: String,
    /// Slash-separated package, e.g. `org/acme/auth`.
    pub package_name: String,
    /// Source file name, e.g. `TokenService.java`.
    #[serde(alias = "className")]
    pub source_file: String,
}

impl SourceFileQuery {
    fn key(&self) -> String {
        format!("{}/{}", self.package_name.trim_matches('/'), self.source_file)
    }

    fn is_safe(&self) -> bool {
        is_path_segment(&self.product_id)
            && is_path_segment(&self.component_name)
            && is_path_segment(&self.source_file)
            && self
                .package_name
                .trim_matches('/')
                .split('/')
                .all(is_path_segment)
    }
}

/// Counters of one `<sourcefile>` element. Types absent from the report stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileCounters {
    pub instruction: Option<Counter>,
    pub branch: Option<Counter>,
    pub line: Option<Counter>,
    pub method: Option<Counter>,
}

impl SourceFileCounters {
    fn record(&mut self, kind: &str, counter: Counter) {
        match kind {
            "INSTRUCTION" => self.instruction = Some(counter),
            "BRANCH" => self.branch = Some(counter),
            "LINE" => self.line = Some(counter),
            "METHOD" => self.method = Some(counter),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFileReport {
    /// `{package}/{source file}`.
    pub source_file: String,
    pub class_file: Option<PathBuf>,
    #[serde(flatten)]
    pub counters: SourceFileCounters,
}

/// Parse a JaCoCo XML report into counters keyed by `{package}/{source file}`.
pub fn parse_source_files(xml: &str) -> Result<BTreeMap<String, SourceFileCounters>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut files = BTreeMap::new();
    let mut package: Option<String> = None;
    let mut current: Option<(String, SourceFileCounters)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"package" => package = attribute(&e, "name")?,
                b"sourcefile" => current = source_file_key(&e, package.as_deref())?
                    .map(|key| (key, SourceFileCounters::default())),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"counter" => {
                    if let Some((_, counters)) = current.as_mut() {
                        if let Some((kind, counter)) = parse_counter(&e)? {
                            counters.record(&kind, counter);
                        }
                    }
                }
                b"sourcefile" => {
                    if let Some(key) = source_file_key(&e, package.as_deref())? {
                        files.insert(key, SourceFileCounters::default());
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"sourcefile" => {
                    if let Some((key, counters)) = current.take() {
                        files.insert(key, counters);
                    }
                }
                b"package" => package = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(files)
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn source_file_key(element: &BytesStart<'_>, package: Option<&str>) -> Result<Option<String>> {
    let (Some(package), Some(name)) = (package, attribute(element, "name")?) else {
        return Ok(None);
    };
    Ok(Some(format!("{package}/{name}")))
}

fn parse_counter(element: &BytesStart<'_>) -> Result<Option<(String, Counter)>> {
    let kind = attribute(element, "type")?;
    let missed = attribute(element, "missed")?.and_then(|v| v.parse().ok());
    let covered = attribute(element, "covered")?.and_then(|v| v.parse().ok());
    Ok(match (kind, missed, covered) {
        (Some(kind), Some(missed), Some(covered)) => Some((kind, Counter::new(missed, covered))),
        _ => None,
    })
}

impl ReportLookup {
    /// Per-source-file counters for each query that names a file present in
    /// its component's XML report.
    ///
    /// Queries that are unsafe, point at a missing or unreadable report, or
    /// name an unknown file produce no entry. Each report is parsed once.
    pub fn source_files(&self, queries: &[SourceFileQuery]) -> Vec<SourceFileReport> {
        let mut parsed: HashMap<(String, String), Option<BTreeMap<String, SourceFileCounters>>> =
            HashMap::new();
        let mut reports = Vec::new();

        for query in queries {
            if !query.is_safe() {
                debug!(source_file = %query.source_file, "ignoring unsafe source file query");
                continue;
            }
            let component_dir = self
                .reports_root()
                .join(&query.product_id)
                .join(&query.component_name);
            let files = parsed
                .entry((query.product_id.clone(), query.component_name.clone()))
                .or_insert_with(|| load_report(&component_dir));

            let key = query.key();
            let Some(counters) = files.as_ref().and_then(|f| f.get(&key)) else {
                continue;
            };
            reports.push(SourceFileReport {
                class_file: class_file(&component_dir, query),
                source_file: key,
                counters: *counters,
            });
        }
        reports
    }
}

fn load_report(component_dir: &Path) -> Option<BTreeMap<String, SourceFileCounters>> {
    let path = component_dir.join(ReportKind::Xml.file_name());
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(&path)
        .map_err(CoverageError::from)
        .and_then(|xml| parse_source_files(&xml))
    {
        Ok(files) => Some(files),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read xml report");
            None
        }
    }
}

fn class_file(component_dir: &Path, query: &SourceFileQuery) -> Option<PathBuf> {
    let stem = Path::new(&query.source_file).file_stem()?;
    let mut path = component_dir.join(COMPILED_FILES_DIR);
    for segment in query.package_name.trim_matches('/').split('/') {
        path.push(segment);
    }
    path.push(stem);
    path.set_extension("class");
    path.is_file().then_some(path)
}
