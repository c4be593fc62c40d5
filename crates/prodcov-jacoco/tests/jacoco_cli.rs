//! Analyzer and renderer against a stand-in `java` executable that mimics
//! the parts of `jacococli report` the adapters rely on.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use prodcov_core::{
    AnalysisJob, Counter, CoverageAnalyzer, CoverageError, ExecutionSession, MergedSession,
    RenderJob, ReportRenderer,
};
use prodcov_jacoco::{JacocoAnalyzer, JacocoCli, JacocoRenderer};

const FAKE_JAVA: &str = r#"#!/bin/sh
# Invoked as: java -jar <jar> report <exec> [options]
while [ $# -gt 0 ]; do
  case "$1" in
    --name) shift; name="$1" ;;
    --csv) shift; csv="$1" ;;
    --html) shift; html="$1" ;;
    --xml) shift; xml="$1" ;;
  esac
  shift
done
if [ "$name" = "broken" ]; then
  echo "Unknown class format" >&2
  exit 1
fi
if [ -n "$csv" ]; then
  echo "GROUP,PACKAGE,CLASS,INSTRUCTION_MISSED,INSTRUCTION_COVERED,BRANCH_MISSED,BRANCH_COVERED,LINE_MISSED,LINE_COVERED,COMPLEXITY_MISSED,COMPLEXITY_COVERED,METHOD_MISSED,METHOD_COVERED" > "$csv"
  echo "$name,org.acme,Main,5,15,1,1,20,80,0,2,1,3" >> "$csv"
fi
if [ -n "$html" ]; then
  mkdir -p "$html"
  echo "<html>$name</html>" > "$html/index.html"
fi
if [ -n "$xml" ]; then
  echo "<report name=\"$name\"/>" > "$xml"
fi
"#;

fn fake_cli(dir: &Path) -> JacocoCli {
    let java = dir.join("java");
    std::fs::write(&java, FAKE_JAVA).unwrap();
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
    JacocoCli::new(java.display().to_string(), dir.join("jacococli.jar"), 30)
}

fn session(dir: &Path) -> MergedSession {
    let path = dir.join("jacoco-merged.exec");
    let session = ExecutionSession::new();
    session.save(&path).unwrap();
    MergedSession {
        session,
        path,
        record_count: 1,
    }
}

#[tokio::test]
async fn test_analyzer_reads_csv_counters() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = JacocoAnalyzer::new(fake_cli(dir.path()));

    let counters = analyzer
        .analyze(
            &session(dir.path()),
            &AnalysisJob {
                component: "svc-a".to_string(),
                class_root: dir.path().join("classes/org"),
            },
        )
        .await
        .unwrap();

    assert_eq!(counters.line, Counter::new(20, 80));
    assert_eq!(counters.instruction, Counter::new(5, 15));
    assert_eq!(counters.method, Counter::new(1, 3));
}

#[tokio::test]
async fn test_analyzer_failure_maps_to_analysis_error() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = JacocoAnalyzer::new(fake_cli(dir.path()));

    let err = analyzer
        .analyze(
            &session(dir.path()),
            &AnalysisJob {
                component: "broken".to_string(),
                class_root: PathBuf::from("/nowhere"),
            },
        )
        .await
        .unwrap_err();

    match err {
        CoverageError::Analysis { component, detail } => {
            assert_eq!(component, "broken");
            assert!(detail.contains("Unknown class format"));
        }
        other => panic!("expected analysis error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_renderer_writes_html_and_xml() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = JacocoRenderer::new(fake_cli(dir.path()));
    let output_dir = dir.path().join("reports/P1/svc-a");
    std::fs::create_dir_all(&output_dir).unwrap();

    renderer
        .render(
            &session(dir.path()),
            &RenderJob {
                component: "svc-a".to_string(),
                classes_dir: dir.path().join("classes"),
                sources_dir: None,
                output_dir: output_dir.clone(),
            },
        )
        .await
        .unwrap();

    assert!(output_dir.join("index.html").is_file());
    assert!(output_dir.join("report.xml").is_file());
}

#[tokio::test]
async fn test_missing_java_maps_to_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = JacocoRenderer::new(JacocoCli::new(
        dir.path().join("no-java").display().to_string(),
        "jacococli.jar",
        5,
    ));

    let err = renderer
        .render(
            &session(dir.path()),
            &RenderJob {
                component: "svc-a".to_string(),
                classes_dir: dir.path().join("classes"),
                sources_dir: None,
                output_dir: dir.path().join("out"),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoverageError::Render { .. }));
}
