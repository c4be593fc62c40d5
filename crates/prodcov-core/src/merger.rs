//! Execution-record merging for one product area.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CoverageError, Result};
use crate::exec::ExecutionSession;

/// The union of a product area's execution records, also persisted to disk
/// for collaborators that consume a file.
#[derive(Debug, Clone)]
pub struct MergedSession {
    pub session: ExecutionSession,
    pub path: PathBuf,
    /// Number of execution record files that went into the union.
    pub record_count: usize,
}

pub struct ExecutionRecordMerger;

impl ExecutionRecordMerger {
    /// Load every record into one session and save it to `output`.
    ///
    /// An empty `records` list is [`CoverageError::NoExecutionData`]: a
    /// product area without execution data cannot be scored, which is not
    /// the same as zero coverage.
    pub fn merge(product_id: &str, records: &[PathBuf], output: &Path) -> Result<MergedSession> {
        if records.is_empty() {
            return Err(CoverageError::NoExecutionData {
                product_id: product_id.to_string(),
            });
        }

        let mut session = ExecutionSession::new();
        for record in records {
            debug!(path = %record.display(), "loading execution data");
            session.load_file(record)?;
        }
        session.save(output)?;

        info!(
            product_id = %product_id,
            records = records.len(),
            classes = session.class_count(),
            "merged execution data"
        );
        Ok(MergedSession {
            session,
            path: output.to_path_buf(),
            record_count: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ClassExecution, SessionInfo};

    fn write_record(dir: &Path, name: &str, id: &str, probes: Vec<bool>) -> PathBuf {
        let mut session = ExecutionSession::new();
        session.add_session(SessionInfo::new(id, 10, 20));
        session
            .add_class(ClassExecution::new(0x1234, "org/acme/Service", probes))
            .unwrap();
        let path = dir.join(name);
        session.save(&path).unwrap();
        path
    }

    #[test]
    fn test_empty_input_is_no_execution_data() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExecutionRecordMerger::merge("P1", &[], &dir.path().join("m.exec")).unwrap_err();
        assert!(matches!(err, CoverageError::NoExecutionData { ref product_id } if product_id == "P1"));
        assert!(!dir.path().join("m.exec").exists());
    }

    #[test]
    fn test_merge_writes_union() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_record(dir.path(), "a.exec", "a", vec![true, false]);
        let b = write_record(dir.path(), "b.exec", "b", vec![false, true]);
        let out = dir.path().join("merged.exec");

        let merged = ExecutionRecordMerger::merge("P1", &[a, b], &out).unwrap();
        assert_eq!(merged.record_count, 2);
        assert_eq!(merged.session.class(0x1234).unwrap().hit_count(), 2);

        let reread = std::fs::File::open(&out).unwrap();
        assert_eq!(ExecutionSession::read_from(reread).unwrap(), merged.session);
    }

    #[test]
    fn test_corrupt_record_fails_merge() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.exec");
        std::fs::write(&bad, b"PK\x03\x04 not exec data").unwrap();

        let err = ExecutionRecordMerger::merge("P1", &[bad], &dir.path().join("m.exec")).unwrap_err();
        assert!(matches!(err, CoverageError::ExecData(_)));
    }
}
