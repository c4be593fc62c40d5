//! Parsing of `jacococli report --csv` output.
//!
//! One row per class:
//!
//! ```text
//! GROUP,PACKAGE,CLASS,INSTRUCTION_MISSED,INSTRUCTION_COVERED,BRANCH_MISSED,BRANCH_COVERED,
//! LINE_MISSED,LINE_COVERED,COMPLEXITY_MISSED,COMPLEXITY_COVERED,METHOD_MISSED,METHOD_COVERED
//! ```

use prodcov_core::{Counter, CoverageCounters};

use crate::error::{JacocoError, Result};

const COLUMNS: [&str; 8] = [
    "INSTRUCTION_MISSED",
    "INSTRUCTION_COVERED",
    "BRANCH_MISSED",
    "BRANCH_COVERED",
    "LINE_MISSED",
    "LINE_COVERED",
    "METHOD_MISSED",
    "METHOD_COVERED",
];

/// Sum every class row into one set of counters.
pub fn parse_counters(csv: &str) -> Result<CoverageCounters> {
    let mut lines = csv.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(JacocoError::Csv {
            line: 1,
            detail: "missing header".to_string(),
        });
    };
    let names: Vec<&str> = header.split(',').map(str::trim).collect();
    let mut index = [0usize; COLUMNS.len()];
    for (slot, column) in index.iter_mut().zip(COLUMNS) {
        *slot = names
            .iter()
            .position(|n| *n == column)
            .ok_or_else(|| JacocoError::Csv {
                line: 1,
                detail: format!("missing column {column}"),
            })?;
    }

    let mut totals = [0u64; COLUMNS.len()];
    for (idx, row) in lines {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        if fields.len() != names.len() {
            return Err(JacocoError::Csv {
                line: idx + 1,
                detail: format!("expected {} fields, found {}", names.len(), fields.len()),
            });
        }
        for (total, column) in totals.iter_mut().zip(index) {
            let value: u64 = fields[column].parse().map_err(|_| JacocoError::Csv {
                line: idx + 1,
                detail: format!("'{}' is not a count", fields[column]),
            })?;
            *total += value;
        }
    }

    Ok(CoverageCounters {
        instruction: Counter::new(totals[0], totals[1]),
        branch: Counter::new(totals[2], totals[3]),
        line: Counter::new(totals[4], totals[5]),
        method: Counter::new(totals[6], totals[7]),
    })
}
