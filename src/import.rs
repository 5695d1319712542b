use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::Engine;
use crate::models::{parse_date, AttendanceMark, AttendanceStatus};

#[derive(Debug, Deserialize)]
struct CsvRow {
    email: String,
    course_id: Option<Uuid>,
    date: String,
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub marked: usize,
    pub unchanged: usize,
    pub events_emitted: usize,
}

/// Replays attendance marks from a CSV file through the engine, in file
/// order, so escalation fires exactly as it would for live marks.
pub async fn import_csv(engine: &Engine, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;

        let student = engine
            .store()
            .find_student_by_email(&row.email)
            .await?
            .with_context(|| format!("unknown student {} at line {line}", row.email))?;
        let date = parse_date(&row.date).with_context(|| format!("line {line}"))?;
        let status: AttendanceStatus = row.status.parse().with_context(|| format!("line {line}"))?;

        let outcome = engine
            .mark_attendance(AttendanceMark {
                student_id: student.id,
                course_id: row.course_id,
                date,
                status,
                reason: row.reason.filter(|reason| !reason.trim().is_empty()),
                expected_version: None,
            })
            .await
            .with_context(|| format!("failed to mark line {line}"))?;

        if outcome.changed {
            summary.marked += 1;
        } else {
            summary.unchanged += 1;
        }
        summary.events_emitted += outcome.evaluation.events.len();
    }

    Ok(summary)
}
