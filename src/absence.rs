//! Absence report workflow: student reasons and admin/teacher decisions.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{AbsenceReport, EscalationLevel, EventType, ReportStatus};
use crate::store::Store;

/// Attaches a reason to the pending report for `date`, or files an
/// informational 1-day report when none is open.
pub async fn submit_reason(
    store: &dyn Store,
    student_id: Uuid,
    date: NaiveDate,
    reason: &str,
) -> EngineResult<AbsenceReport> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation("reason is required".to_string()));
    }
    let student = store
        .get_student(student_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;

    confirm_notifications(store, student_id, date).await?;

    let mut pending: Vec<AbsenceReport> = store
        .reports_for_student(student_id)
        .await?
        .into_iter()
        .filter(|report| report.status == ReportStatus::Pending && report.report_date == date)
        .collect();
    pending.sort_by(|a, b| b.escalation_level.cmp(&a.escalation_level));

    if let Some(mut report) = pending.into_iter().next() {
        report.reason = Some(reason.to_string());
        let updated = store
            .update_report(&report, ReportStatus::Pending)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidTransition(format!("report {} is no longer pending", report.id))
            })?;
        tracing::info!(
            %student_id,
            report_id = %updated.id,
            level = updated.escalation_level.as_str(),
            "absence reason submitted"
        );
        return Ok(updated);
    }

    let report = AbsenceReport {
        id: Uuid::new_v4(),
        student_id,
        teacher_id: student.teacher_id,
        admin_id: None,
        reason: Some(reason.to_string()),
        status: ReportStatus::Pending,
        report_date: date,
        escalation_level: EscalationLevel::OneDay,
        streak_start: None,
        created_at: Utc::now(),
        reviewed_at: None,
    };
    store.insert_report(&report).await?;
    tracing::info!(
        %student_id,
        report_id = %report.id,
        %date,
        "informational absence report filed"
    );
    Ok(report)
}

async fn confirm_notifications(
    store: &dyn Store,
    student_id: Uuid,
    date: NaiveDate,
) -> EngineResult<()> {
    let events = store.events_for_student(student_id).await?;
    for event in events {
        if event.event_type != EventType::OneDayAbsentNotification
            || event.reason_confirmed()
            || event.last_absent_date() != Some(date)
        {
            continue;
        }
        let mut details = event.details.clone();
        if let Some(map) = details.as_object_mut() {
            map.insert("reasonConfirmed".to_string(), serde_json::Value::Bool(true));
        }
        store.update_event_details(event.id, &details).await?;
    }
    Ok(())
}

/// Moves a pending report to approved or rejected.
pub async fn update_status(
    store: &dyn Store,
    report_id: Uuid,
    status: ReportStatus,
    reviewer_id: Option<Uuid>,
) -> EngineResult<AbsenceReport> {
    if status == ReportStatus::Pending {
        return Err(EngineError::Validation(
            "status must be approved or rejected".to_string(),
        ));
    }

    let mut report = store
        .get_report(report_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("absence report {report_id}")))?;

    if report.status != ReportStatus::Pending {
        return Err(EngineError::InvalidTransition(format!(
            "report {report_id} is already {}",
            report.status.as_str()
        )));
    }

    report.status = status;
    report.admin_id = reviewer_id.or(report.admin_id);
    report.reviewed_at = Some(Utc::now());

    let updated = store
        .update_report(&report, ReportStatus::Pending)
        .await?
        .ok_or_else(|| {
            EngineError::InvalidTransition(format!("report {report_id} was reviewed concurrently"))
        })?;

    tracing::info!(
        report_id = %updated.id,
        status = updated.status.as_str(),
        "absence report reviewed"
    );
    Ok(updated)
}
