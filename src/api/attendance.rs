//! Daily attendance endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::Utc;

use super::dto::{
    MarkAttendanceRequest, MarkAttendanceResponse, ReinstateRequest, StreakParams,
    SubmitReasonRequest,
};
use super::error::ApiResult;
use super::state::AppState;
use super::{parse_day, parse_id, parse_year_month};
use crate::engine::EscalationHistory;
use crate::ledger;
use crate::models::{
    AbsenceReport, AttendanceEvent, AttendanceMark, AttendanceRecord, Streak, Student,
};

/// Mark a student's attendance and run escalation for that day
pub async fn mark_attendance(
    State(state): State<AppState>,
    body: Result<Json<MarkAttendanceRequest>, JsonRejection>,
) -> ApiResult<Json<MarkAttendanceResponse>> {
    let Json(req) = body?;
    let mark = AttendanceMark {
        student_id: req.student_id,
        course_id: req.course_id,
        date: parse_day(&req.date)?,
        status: req.status.parse()?,
        reason: req.reason.filter(|reason| !reason.trim().is_empty()),
        expected_version: req.expected_version,
    };

    let outcome = state.engine.mark_attendance(mark).await?;
    Ok(Json(MarkAttendanceResponse {
        record: outcome.record,
        changed: outcome.changed,
        escalation: outcome.evaluation,
    }))
}

pub async fn month_calendar(
    State(state): State<AppState>,
    Path((student_id, year, month)): Path<(String, String, String)>,
) -> ApiResult<Json<BTreeMap<String, AttendanceRecord>>> {
    let student_id = parse_id(&student_id, "student")?;
    let (year, month) = parse_year_month(&year, &month)?;

    let view = ledger::month_calendar(state.engine.store(), student_id, year, month).await?;
    Ok(Json(
        view.into_iter()
            .map(|(date, record)| (date.to_string(), record))
            .collect(),
    ))
}

pub async fn escalation(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<EscalationHistory>> {
    let student_id = parse_id(&student_id, "student")?;
    Ok(Json(state.engine.escalation(student_id).await?))
}

/// Current absence streak, as of today unless `asOf` is given
pub async fn streak(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Query(params): Query<StreakParams>,
) -> ApiResult<Json<Streak>> {
    let student_id = parse_id(&student_id, "student")?;
    let as_of = match params.as_of.as_deref() {
        Some(raw) => parse_day(raw)?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(state.engine.streak(student_id, as_of).await?))
}

pub async fn submit_reason(
    State(state): State<AppState>,
    body: Result<Json<SubmitReasonRequest>, JsonRejection>,
) -> ApiResult<Json<AbsenceReport>> {
    let Json(req) = body?;
    let date = parse_day(&req.date)?;
    let report = state
        .engine
        .submit_reason(req.student_id, date, &req.reason)
        .await?;
    Ok(Json(report))
}

pub async fn reinstate(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    body: Result<Json<ReinstateRequest>, JsonRejection>,
) -> ApiResult<Json<Student>> {
    let student_id = parse_id(&student_id, "student")?;
    let Json(req) = body?;
    Ok(Json(state.engine.reinstate(student_id, &req.reason).await?))
}

/// All events, newest first
pub async fn list_events(State(state): State<AppState>) -> ApiResult<Json<Vec<AttendanceEvent>>> {
    let mut events = state.engine.store().list_events().await?;
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(events))
}
