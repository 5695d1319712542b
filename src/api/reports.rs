//! Absence report review endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use super::dto::UpdateReportStatusRequest;
use super::error::ApiResult;
use super::parse_id;
use super::state::AppState;
use crate::models::{AbsenceReport, ReportStatus};

/// Reports, newest first
pub async fn list_reports(State(state): State<AppState>) -> ApiResult<Json<Vec<AbsenceReport>>> {
    let mut reports = state.engine.store().list_reports().await?;
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(reports))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    body: Result<Json<UpdateReportStatusRequest>, JsonRejection>,
) -> ApiResult<Json<AbsenceReport>> {
    let report_id = parse_id(&report_id, "report")?;
    let Json(req) = body?;
    let status: ReportStatus = req.status.parse()?;

    let report = state
        .engine
        .update_report_status(report_id, status, req.reviewer_id)
        .await?;
    Ok(Json(report))
}
