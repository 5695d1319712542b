//! Holiday calendar endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use super::dto::{AddHolidayRangeRequest, AddHolidayRequest, MessageResponse};
use super::error::ApiResult;
use super::state::AppState;
use super::{parse_day, parse_id, parse_year_month};
use crate::calendar;
use crate::models::{Holiday, ResolvedHoliday};

pub async fn list_holidays(State(state): State<AppState>) -> ApiResult<Json<Vec<Holiday>>> {
    Ok(Json(state.engine.store().list_holidays().await?))
}

/// Persisted holidays plus the weekend days of the month
pub async fn month_holidays(
    State(state): State<AppState>,
    Path((year, month)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ResolvedHoliday>>> {
    let (year, month) = parse_year_month(&year, &month)?;
    Ok(Json(calendar::resolve_month(state.engine.store(), year, month).await?))
}

pub async fn add_holiday(
    State(state): State<AppState>,
    body: Result<Json<AddHolidayRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Holiday>)> {
    let Json(req) = body?;
    let date = parse_day(&req.date)?;
    let holiday = calendar::add_holiday(state.engine.store(), date, &req.name).await?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

pub async fn add_holiday_range(
    State(state): State<AppState>,
    body: Result<Json<AddHolidayRangeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<Holiday>>)> {
    let Json(req) = body?;
    let start = parse_day(&req.start_date)?;
    let end = parse_day(&req.end_date)?;
    let holidays = calendar::add_holiday_range(state.engine.store(), start, end, &req.name).await?;
    Ok((StatusCode::CREATED, Json(holidays)))
}

pub async fn delete_holiday(
    State(state): State<AppState>,
    Path(holiday_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let holiday_id = parse_id(&holiday_id, "holiday")?;
    calendar::remove_holiday(state.engine.store(), holiday_id).await?;
    Ok(Json(MessageResponse {
        message: "Holiday deleted".to_string(),
    }))
}
