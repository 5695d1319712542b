//! HTTP surface over the escalation engine.

pub mod dto;
pub mod error;
pub mod state;

mod attendance;
mod health;
mod holidays;
mod reports;
mod settings;
mod students;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::parse_date;
use error::ApiResult;
use state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Daily attendance
        .route("/api/daily-attendance/mark", post(attendance::mark_attendance))
        .route(
            "/api/daily-attendance/calendar/:student_id/:year/:month",
            get(attendance::month_calendar),
        )
        .route("/api/daily-attendance/escalation/:student_id", get(attendance::escalation))
        .route("/api/daily-attendance/streak/:student_id", get(attendance::streak))
        .route("/api/daily-attendance/reason", post(attendance::submit_reason))
        .route("/api/daily-attendance/reinstate/:student_id", put(attendance::reinstate))
        .route("/api/daily-attendance/events", get(attendance::list_events))
        .route("/api/daily-attendance/teacher/students", get(students::assigned_students))
        .route(
            "/api/daily-attendance/holidays/month/:year/:month",
            get(holidays::month_holidays),
        )
        // Holidays
        .route("/api/holidays", get(holidays::list_holidays).post(holidays::add_holiday))
        .route("/api/holidays/range", post(holidays::add_holiday_range))
        .route("/api/holidays/month/:year/:month", get(holidays::month_holidays))
        .route("/api/holidays/:holiday_id", delete(holidays::delete_holiday))
        // Institute settings
        .route("/api/institute-settings", get(settings::list_settings))
        .route(
            "/api/institute-settings/:name",
            get(settings::get_setting).put(settings::update_setting),
        )
        // Absence reports
        .route("/api/absence-reports", get(reports::list_reports))
        .route("/api/absence-reports/", get(reports::list_reports))
        .route("/api/absence-reports/:report_id/status", put(reports::update_status))
        // Students
        .route("/api/students", post(students::register_student))
        .route("/api/students/:student_id", get(students::get_student))
        .route(
            "/api/students/:student_id/registration",
            put(students::decide_registration),
        )
        .with_state(state)
}

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| EngineError::Validation(format!("invalid {what} id '{raw}'")).into())
}

fn parse_day(raw: &str) -> ApiResult<NaiveDate> {
    Ok(parse_date(raw)?)
}

fn parse_year_month(year: &str, month: &str) -> ApiResult<(i32, u32)> {
    let year: i32 = year
        .parse()
        .map_err(|_| EngineError::Validation(format!("invalid year '{year}'")))?;
    let month: u32 = month
        .parse()
        .map_err(|_| EngineError::Validation(format!("invalid month '{month}'")))?;
    Ok((year, month))
}
