//! Student registration endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use super::dto::{AssignedStudentsParams, RegisterStudentRequest, RegistrationDecisionRequest};
use super::error::ApiResult;
use super::parse_id;
use super::state::AppState;
use crate::engine::NewStudent;
use crate::error::EngineError;
use crate::models::{Student, StudentStatus};

/// Register a student; the registration starts out pending
pub async fn register_student(
    State(state): State<AppState>,
    body: Result<Json<RegisterStudentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Student>)> {
    let Json(req) = body?;
    let student = state
        .engine
        .register_student(NewStudent {
            full_name: req.full_name,
            email: req.email,
            department: req.department,
            semester: req.semester,
            teacher_id: req.teacher_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<Json<Student>> {
    let student_id = parse_id(&student_id, "student")?;
    Ok(Json(state.engine.student(student_id).await?))
}

pub async fn decide_registration(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    body: Result<Json<RegistrationDecisionRequest>, JsonRejection>,
) -> ApiResult<Json<Student>> {
    let student_id = parse_id(&student_id, "student")?;
    let Json(req) = body?;
    let decision: StudentStatus = req.status.parse()?;
    Ok(Json(state.engine.decide_registration(student_id, decision).await?))
}

/// Enrolled students assigned to a teacher, by name
pub async fn assigned_students(
    State(state): State<AppState>,
    Query(params): Query<AssignedStudentsParams>,
) -> ApiResult<Json<Vec<Student>>> {
    let raw = params
        .teacher_id
        .ok_or_else(|| EngineError::Validation("teacherId is required".to_string()))?;
    let teacher_id = parse_id(&raw, "teacher")?;
    Ok(Json(state.engine.assigned_students(teacher_id).await?))
}
