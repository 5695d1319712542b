//! Request and response bodies. Field names follow the dashboard client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::escalation::EvaluationOutcome;
use crate::models::AttendanceRecord;

#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    #[serde(rename = "courseId", default)]
    pub course_id: Option<Uuid>,
    pub date: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(rename = "expectedVersion", default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarkAttendanceResponse {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub changed: bool,
    pub escalation: EvaluationOutcome,
}

#[derive(Debug, Deserialize)]
pub struct SubmitReasonRequest {
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    pub date: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReinstateRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StreakParams {
    #[serde(rename = "asOf")]
    pub as_of: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignedStudentsParams {
    #[serde(rename = "teacherId")]
    pub teacher_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddHolidayRequest {
    pub date: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddHolidayRangeRequest {
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub setting_value: serde_json::Value,
}

impl UpdateSettingRequest {
    /// Strings are stored as-is; arrays and numbers as their JSON text.
    pub fn value_text(&self) -> String {
        match &self.setting_value {
            serde_json::Value::String(value) => value.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportStatusRequest {
    pub status: String,
    #[serde(rename = "reviewerId", default)]
    pub reviewer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub semester: String,
    #[serde(rename = "teacherId", default)]
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationDecisionRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
