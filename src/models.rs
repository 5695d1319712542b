use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Registration and enrollment state of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Pending,
    Active,
    Suspended,
    Rejected,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Pending => "pending",
            StudentStatus::Active => "active",
            StudentStatus::Suspended => "suspended",
            StudentStatus::Rejected => "rejected",
        }
    }

    /// Whether attendance may be recorded and escalated for this student.
    pub fn is_enrolled(&self) -> bool {
        matches!(self, StudentStatus::Active | StudentStatus::Suspended)
    }
}

impl FromStr for StudentStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(StudentStatus::Pending),
            "active" => Ok(StudentStatus::Active),
            "suspended" => Ok(StudentStatus::Suspended),
            "rejected" => Ok(StudentStatus::Rejected),
            other => Err(EngineError::Validation(format!(
                "unknown student status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub semester: String,
    #[serde(rename = "teacherId")]
    pub teacher_id: Option<Uuid>,
    pub status: StudentStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Holiday,
    Pending,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Holiday => "Holiday",
            AttendanceStatus::Pending => "Pending",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            "Holiday" => Ok(AttendanceStatus::Holiday),
            "Pending" => Ok(AttendanceStatus::Pending),
            other => Err(EngineError::Validation(format!(
                "unknown attendance status '{other}'"
            ))),
        }
    }
}

/// One row of the attendance ledger, keyed by (student, course, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    #[serde(rename = "courseId")]
    pub course_id: Option<Uuid>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
    pub version: i64,
    #[serde(rename = "markedAt")]
    pub marked_at: DateTime<Utc>,
}

/// A mark as submitted by a teacher, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceMark {
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: AttendanceRecord,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolidayType {
    Adhoc,
    Weekend,
    Range,
}

impl HolidayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolidayType::Adhoc => "adhoc",
            HolidayType::Weekend => "weekend",
            HolidayType::Range => "range",
        }
    }
}

impl FromStr for HolidayType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "adhoc" => Ok(HolidayType::Adhoc),
            "weekend" => Ok(HolidayType::Weekend),
            "range" => Ok(HolidayType::Range),
            other => Err(EngineError::Validation(format!(
                "unknown holiday type '{other}'"
            ))),
        }
    }
}

/// A persisted holiday, one row per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    #[serde(rename = "type")]
    pub holiday_type: HolidayType,
}

/// A holiday as seen by the calendar, persisted or derived from the weekend rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHoliday {
    pub id: Option<Uuid>,
    pub date: NaiveDate,
    pub name: String,
    #[serde(rename = "type")]
    pub holiday_type: HolidayType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstituteSetting {
    pub setting_name: String,
    pub setting_value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "1_day_absent_notification")]
    OneDayAbsentNotification,
    #[serde(rename = "3_day_escalation")]
    ThreeDayEscalation,
    #[serde(rename = "7_day_suspension")]
    SevenDaySuspension,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OneDayAbsentNotification => "1_day_absent_notification",
            EventType::ThreeDayEscalation => "3_day_escalation",
            EventType::SevenDaySuspension => "7_day_suspension",
        }
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1_day_absent_notification" => Ok(EventType::OneDayAbsentNotification),
            "3_day_escalation" => Ok(EventType::ThreeDayEscalation),
            "7_day_suspension" => Ok(EventType::SevenDaySuspension),
            other => Err(EngineError::Validation(format!(
                "unknown event type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: Uuid,
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    pub event_type: EventType,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub notified_to: String,
    pub details: serde_json::Value,
    pub streak_start: NaiveDate,
}

impl AttendanceEvent {
    pub fn last_absent_date(&self) -> Option<NaiveDate> {
        self.details
            .get("lastAbsentDate")
            .and_then(|value| value.as_str())
            .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
    }

    pub fn reason_confirmed(&self) -> bool {
        self.details
            .get("reasonConfirmed")
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    /// First and last absent day of the streak this event was raised for.
    pub fn span(&self) -> (NaiveDate, NaiveDate) {
        let last = self
            .last_absent_date()
            .unwrap_or(self.streak_start)
            .max(self.streak_start);
        (self.streak_start, last)
    }

    /// Whether this event already stands for `event_type` on the streak
    /// spanning `start..=last`.
    pub fn covers(&self, event_type: EventType, start: NaiveDate, last: NaiveDate) -> bool {
        self.event_type == event_type && spans_overlap(self.span(), (start, last))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ReportStatus::Pending),
            "approved" => Ok(ReportStatus::Approved),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(EngineError::Validation(format!(
                "unknown report status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationLevel {
    #[serde(rename = "1_day")]
    OneDay,
    #[serde(rename = "3_day_consecutive")]
    ThreeDayConsecutive,
    #[serde(rename = "7_day_consecutive")]
    SevenDayConsecutive,
}

impl EscalationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::OneDay => "1_day",
            EscalationLevel::ThreeDayConsecutive => "3_day_consecutive",
            EscalationLevel::SevenDayConsecutive => "7_day_consecutive",
        }
    }
}

impl FromStr for EscalationLevel {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1_day" => Ok(EscalationLevel::OneDay),
            "3_day_consecutive" => Ok(EscalationLevel::ThreeDayConsecutive),
            "7_day_consecutive" => Ok(EscalationLevel::SevenDayConsecutive),
            other => Err(EngineError::Validation(format!(
                "unknown escalation level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceReport {
    pub id: Uuid,
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    #[serde(rename = "teacherId")]
    pub teacher_id: Option<Uuid>,
    #[serde(rename = "adminId")]
    pub admin_id: Option<Uuid>,
    pub reason: Option<String>,
    pub status: ReportStatus,
    pub report_date: NaiveDate,
    pub escalation_level: EscalationLevel,
    pub streak_start: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl AbsenceReport {
    /// Streak dates an escalation report was opened for. Reports filed by a
    /// student without an escalation have none.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.streak_start
            .map(|start| (start, self.report_date.max(start)))
    }

    pub fn covers(&self, level: EscalationLevel, start: NaiveDate, last: NaiveDate) -> bool {
        self.escalation_level == level
            && self
                .span()
                .is_some_and(|span| spans_overlap(span, (start, last)))
    }
}

fn spans_overlap(a: (NaiveDate, NaiveDate), b: (NaiveDate, NaiveDate)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

/// Audit row for every student status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Uuid,
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    pub from: StudentStatus,
    pub to: StudentStatus,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

/// Consecutive working-day absences ending at a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Streak {
    pub count: u32,
    #[serde(rename = "lastAbsentDate")]
    pub last_absent_date: Option<NaiveDate>,
    #[serde(rename = "streakStart")]
    pub start_date: Option<NaiveDate>,
}

/// Earliest and latest year the engine accepts from callers.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;

pub fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        EngineError::Validation(format!("invalid date '{value}', expected YYYY-MM-DD"))
    })?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
        return Err(EngineError::Validation(format!(
            "date '{value}' is outside the years {MIN_YEAR}..={MAX_YEAR}"
        )));
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_enums() {
        assert_eq!("Absent".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Absent);
        assert_eq!(
            "3_day_escalation".parse::<EventType>().unwrap(),
            EventType::ThreeDayEscalation
        );
        assert!("absent".parse::<AttendanceStatus>().is_err());
        assert!("archived".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn event_type_serializes_with_wire_names() {
        let value = serde_json::to_value(EventType::SevenDaySuspension).unwrap();
        assert_eq!(value, "7_day_suspension");
        let level = serde_json::to_value(EscalationLevel::ThreeDayConsecutive).unwrap();
        assert_eq!(level, "3_day_consecutive");
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("01/03/2024").is_err());
        assert_eq!(
            parse_date("2024-01-03").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
        );
    }

    #[test]
    fn event_covers_overlapping_streaks_only() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let event = AttendanceEvent {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            event_type: EventType::ThreeDayEscalation,
            reason: "absent".to_string(),
            timestamp: Utc::now(),
            notified_to: "student,teacher,admin".to_string(),
            details: serde_json::json!({ "lastAbsentDate": "2024-01-04" }),
            streak_start: day(2),
        };

        assert_eq!(event.span(), (day(2), day(4)));
        assert!(event.covers(EventType::ThreeDayEscalation, day(1), day(5)));
        assert!(event.covers(EventType::ThreeDayEscalation, day(4), day(4)));
        assert!(!event.covers(EventType::ThreeDayEscalation, day(6), day(9)));
        assert!(!event.covers(EventType::SevenDaySuspension, day(1), day(5)));
    }

    #[test]
    fn student_filed_report_covers_nothing() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let report = AbsenceReport {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            teacher_id: None,
            admin_id: None,
            reason: Some("Fever".to_string()),
            status: ReportStatus::Pending,
            report_date: day,
            escalation_level: EscalationLevel::OneDay,
            streak_start: None,
            created_at: Utc::now(),
            reviewed_at: None,
        };
        assert_eq!(report.span(), None);
        assert!(!report.covers(EscalationLevel::OneDay, day, day));
    }

    #[test]
    fn rejects_dates_outside_supported_years() {
        assert!(matches!(
            parse_date("+262142-12-31"),
            Err(EngineError::Validation(_))
        ));
        assert!(parse_date("1899-12-31").is_err());
        assert!(parse_date("10000-01-01").is_err());
        assert!(parse_date("1900-01-01").is_ok());
        assert!(parse_date("9999-12-31").is_ok());
    }
}
