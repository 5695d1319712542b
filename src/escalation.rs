//! Escalation decisions for a student's absence streak.
//!
//! Planning is pure: given the streak, the thresholds and what has already
//! been emitted for the student, [`plan_escalation`] returns only what is
//! missing. The engine applies the plan atomically under the student's lock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::{
    AbsenceReport, AttendanceEvent, EscalationLevel, EventType, ReportStatus, Streak, Student,
    StudentStatus,
};
use crate::settings::Thresholds;
use crate::store::{new_status_change, EscalationPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EscalationState {
    Normal,
    Absent1,
    Absent3,
    Suspended,
}

pub fn state_for(
    status: StudentStatus,
    streak: &Streak,
    thresholds: &Thresholds,
) -> EscalationState {
    if status == StudentStatus::Suspended {
        return EscalationState::Suspended;
    }
    match streak.count {
        n if n >= thresholds.three_day => EscalationState::Absent3,
        n if n >= thresholds.one_day => EscalationState::Absent1,
        _ => EscalationState::Normal,
    }
}

/// Result of evaluating one student.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    #[serde(rename = "studentId")]
    pub student_id: Uuid,
    #[serde(rename = "asOf")]
    pub as_of: NaiveDate,
    pub streak: Streak,
    pub state: EscalationState,
    pub events: Vec<AttendanceEvent>,
    pub reports: Vec<AbsenceReport>,
    pub suspended: bool,
}

fn notified_to(event_type: EventType) -> &'static str {
    match event_type {
        EventType::OneDayAbsentNotification => "student",
        EventType::ThreeDayEscalation | EventType::SevenDaySuspension => "student,teacher,admin",
    }
}

fn new_event(
    student: &Student,
    event_type: EventType,
    streak_start: NaiveDate,
    last_absent: NaiveDate,
    count: u32,
    now: DateTime<Utc>,
) -> AttendanceEvent {
    let reason = match event_type {
        EventType::OneDayAbsentNotification => {
            format!("Absent on {last_absent}, reason confirmation requested")
        }
        EventType::ThreeDayEscalation => {
            format!("{count} consecutive working days absent since {streak_start}")
        }
        EventType::SevenDaySuspension => {
            format!("Suspended after {count} consecutive working days absent since {streak_start}")
        }
    };

    AttendanceEvent {
        id: Uuid::new_v4(),
        student_id: student.id,
        event_type,
        reason,
        timestamp: now,
        notified_to: notified_to(event_type).to_string(),
        details: json!({
            "lastAbsentDate": last_absent.to_string(),
            "streakStart": streak_start.to_string(),
            "consecutiveDays": count,
            "reasonConfirmed": false,
        }),
        streak_start,
    }
}

fn new_report(
    student: &Student,
    level: EscalationLevel,
    streak_start: NaiveDate,
    report_date: NaiveDate,
    now: DateTime<Utc>,
) -> AbsenceReport {
    AbsenceReport {
        id: Uuid::new_v4(),
        student_id: student.id,
        teacher_id: student.teacher_id,
        admin_id: None,
        reason: None,
        status: ReportStatus::Pending,
        report_date,
        escalation_level: level,
        streak_start: Some(streak_start),
        created_at: now,
        reviewed_at: None,
    }
}

/// Decides which events, reports and status change the streak calls for
/// that have not been recorded yet.
pub fn plan_escalation(
    student: &Student,
    streak: &Streak,
    thresholds: &Thresholds,
    existing_events: &[AttendanceEvent],
    existing_reports: &[AbsenceReport],
    now: DateTime<Utc>,
) -> EscalationPlan {
    let mut plan = EscalationPlan::default();
    let (Some(start), Some(last_absent)) = (streak.start_date, streak.last_absent_date) else {
        return plan;
    };

    // A streak that grew backwards (a late mark for an earlier day) keeps
    // whatever was raised for the part of it already seen.
    let has_event = |event_type: EventType| {
        existing_events
            .iter()
            .any(|event| event.covers(event_type, start, last_absent))
    };
    let has_report = |level: EscalationLevel| {
        existing_reports
            .iter()
            .any(|report| report.covers(level, start, last_absent))
    };

    let tiers = [
        (thresholds.one_day, EventType::OneDayAbsentNotification, None),
        (
            thresholds.three_day,
            EventType::ThreeDayEscalation,
            Some(EscalationLevel::ThreeDayConsecutive),
        ),
        (
            thresholds.seven_day,
            EventType::SevenDaySuspension,
            Some(EscalationLevel::SevenDayConsecutive),
        ),
    ];

    for (threshold, event_type, level) in tiers {
        if streak.count < threshold {
            continue;
        }
        let emitting = !has_event(event_type);
        if emitting {
            plan.events.push(new_event(
                student,
                event_type,
                start,
                last_absent,
                streak.count,
                now,
            ));
        }
        if let Some(level) = level {
            if !has_report(level) {
                plan.reports.push(new_report(student, level, start, last_absent, now));
            }
        }
        if event_type == EventType::SevenDaySuspension
            && emitting
            && student.status == StudentStatus::Active
        {
            plan.suspension = Some(new_status_change(
                student.id,
                StudentStatus::Active,
                StudentStatus::Suspended,
                format!("{} consecutive working days absent since {start}", streak.count),
            ));
        }
    }

    plan
}
