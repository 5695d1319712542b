use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AbsenceReport, AttendanceEvent, EventType, ReportStatus, Student, StudentStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeSummary {
    pub event_type: EventType,
    pub count: usize,
    pub students: usize,
}

pub fn summarize_by_type(events: &[AttendanceEvent]) -> Vec<EventTypeSummary> {
    let mut map: HashMap<EventType, (usize, Vec<Uuid>)> = HashMap::new();

    for event in events {
        let entry = map.entry(event.event_type).or_insert((0, Vec::new()));
        entry.0 += 1;
        if !entry.1.contains(&event.student_id) {
            entry.1.push(event.student_id);
        }
    }

    let mut summaries: Vec<EventTypeSummary> = map
        .into_iter()
        .map(|(event_type, (count, students))| EventTypeSummary {
            event_type,
            count,
            students: students.len(),
        })
        .collect();

    summaries.sort_by(|a, b| a.event_type.cmp(&b.event_type));
    summaries
}

/// Markdown digest of escalations since `cutoff`.
pub fn build_report(
    cutoff: NaiveDate,
    students: &[Student],
    events: &[AttendanceEvent],
    reports: &[AbsenceReport],
) -> String {
    let names: HashMap<Uuid, &str> = students
        .iter()
        .map(|student| (student.id, student.full_name.as_str()))
        .collect();
    let name_of = |id: &Uuid| names.get(id).copied().unwrap_or("unknown student");

    let recent: Vec<AttendanceEvent> = events
        .iter()
        .filter(|event| event.timestamp.date_naive() >= cutoff)
        .cloned()
        .collect();
    let summaries = summarize_by_type(&recent);

    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Escalation Report");
    let _ = writeln!(output, "Events since {cutoff}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Event Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No attendance events recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} events across {} students",
                summary.event_type.as_str(),
                summary.count,
                summary.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suspended Students");

    let suspended: Vec<&Student> = students
        .iter()
        .filter(|student| student.status == StudentStatus::Suspended)
        .collect();
    if suspended.is_empty() {
        let _ = writeln!(output, "No students are suspended.");
    } else {
        for student in suspended {
            let _ = writeln!(
                output,
                "- {} ({}, {} semester {})",
                student.full_name, student.email, student.department, student.semester
            );
        }
    }

    let mut open: Vec<&AbsenceReport> = reports
        .iter()
        .filter(|report| report.status == ReportStatus::Pending)
        .collect();
    open.sort_by(|a, b| {
        b.escalation_level
            .cmp(&a.escalation_level)
            .then(a.report_date.cmp(&b.report_date))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Absence Reports");

    if open.is_empty() {
        let _ = writeln!(output, "No absence reports awaiting review.");
    } else {
        for report in open {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                name_of(&report.student_id),
                report.escalation_level.as_str(),
                report.report_date,
                report.reason.as_deref().unwrap_or("no reason submitted")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::EscalationLevel;

    fn sample_student(name: &str, status: StudentStatus) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase().replace(' ', ".")),
            department: "Computer Technology".to_string(),
            semester: "4th".to_string(),
            teacher_id: None,
            status,
            created_at: Utc::now(),
        }
    }

    fn sample_event(student_id: Uuid, event_type: EventType) -> AttendanceEvent {
        AttendanceEvent {
            id: Uuid::new_v4(),
            student_id,
            event_type,
            reason: "absent".to_string(),
            timestamp: Utc::now(),
            notified_to: "student".to_string(),
            details: serde_json::json!({}),
            streak_start: Utc::now().date_naive(),
        }
    }

    #[test]
    fn counts_events_and_distinct_students() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = vec![
            sample_event(a, EventType::OneDayAbsentNotification),
            sample_event(a, EventType::OneDayAbsentNotification),
            sample_event(b, EventType::OneDayAbsentNotification),
            sample_event(b, EventType::ThreeDayEscalation),
        ];
        let summaries = summarize_by_type(&events);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].event_type, EventType::OneDayAbsentNotification);
        assert_eq!(summaries[0].count, 3);
        assert_eq!(summaries[0].students, 2);
    }

    #[test]
    fn report_lists_suspensions_and_open_reports() {
        let suspended = sample_student("Rahim Uddin", StudentStatus::Suspended);
        let active = sample_student("Karim Mia", StudentStatus::Active);
        let events = vec![sample_event(suspended.id, EventType::SevenDaySuspension)];
        let reports = vec![AbsenceReport {
            id: Uuid::new_v4(),
            student_id: active.id,
            teacher_id: None,
            admin_id: None,
            reason: None,
            status: ReportStatus::Pending,
            report_date: Utc::now().date_naive(),
            escalation_level: EscalationLevel::ThreeDayConsecutive,
            streak_start: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }];

        let cutoff = Utc::now().date_naive() - chrono::Duration::days(30);
        let output = build_report(cutoff, &[suspended, active], &events, &reports);
        assert!(output.contains("- 7_day_suspension: 1 events across 1 students"));
        assert!(output.contains("Rahim Uddin"));
        assert!(output.contains("Karim Mia (3_day_consecutive)"));
        assert!(output.contains("no reason submitted"));
    }

    #[test]
    fn empty_report_says_so() {
        let output = build_report(Utc::now().date_naive(), &[], &[], &[]);
        assert!(output.contains("No attendance events recorded"));
        assert!(output.contains("No students are suspended."));
        assert!(output.contains("No absence reports awaiting review."));
    }
}
