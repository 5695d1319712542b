//! Storage abstraction for the escalation engine.
//!
//! [`PgStore`](crate::db::PgStore) backs production; [`MemoryStore`] backs
//! tests and `serve --memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AbsenceReport, AttendanceEvent, AttendanceMark, AttendanceRecord, Holiday, InstituteSetting,
    ReportStatus, StatusChange, Student, StudentStatus, UpsertOutcome,
};
use crate::settings;

/// Everything one evaluation decided to write. Applied atomically.
#[derive(Debug, Clone, Default)]
pub struct EscalationPlan {
    pub events: Vec<AttendanceEvent>,
    pub reports: Vec<AbsenceReport>,
    pub suspension: Option<StatusChange>,
}

impl EscalationPlan {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.reports.is_empty() && self.suspension.is_none()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // students
    async fn insert_student(&self, student: &Student) -> EngineResult<()>;
    async fn get_student(&self, id: Uuid) -> EngineResult<Option<Student>>;
    async fn find_student_by_email(&self, email: &str) -> EngineResult<Option<Student>>;
    async fn list_students(&self) -> EngineResult<Vec<Student>>;
    /// Compare-and-set on the status; records the change. `None` when the
    /// student was not in `change.from`.
    async fn transition_student(&self, change: &StatusChange) -> EngineResult<Option<Student>>;
    async fn status_changes(&self, student_id: Uuid) -> EngineResult<Vec<StatusChange>>;

    // ledger
    async fn upsert_record(&self, mark: &AttendanceMark) -> EngineResult<UpsertOutcome>;
    async fn records_between(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<AttendanceRecord>>;
    async fn first_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>>;
    async fn last_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>>;

    // holidays
    async fn upsert_holidays(&self, holidays: &[Holiday]) -> EngineResult<Vec<Holiday>>;
    async fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Holiday>>;
    async fn list_holidays(&self) -> EngineResult<Vec<Holiday>>;
    async fn delete_holiday(&self, id: Uuid) -> EngineResult<bool>;

    // settings
    async fn setting(&self, name: &str) -> EngineResult<Option<InstituteSetting>>;
    async fn list_settings(&self) -> EngineResult<Vec<InstituteSetting>>;
    async fn put_setting(&self, name: &str, value: &str) -> EngineResult<InstituteSetting>;

    async fn get_setting(&self, name: &str) -> EngineResult<Option<String>> {
        Ok(self.setting(name).await?.map(|setting| setting.setting_value))
    }

    // escalation
    async fn events_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AttendanceEvent>>;
    async fn list_events(&self) -> EngineResult<Vec<AttendanceEvent>>;
    async fn update_event_details(&self, id: Uuid, details: &serde_json::Value) -> EngineResult<()>;
    async fn reports_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AbsenceReport>>;
    async fn list_reports(&self) -> EngineResult<Vec<AbsenceReport>>;
    async fn get_report(&self, id: Uuid) -> EngineResult<Option<AbsenceReport>>;
    async fn insert_report(&self, report: &AbsenceReport) -> EngineResult<()>;
    /// Writes `report` only if the stored status still equals `expected`.
    async fn update_report(
        &self,
        report: &AbsenceReport,
        expected: ReportStatus,
    ) -> EngineResult<Option<AbsenceReport>>;
    /// Applies every part of the plan or none of it. Duplicate events and
    /// reports for the same streak are dropped.
    async fn apply_plan(&self, plan: &EscalationPlan) -> EngineResult<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    students: HashMap<Uuid, Student>,
    status_changes: Vec<StatusChange>,
    records: HashMap<(Uuid, Option<Uuid>, NaiveDate), AttendanceRecord>,
    holidays: HashMap<NaiveDate, Holiday>,
    settings: HashMap<String, InstituteSetting>,
    events: Vec<AttendanceEvent>,
    reports: Vec<AbsenceReport>,
}

impl MemoryState {
    fn has_event(&self, candidate: &AttendanceEvent) -> bool {
        let (start, last) = candidate.span();
        self.events.iter().any(|event| {
            event.student_id == candidate.student_id
                && event.covers(candidate.event_type, start, last)
        })
    }

    fn has_report(&self, candidate: &AbsenceReport) -> bool {
        let Some((start, last)) = candidate.span() else {
            return false;
        };
        self.reports.iter().any(|report| {
            report.student_id == candidate.student_id
                && report.covers(candidate.escalation_level, start, last)
        })
    }
}

/// Thread-safe in-memory store guarded by a single `RwLock`.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store holding the default institute settings.
    pub fn new() -> Self {
        let now = Utc::now();
        let settings = settings::default_settings()
            .into_iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    InstituteSetting {
                        setting_name: name.to_string(),
                        setting_value: value,
                        updated_at: now,
                    },
                )
            })
            .collect();

        Self {
            state: RwLock::new(MemoryState {
                settings,
                ..MemoryState::default()
            }),
        }
    }

    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_student(&self, student: &Student) -> EngineResult<()> {
        let mut state = self.state.write().await;
        if state
            .students
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&student.email))
        {
            return Err(EngineError::Validation(format!(
                "a student with email {} already exists",
                student.email
            )));
        }
        state.students.insert(student.id, student.clone());
        Ok(())
    }

    async fn get_student(&self, id: Uuid) -> EngineResult<Option<Student>> {
        Ok(self.state.read().await.students.get(&id).cloned())
    }

    async fn find_student_by_email(&self, email: &str) -> EngineResult<Option<Student>> {
        let state = self.state.read().await;
        Ok(state
            .students
            .values()
            .find(|student| student.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_students(&self) -> EngineResult<Vec<Student>> {
        let state = self.state.read().await;
        let mut students: Vec<Student> = state.students.values().cloned().collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    async fn transition_student(&self, change: &StatusChange) -> EngineResult<Option<Student>> {
        let mut state = self.state.write().await;
        let Some(student) = state.students.get_mut(&change.student_id) else {
            return Ok(None);
        };
        if student.status != change.from {
            return Ok(None);
        }
        student.status = change.to;
        let updated = student.clone();
        state.status_changes.push(change.clone());
        Ok(Some(updated))
    }

    async fn status_changes(&self, student_id: Uuid) -> EngineResult<Vec<StatusChange>> {
        let state = self.state.read().await;
        Ok(state
            .status_changes
            .iter()
            .filter(|change| change.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn upsert_record(&self, mark: &AttendanceMark) -> EngineResult<UpsertOutcome> {
        let mut state = self.state.write().await;
        let key = (mark.student_id, mark.course_id, mark.date);

        if let Some(existing) = state.records.get_mut(&key) {
            if let Some(expected) = mark.expected_version {
                if expected != existing.version {
                    return Err(EngineError::InvalidTransition(format!(
                        "attendance record is at version {}, not {expected}",
                        existing.version
                    )));
                }
            }
            if existing.status == mark.status && existing.reason == mark.reason {
                return Ok(UpsertOutcome {
                    record: existing.clone(),
                    changed: false,
                });
            }
            existing.status = mark.status;
            existing.reason = mark.reason.clone();
            existing.version += 1;
            existing.marked_at = Utc::now();
            return Ok(UpsertOutcome {
                record: existing.clone(),
                changed: true,
            });
        }

        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: mark.student_id,
            course_id: mark.course_id,
            date: mark.date,
            status: mark.status,
            reason: mark.reason.clone(),
            version: 1,
            marked_at: Utc::now(),
        };
        state.records.insert(key, record.clone());
        Ok(UpsertOutcome {
            record,
            changed: true,
        })
    }

    async fn records_between(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<AttendanceRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<AttendanceRecord> = state
            .records
            .values()
            .filter(|record| {
                record.student_id == student_id && record.date >= from && record.date <= to
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.date);
        Ok(records)
    }

    async fn first_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|record| record.student_id == student_id)
            .map(|record| record.date)
            .min())
    }

    async fn last_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|record| record.student_id == student_id)
            .map(|record| record.date)
            .max())
    }

    async fn upsert_holidays(&self, holidays: &[Holiday]) -> EngineResult<Vec<Holiday>> {
        let mut state = self.state.write().await;
        let mut stored = Vec::with_capacity(holidays.len());
        for holiday in holidays {
            let entry = state
                .holidays
                .entry(holiday.date)
                .and_modify(|existing| {
                    existing.name = holiday.name.clone();
                    existing.holiday_type = holiday.holiday_type;
                })
                .or_insert_with(|| holiday.clone());
            stored.push(entry.clone());
        }
        Ok(stored)
    }

    async fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Holiday>> {
        let state = self.state.read().await;
        let mut holidays: Vec<Holiday> = state
            .holidays
            .values()
            .filter(|holiday| holiday.date >= from && holiday.date <= to)
            .cloned()
            .collect();
        holidays.sort_by_key(|holiday| holiday.date);
        Ok(holidays)
    }

    async fn list_holidays(&self) -> EngineResult<Vec<Holiday>> {
        let state = self.state.read().await;
        let mut holidays: Vec<Holiday> = state.holidays.values().cloned().collect();
        holidays.sort_by_key(|holiday| holiday.date);
        Ok(holidays)
    }

    async fn delete_holiday(&self, id: Uuid) -> EngineResult<bool> {
        let mut state = self.state.write().await;
        let before = state.holidays.len();
        state.holidays.retain(|_, holiday| holiday.id != id);
        Ok(state.holidays.len() != before)
    }

    async fn setting(&self, name: &str) -> EngineResult<Option<InstituteSetting>> {
        Ok(self.state.read().await.settings.get(name).cloned())
    }

    async fn list_settings(&self) -> EngineResult<Vec<InstituteSetting>> {
        let state = self.state.read().await;
        let mut settings: Vec<InstituteSetting> = state.settings.values().cloned().collect();
        settings.sort_by(|a, b| a.setting_name.cmp(&b.setting_name));
        Ok(settings)
    }

    async fn put_setting(&self, name: &str, value: &str) -> EngineResult<InstituteSetting> {
        let setting = InstituteSetting {
            setting_name: name.to_string(),
            setting_value: value.to_string(),
            updated_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .settings
            .insert(name.to_string(), setting.clone());
        Ok(setting)
    }

    async fn events_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AttendanceEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| event.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_events(&self) -> EngineResult<Vec<AttendanceEvent>> {
        let state = self.state.read().await;
        let mut events = state.events.clone();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn update_event_details(
        &self,
        id: Uuid,
        details: &serde_json::Value,
    ) -> EngineResult<()> {
        let mut state = self.state.write().await;
        match state.events.iter_mut().find(|event| event.id == id) {
            Some(event) => {
                event.details = details.clone();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("attendance event {id}"))),
        }
    }

    async fn reports_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AbsenceReport>> {
        let state = self.state.read().await;
        Ok(state
            .reports
            .iter()
            .filter(|report| report.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn list_reports(&self) -> EngineResult<Vec<AbsenceReport>> {
        let state = self.state.read().await;
        let mut reports = state.reports.clone();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn get_report(&self, id: Uuid) -> EngineResult<Option<AbsenceReport>> {
        let state = self.state.read().await;
        Ok(state.reports.iter().find(|report| report.id == id).cloned())
    }

    async fn insert_report(&self, report: &AbsenceReport) -> EngineResult<()> {
        self.state.write().await.reports.push(report.clone());
        Ok(())
    }

    async fn update_report(
        &self,
        report: &AbsenceReport,
        expected: ReportStatus,
    ) -> EngineResult<Option<AbsenceReport>> {
        let mut state = self.state.write().await;
        match state.reports.iter_mut().find(|stored| stored.id == report.id) {
            Some(stored) if stored.status == expected => {
                *stored = report.clone();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn apply_plan(&self, plan: &EscalationPlan) -> EngineResult<()> {
        let mut state = self.state.write().await;

        if let Some(change) = &plan.suspension {
            let current = state
                .students
                .get(&change.student_id)
                .map(|student| student.status);
            if current != Some(change.from) {
                return Err(EngineError::InvalidTransition(format!(
                    "student {} is no longer {}",
                    change.student_id, change.from
                )));
            }
        }

        for event in &plan.events {
            if !state.has_event(event) {
                state.events.push(event.clone());
            }
        }
        for report in &plan.reports {
            if !state.has_report(report) {
                state.reports.push(report.clone());
            }
        }
        if let Some(change) = &plan.suspension {
            if let Some(student) = state.students.get_mut(&change.student_id) {
                student.status = change.to;
            }
            state.status_changes.push(change.clone());
        }

        Ok(())
    }
}

pub fn new_status_change(
    student_id: Uuid,
    from: StudentStatus,
    to: StudentStatus,
    reason: impl Into<String>,
) -> StatusChange {
    StatusChange {
        id: Uuid::new_v4(),
        student_id,
        from,
        to,
        reason: reason.into(),
        changed_at: Utc::now(),
    }
}
