//! The engine ties the ledger, calendar, settings, escalation planning and
//! the absence workflow together behind per-student serialization.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as DateDuration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::absence;
use crate::error::{EngineError, EngineResult};
use crate::escalation::{self, EscalationState, EvaluationOutcome};
use crate::ledger;
use crate::models::{
    AbsenceReport, AttendanceEvent, AttendanceMark, AttendanceRecord, ReportStatus, Streak, Student,
    StudentStatus,
};
use crate::locks::StudentLocks;
use crate::settings::{EscalationPolicy, MissingMarkPolicy};
use crate::store::{new_status_change, Store};

/// Everything the escalation endpoint reports for one student.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationHistory {
    pub events: Vec<AttendanceEvent>,
    pub reports: Vec<AbsenceReport>,
    pub state: EscalationState,
    pub streak: Streak,
}

#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub record: AttendanceRecord,
    pub changed: bool,
    pub evaluation: EvaluationOutcome,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub semester: String,
    pub teacher_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    locks: Arc<StudentLocks>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(StudentLocks::new(lock_timeout)),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Records a mark and re-evaluates the student's escalation as of the mark date.
    ///
    /// The mark is committed before evaluation. If applying the escalation
    /// fails the error is returned with the mark already stored; resending
    /// the mark (or the next sweep) re-evaluates and adds only what is missing.
    pub async fn mark_attendance(&self, mark: AttendanceMark) -> EngineResult<MarkOutcome> {
        let _guard = self.locks.acquire(mark.student_id).await?;

        let outcome = ledger::record_mark(self.store(), &mark).await?;
        let evaluation = self.evaluate_locked(mark.student_id, mark.date).await?;

        Ok(MarkOutcome {
            record: outcome.record,
            changed: outcome.changed,
            evaluation,
        })
    }

    /// Re-evaluates a student. Safe to repeat: nothing already recorded for
    /// the current streak is emitted twice.
    pub async fn evaluate(
        &self,
        student_id: Uuid,
        as_of: NaiveDate,
    ) -> EngineResult<EvaluationOutcome> {
        let _guard = self.locks.acquire(student_id).await?;
        self.evaluate_locked(student_id, as_of).await
    }

    async fn evaluate_locked(
        &self,
        student_id: Uuid,
        as_of: NaiveDate,
    ) -> EngineResult<EvaluationOutcome> {
        let store = self.store();
        let student = store
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;

        let policy = EscalationPolicy::load(store).await?;
        let streak = ledger::absence_run(store, &policy, student_id, as_of).await?;

        if !student.status.is_enrolled() {
            return Ok(EvaluationOutcome {
                student_id,
                as_of,
                streak,
                state: EscalationState::Normal,
                events: Vec::new(),
                reports: Vec::new(),
                suspended: false,
            });
        }

        let existing_events = store.events_for_student(student_id).await?;
        let existing_reports = store.reports_for_student(student_id).await?;
        let plan = escalation::plan_escalation(
            &student,
            &streak,
            &policy.thresholds,
            &existing_events,
            &existing_reports,
            Utc::now(),
        );

        let suspended = plan.suspension.is_some();
        if !plan.is_empty() {
            store.apply_plan(&plan).await?;
            for event in &plan.events {
                tracing::info!(
                    %student_id,
                    event_type = event.event_type.as_str(),
                    streak = streak.count,
                    notified_to = %event.notified_to,
                    "attendance event emitted"
                );
            }
            if suspended {
                tracing::warn!(%student_id, streak = streak.count, "student suspended for absence");
            }
        }

        let status = if suspended {
            StudentStatus::Suspended
        } else {
            student.status
        };

        Ok(EvaluationOutcome {
            student_id,
            as_of,
            streak,
            state: escalation::state_for(status, &streak, &policy.thresholds),
            events: plan.events,
            reports: plan.reports,
            suspended,
        })
    }

    pub async fn streak(&self, student_id: Uuid, as_of: NaiveDate) -> EngineResult<Streak> {
        let store = self.store();
        if store.get_student(student_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("student {student_id}")));
        }
        let policy = EscalationPolicy::load(store).await?;
        ledger::consecutive_absence_streak(store, &policy, student_id, as_of).await
    }

    pub async fn escalation(&self, student_id: Uuid) -> EngineResult<EscalationHistory> {
        let store = self.store();
        let student = store
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;

        let policy = EscalationPolicy::load(store).await?;
        let as_of = self.status_date(student_id, &policy).await?;
        let streak = ledger::consecutive_absence_streak(store, &policy, student_id, as_of).await?;

        let mut events = store.events_for_student(student_id).await?;
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let mut reports = store.reports_for_student(student_id).await?;
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(EscalationHistory {
            events,
            reports,
            state: escalation::state_for(student.status, &streak, &policy.thresholds),
            streak,
        })
    }

    /// The day a student's current standing is read as of: the latest
    /// marked day up to today. When unmarked days count as absences,
    /// yesterday is closed and is used if it is later.
    async fn status_date(
        &self,
        student_id: Uuid,
        policy: &EscalationPolicy,
    ) -> EngineResult<NaiveDate> {
        let today = Utc::now().date_naive();
        let lookback = today - DateDuration::days(ledger::MAX_LOOKBACK_DAYS);
        let marked = self
            .store
            .records_between(student_id, lookback, today)
            .await?
            .into_iter()
            .map(|record| record.date)
            .max();

        let closed = (policy.missing_marks == MissingMarkPolicy::Absent)
            .then(|| today - DateDuration::days(1));
        Ok(marked.max(closed).unwrap_or(today))
    }

    /// Restores a suspended student. Prior events and reports are kept.
    pub async fn reinstate(&self, student_id: Uuid, reason: &str) -> EngineResult<Student> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::Validation("reinstatement reason is required".to_string()));
        }
        let _guard = self.locks.acquire(student_id).await?;
        let store = self.store();

        let student = store
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;
        if student.status != StudentStatus::Suspended {
            return Err(EngineError::InvalidTransition(format!(
                "student {student_id} is {}, only suspended students can be reinstated",
                student.status
            )));
        }

        let change = new_status_change(
            student_id,
            StudentStatus::Suspended,
            StudentStatus::Active,
            reason,
        );
        let updated = store.transition_student(&change).await?.ok_or_else(|| {
            EngineError::InvalidTransition(format!(
                "student {student_id} changed status concurrently"
            ))
        })?;
        tracing::info!(%student_id, reason, "student reinstated");
        Ok(updated)
    }

    pub async fn submit_reason(
        &self,
        student_id: Uuid,
        date: NaiveDate,
        reason: &str,
    ) -> EngineResult<AbsenceReport> {
        let _guard = self.locks.acquire(student_id).await?;
        absence::submit_reason(self.store(), student_id, date, reason).await
    }

    pub async fn update_report_status(
        &self,
        report_id: Uuid,
        status: ReportStatus,
        reviewer_id: Option<Uuid>,
    ) -> EngineResult<AbsenceReport> {
        absence::update_status(self.store(), report_id, status, reviewer_id).await
    }

    pub async fn register_student(&self, new: NewStudent) -> EngineResult<Student> {
        let full_name = new.full_name.trim();
        let email = new.email.trim();
        if full_name.is_empty() || !email.contains('@') {
            return Err(EngineError::Validation(
                "a full name and a valid email are required".to_string(),
            ));
        }

        let student = Student {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            email: email.to_ascii_lowercase(),
            department: new.department.trim().to_string(),
            semester: new.semester.trim().to_string(),
            teacher_id: new.teacher_id,
            status: StudentStatus::Pending,
            created_at: Utc::now(),
        };
        self.store.insert_student(&student).await?;
        tracing::info!(student_id = %student.id, email = %student.email, "student registered");
        Ok(student)
    }

    /// Approves (`active`) or rejects a pending registration.
    pub async fn decide_registration(
        &self,
        student_id: Uuid,
        decision: StudentStatus,
    ) -> EngineResult<Student> {
        if !matches!(decision, StudentStatus::Active | StudentStatus::Rejected) {
            return Err(EngineError::Validation(
                "registration decision must be active or rejected".to_string(),
            ));
        }
        let _guard = self.locks.acquire(student_id).await?;
        let store = self.store();

        let student = store
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;
        if student.status != StudentStatus::Pending {
            return Err(EngineError::InvalidTransition(format!(
                "student {student_id} is {}, registration already decided",
                student.status
            )));
        }

        let change = new_status_change(
            student_id,
            StudentStatus::Pending,
            decision,
            "registration review",
        );
        let updated = store.transition_student(&change).await?.ok_or_else(|| {
            EngineError::InvalidTransition(format!(
                "student {student_id} changed status concurrently"
            ))
        })?;
        tracing::info!(%student_id, status = %updated.status, "registration decided");
        Ok(updated)
    }

    /// Enrolled students assigned to a teacher, by name.
    pub async fn assigned_students(&self, teacher_id: Uuid) -> EngineResult<Vec<Student>> {
        let mut students: Vec<Student> = self
            .store
            .list_students()
            .await?
            .into_iter()
            .filter(|student| {
                student.teacher_id == Some(teacher_id) && student.status.is_enrolled()
            })
            .collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    pub async fn student(&self, student_id: Uuid) -> EngineResult<Student> {
        self.store
            .get_student(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))
    }
}
