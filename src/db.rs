use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AbsenceReport, AttendanceEvent, AttendanceMark, AttendanceRecord, Holiday, InstituteSetting,
    ReportStatus, StatusChange, Student, StudentStatus, UpsertOutcome,
};
use crate::settings;
use crate::store::{EscalationPlan, Store};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Default settings, a teacher assignment and three students.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    for (name, value) in settings::default_settings() {
        sqlx::query(
            r#"
            INSERT INTO attendance_escalation.institute_settings (setting_name, setting_value)
            VALUES ($1, $2)
            ON CONFLICT (setting_name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(pool)
        .await?;
    }

    let teacher_id = Uuid::parse_str("7b1c6a52-3f0e-4b8e-9a5d-2c4e8f1a9b30")?;
    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Arif Hossain",
            "arif.hossain@polytechnic.edu",
            "Computer Technology",
            "4th",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Farzana Akter",
            "farzana.akter@polytechnic.edu",
            "Electrical Technology",
            "2nd",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Imran Kabir",
            "imran.kabir@polytechnic.edu",
            "Civil Technology",
            "6th",
        ),
    ];

    for (id, name, email, department, semester) in students {
        sqlx::query(
            r#"
            INSERT INTO attendance_escalation.students
            (id, full_name, email, department, semester, teacher_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, department = EXCLUDED.department,
                semester = EXCLUDED.semester
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(department)
        .bind(semester)
        .bind(teacher_id)
        .execute(pool)
        .await?;
    }

    let holidays = vec![
        ("2026-02-21", "International Mother Language Day"),
        ("2026-03-26", "Independence Day"),
        ("2026-12-16", "Victory Day"),
    ];
    for (date, name) in holidays {
        sqlx::query(
            r#"
            INSERT INTO attendance_escalation.holidays (id, holiday_date, name, holiday_type)
            VALUES ($1, $2, $3, 'adhoc')
            ON CONFLICT (holiday_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(NaiveDate::parse_from_str(date, "%Y-%m-%d")?)
        .bind(name)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn course_key(course_id: Option<Uuid>) -> Uuid {
    course_id.unwrap_or(Uuid::nil())
}

fn student_from_row(row: &PgRow) -> EngineResult<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        semester: row.try_get("semester")?,
        teacher_id: row.try_get("teacher_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn status_change_from_row(row: &PgRow) -> EngineResult<StatusChange> {
    Ok(StatusChange {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        from: row.try_get::<String, _>("from_status")?.parse()?,
        to: row.try_get::<String, _>("to_status")?.parse()?,
        reason: row.try_get("reason")?,
        changed_at: row.try_get("changed_at")?,
    })
}

fn record_from_row(row: &PgRow) -> EngineResult<AttendanceRecord> {
    let course_id: Uuid = row.try_get("course_id")?;
    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_id: (!course_id.is_nil()).then_some(course_id),
        date: row.try_get("attendance_date")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        reason: row.try_get("reason")?,
        version: row.try_get("version")?,
        marked_at: row.try_get("marked_at")?,
    })
}

fn holiday_from_row(row: &PgRow) -> EngineResult<Holiday> {
    Ok(Holiday {
        id: row.try_get("id")?,
        date: row.try_get("holiday_date")?,
        name: row.try_get("name")?,
        holiday_type: row.try_get::<String, _>("holiday_type")?.parse()?,
    })
}

fn setting_from_row(row: &PgRow) -> EngineResult<InstituteSetting> {
    Ok(InstituteSetting {
        setting_name: row.try_get("setting_name")?,
        setting_value: row.try_get("setting_value")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> EngineResult<AttendanceEvent> {
    Ok(AttendanceEvent {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        event_type: row.try_get::<String, _>("event_type")?.parse()?,
        reason: row.try_get("reason")?,
        timestamp: row.try_get("occurred_at")?,
        notified_to: row.try_get("notified_to")?,
        details: row.try_get("details")?,
        streak_start: row.try_get("streak_start")?,
    })
}

fn report_from_row(row: &PgRow) -> EngineResult<AbsenceReport> {
    Ok(AbsenceReport {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        teacher_id: row.try_get("teacher_id")?,
        admin_id: row.try_get("admin_id")?,
        reason: row.try_get("reason")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        report_date: row.try_get("report_date")?,
        escalation_level: row.try_get::<String, _>("escalation_level")?.parse()?,
        streak_start: row.try_get("streak_start")?,
        created_at: row.try_get("created_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

const STUDENT_COLUMNS: &str =
    "id, full_name, email, department, semester, teacher_id, status, created_at";
const RECORD_COLUMNS: &str =
    "id, student_id, course_id, attendance_date, status, reason, version, marked_at";
const EVENT_COLUMNS: &str =
    "id, student_id, event_type, reason, occurred_at, notified_to, details, streak_start";
const REPORT_COLUMNS: &str = "id, student_id, teacher_id, admin_id, reason, status, report_date, \
     escalation_level, streak_start, created_at, reviewed_at";

/// Postgres-backed store. Every multi-row write runs in one transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_status_change<'c, E>(executor: E, change: &StatusChange) -> EngineResult<()>
    where
        E: sqlx::Executor<'c, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO attendance_escalation.status_changes
            (id, student_id, from_status, to_status, reason, changed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(change.id)
        .bind(change.student_id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(&change.reason)
        .bind(change.changed_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_student(&self, student: &Student) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_escalation.students
            (id, full_name, email, department, semester, teacher_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(student.id)
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(&student.department)
        .bind(&student.semester)
        .bind(student.teacher_id)
        .bind(student.status.as_str())
        .bind(student.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Validation(format!(
                "a student with email {} already exists",
                student.email
            )));
        }
        Ok(())
    }

    async fn get_student(&self, id: Uuid) -> EngineResult<Option<Student>> {
        let query =
            format!("SELECT {STUDENT_COLUMNS} FROM attendance_escalation.students WHERE id = $1");
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn find_student_by_email(&self, email: &str) -> EngineResult<Option<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM attendance_escalation.students WHERE lower(email) = lower($1)"
        );
        sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(student_from_row)
            .transpose()
    }

    async fn list_students(&self) -> EngineResult<Vec<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM attendance_escalation.students ORDER BY full_name"
        );
        sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(student_from_row)
            .collect()
    }

    async fn transition_student(&self, change: &StatusChange) -> EngineResult<Option<Student>> {
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "UPDATE attendance_escalation.students SET status = $1 \
             WHERE id = $2 AND status = $3 RETURNING {STUDENT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(change.to.as_str())
            .bind(change.student_id)
            .bind(change.from.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let student = student_from_row(&row)?;
        Self::insert_status_change(&mut *tx, change).await?;
        tx.commit().await?;
        Ok(Some(student))
    }

    async fn status_changes(&self, student_id: Uuid) -> EngineResult<Vec<StatusChange>> {
        sqlx::query(
            r#"
            SELECT id, student_id, from_status, to_status, reason, changed_at
            FROM attendance_escalation.status_changes
            WHERE student_id = $1
            ORDER BY changed_at
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(status_change_from_row)
        .collect()
    }

    async fn upsert_record(&self, mark: &AttendanceMark) -> EngineResult<UpsertOutcome> {
        let query = format!(
            r#"
            INSERT INTO attendance_escalation.attendance_records
            (id, student_id, course_id, attendance_date, status, reason, version, marked_at)
            VALUES ($1, $2, $3, $4, $5, $6, 1, $7)
            ON CONFLICT (student_id, course_id, attendance_date) DO UPDATE
            SET status = EXCLUDED.status,
                reason = EXCLUDED.reason,
                version = attendance_records.version + 1,
                marked_at = EXCLUDED.marked_at
            WHERE (attendance_records.status IS DISTINCT FROM EXCLUDED.status
                   OR attendance_records.reason IS DISTINCT FROM EXCLUDED.reason)
              AND ($8::BIGINT IS NULL OR attendance_records.version = $8)
            RETURNING {RECORD_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(mark.student_id)
            .bind(course_key(mark.course_id))
            .bind(mark.date)
            .bind(mark.status.as_str())
            .bind(&mark.reason)
            .bind(Utc::now())
            .bind(mark.expected_version)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(UpsertOutcome {
                record: record_from_row(&row)?,
                changed: true,
            });
        }

        // Nothing written: either identical to what is stored or a stale version.
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_escalation.attendance_records \
             WHERE student_id = $1 AND course_id = $2 AND attendance_date = $3"
        );
        let row = sqlx::query(&query)
            .bind(mark.student_id)
            .bind(course_key(mark.course_id))
            .bind(mark.date)
            .fetch_one(&self.pool)
            .await?;
        let record = record_from_row(&row)?;

        if let Some(expected) = mark.expected_version {
            if expected != record.version {
                return Err(EngineError::InvalidTransition(format!(
                    "attendance record is at version {}, not {expected}",
                    record.version
                )));
            }
        }
        Ok(UpsertOutcome {
            record,
            changed: false,
        })
    }

    async fn records_between(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<AttendanceRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_escalation.attendance_records \
             WHERE student_id = $1 AND attendance_date BETWEEN $2 AND $3 \
             ORDER BY attendance_date"
        );
        sqlx::query(&query)
            .bind(student_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(record_from_row)
            .collect()
    }

    async fn first_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>> {
        let row = sqlx::query(
            "SELECT min(attendance_date) AS first_date \
             FROM attendance_escalation.attendance_records WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("first_date")?)
    }

    async fn last_record_date(&self, student_id: Uuid) -> EngineResult<Option<NaiveDate>> {
        let row = sqlx::query(
            "SELECT max(attendance_date) AS last_date \
             FROM attendance_escalation.attendance_records WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("last_date")?)
    }

    async fn upsert_holidays(&self, holidays: &[Holiday]) -> EngineResult<Vec<Holiday>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(holidays.len());
        for holiday in holidays {
            let row = sqlx::query(
                r#"
                INSERT INTO attendance_escalation.holidays (id, holiday_date, name, holiday_type)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (holiday_date) DO UPDATE
                SET name = EXCLUDED.name, holiday_type = EXCLUDED.holiday_type
                RETURNING id, holiday_date, name, holiday_type
                "#,
            )
            .bind(holiday.id)
            .bind(holiday.date)
            .bind(&holiday.name)
            .bind(holiday.holiday_type.as_str())
            .fetch_one(&mut *tx)
            .await?;
            stored.push(holiday_from_row(&row)?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Holiday>> {
        sqlx::query(
            "SELECT id, holiday_date, name, holiday_type FROM attendance_escalation.holidays \
             WHERE holiday_date BETWEEN $1 AND $2 ORDER BY holiday_date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(holiday_from_row)
        .collect()
    }

    async fn list_holidays(&self) -> EngineResult<Vec<Holiday>> {
        sqlx::query(
            "SELECT id, holiday_date, name, holiday_type FROM attendance_escalation.holidays \
             ORDER BY holiday_date",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(holiday_from_row)
        .collect()
    }

    async fn delete_holiday(&self, id: Uuid) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM attendance_escalation.holidays WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn setting(&self, name: &str) -> EngineResult<Option<InstituteSetting>> {
        sqlx::query(
            "SELECT setting_name, setting_value, updated_at \
             FROM attendance_escalation.institute_settings WHERE setting_name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(setting_from_row)
        .transpose()
    }

    async fn list_settings(&self) -> EngineResult<Vec<InstituteSetting>> {
        sqlx::query(
            "SELECT setting_name, setting_value, updated_at \
             FROM attendance_escalation.institute_settings ORDER BY setting_name",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(setting_from_row)
        .collect()
    }

    async fn put_setting(&self, name: &str, value: &str) -> EngineResult<InstituteSetting> {
        let row = sqlx::query(
            r#"
            INSERT INTO attendance_escalation.institute_settings (setting_name, setting_value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (setting_name) DO UPDATE
            SET setting_value = EXCLUDED.setting_value, updated_at = now()
            RETURNING setting_name, setting_value, updated_at
            "#,
        )
        .bind(name)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        setting_from_row(&row)
    }

    async fn events_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AttendanceEvent>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM attendance_escalation.attendance_events \
             WHERE student_id = $1 ORDER BY occurred_at"
        );
        sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(event_from_row)
            .collect()
    }

    async fn list_events(&self) -> EngineResult<Vec<AttendanceEvent>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM attendance_escalation.attendance_events \
             ORDER BY occurred_at DESC"
        );
        sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(event_from_row)
            .collect()
    }

    async fn update_event_details(
        &self,
        id: Uuid,
        details: &serde_json::Value,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE attendance_escalation.attendance_events SET details = $1 WHERE id = $2",
        )
        .bind(details)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("attendance event {id}")));
        }
        Ok(())
    }

    async fn reports_for_student(&self, student_id: Uuid) -> EngineResult<Vec<AbsenceReport>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM attendance_escalation.absence_reports \
             WHERE student_id = $1 ORDER BY created_at"
        );
        sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn list_reports(&self) -> EngineResult<Vec<AbsenceReport>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM attendance_escalation.absence_reports \
             ORDER BY created_at DESC"
        );
        sqlx::query(&query)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(report_from_row)
            .collect()
    }

    async fn get_report(&self, id: Uuid) -> EngineResult<Option<AbsenceReport>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM attendance_escalation.absence_reports WHERE id = $1"
        );
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(report_from_row)
            .transpose()
    }

    async fn insert_report(&self, report: &AbsenceReport) -> EngineResult<()> {
        insert_report_query(report).execute(&self.pool).await?;
        Ok(())
    }

    async fn update_report(
        &self,
        report: &AbsenceReport,
        expected: ReportStatus,
    ) -> EngineResult<Option<AbsenceReport>> {
        let query = format!(
            "UPDATE attendance_escalation.absence_reports \
             SET reason = $1, status = $2, admin_id = $3, reviewed_at = $4 \
             WHERE id = $5 AND status = $6 RETURNING {REPORT_COLUMNS}"
        );
        sqlx::query(&query)
            .bind(&report.reason)
            .bind(report.status.as_str())
            .bind(report.admin_id)
            .bind(report.reviewed_at)
            .bind(report.id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(report_from_row)
            .transpose()
    }

    async fn apply_plan(&self, plan: &EscalationPlan) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        // An event or report whose streak dates overlap one already stored
        // belongs to the same run and is dropped.
        for event in &plan.events {
            let (start, last) = event.span();
            sqlx::query(
                r#"
                INSERT INTO attendance_escalation.attendance_events
                (id, student_id, event_type, reason, occurred_at, notified_to, details, streak_start)
                SELECT $1, $2, $3, $4, $5, $6, $7, $8
                WHERE NOT EXISTS (
                    SELECT 1 FROM attendance_escalation.attendance_events existing
                    WHERE existing.student_id = $2
                      AND existing.event_type = $3
                      AND existing.streak_start <= $9
                      AND GREATEST(
                            COALESCE((existing.details->>'lastAbsentDate')::DATE, existing.streak_start),
                            existing.streak_start
                          ) >= $8
                )
                ON CONFLICT (student_id, event_type, streak_start) DO NOTHING
                "#,
            )
            .bind(event.id)
            .bind(event.student_id)
            .bind(event.event_type.as_str())
            .bind(&event.reason)
            .bind(event.timestamp)
            .bind(&event.notified_to)
            .bind(&event.details)
            .bind(start)
            .bind(last)
            .execute(&mut *tx)
            .await?;
        }

        for report in &plan.reports {
            let Some((start, last)) = report.span() else {
                insert_report_query(report).execute(&mut *tx).await?;
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO attendance_escalation.absence_reports
                (id, student_id, teacher_id, admin_id, reason, status, report_date, escalation_level,
                 streak_start, created_at, reviewed_at)
                SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
                WHERE NOT EXISTS (
                    SELECT 1 FROM attendance_escalation.absence_reports existing
                    WHERE existing.student_id = $2
                      AND existing.escalation_level = $8
                      AND existing.streak_start IS NOT NULL
                      AND existing.streak_start <= $12
                      AND GREATEST(existing.report_date, existing.streak_start) >= $9
                )
                ON CONFLICT (student_id, escalation_level, streak_start) WHERE streak_start IS NOT NULL
                DO NOTHING
                "#,
            )
            .bind(report.id)
            .bind(report.student_id)
            .bind(report.teacher_id)
            .bind(report.admin_id)
            .bind(&report.reason)
            .bind(report.status.as_str())
            .bind(report.report_date)
            .bind(report.escalation_level.as_str())
            .bind(start)
            .bind(report.created_at)
            .bind(report.reviewed_at)
            .bind(last)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(change) = &plan.suspension {
            let result = sqlx::query(
                "UPDATE attendance_escalation.students SET status = $1 WHERE id = $2 AND status = $3",
            )
            .bind(change.to.as_str())
            .bind(change.student_id)
            .bind(change.from.as_str())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(EngineError::InvalidTransition(format!(
                    "student {} is no longer {}",
                    change.student_id,
                    StudentStatus::Active
                )));
            }
            Self::insert_status_change(&mut *tx, change).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn insert_report_query(
    report: &AbsenceReport,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO attendance_escalation.absence_reports
        (id, student_id, teacher_id, admin_id, reason, status, report_date, escalation_level,
         streak_start, created_at, reviewed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (student_id, escalation_level, streak_start) WHERE streak_start IS NOT NULL
        DO NOTHING
        "#,
    )
    .bind(report.id)
    .bind(report.student_id)
    .bind(report.teacher_id)
    .bind(report.admin_id)
    .bind(&report.reason)
    .bind(report.status.as_str())
    .bind(report.report_date)
    .bind(report.escalation_level.as_str())
    .bind(report.streak_start)
    .bind(report.created_at)
    .bind(report.reviewed_at)
}
