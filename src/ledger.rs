//! The attendance ledger: daily marks and consecutive-absence streaks.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::calendar::{self, HolidayCalendar};
use crate::error::{EngineError, EngineResult};
use crate::models::{AttendanceMark, AttendanceRecord, AttendanceStatus, Streak, UpsertOutcome};
use crate::settings::{EscalationPolicy, MissingMarkPolicy};
use crate::store::Store;

/// Streaks never look further back than this.
pub const MAX_LOOKBACK_DAYS: i64 = 366;

/// What a single day amounts to once every course mark is folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayMark {
    Present,
    Absent,
    Excused,
    Unmarked,
}

/// Any Present wins, then any Absent, then Holiday. Pending counts as unmarked.
pub fn summarize_day<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> DayMark {
    let mut summary = DayMark::Unmarked;
    for record in records {
        summary = match (summary, record.status) {
            (_, AttendanceStatus::Present) => return DayMark::Present,
            (_, AttendanceStatus::Absent) => DayMark::Absent,
            (DayMark::Unmarked, AttendanceStatus::Holiday) => DayMark::Excused,
            (current, _) => current,
        };
    }
    summary
}

enum Step {
    Count,
    Pass,
    Stop,
}

fn step(
    calendar: &HolidayCalendar,
    day: NaiveDate,
    mark: DayMark,
    missing_marks: MissingMarkPolicy,
) -> Step {
    if !calendar.is_working_day(day) {
        return Step::Pass;
    }
    match mark {
        DayMark::Present => Step::Stop,
        DayMark::Excused => Step::Pass,
        DayMark::Absent => Step::Count,
        DayMark::Unmarked => match missing_marks {
            MissingMarkPolicy::Absent => Step::Count,
            MissingMarkPolicy::Skip => Step::Pass,
            MissingMarkPolicy::Break => Step::Stop,
        },
    }
}

fn mark_on(days: &BTreeMap<NaiveDate, DayMark>, day: NaiveDate) -> DayMark {
    days.get(&day).copied().unwrap_or(DayMark::Unmarked)
}

/// Walks back from `as_of` to `floor` counting absent working days.
pub fn compute_streak(
    as_of: NaiveDate,
    floor: NaiveDate,
    days: &BTreeMap<NaiveDate, DayMark>,
    calendar: &HolidayCalendar,
    missing_marks: MissingMarkPolicy,
) -> Streak {
    let mut streak = Streak::default();
    let mut next = Some(as_of);

    while let Some(current) = next.filter(|day| *day >= floor) {
        next = current.pred_opt();
        match step(calendar, current, mark_on(days, current), missing_marks) {
            Step::Stop => break,
            Step::Pass => continue,
            Step::Count => {
                streak.count += 1;
                streak.last_absent_date.get_or_insert(current);
                streak.start_date = Some(current);
            }
        }
    }

    streak
}

/// Carries a streak ending at `as_of` forward through later absences up to
/// `ceiling`. A day marked late is then judged as part of its whole run.
pub fn extend_run(
    mut streak: Streak,
    as_of: NaiveDate,
    ceiling: NaiveDate,
    days: &BTreeMap<NaiveDate, DayMark>,
    calendar: &HolidayCalendar,
    missing_marks: MissingMarkPolicy,
) -> Streak {
    if streak.count == 0 {
        return streak;
    }
    let mut next = as_of.succ_opt();

    while let Some(current) = next.filter(|day| *day <= ceiling) {
        next = current.succ_opt();
        match step(calendar, current, mark_on(days, current), missing_marks) {
            Step::Stop => break,
            Step::Pass => continue,
            Step::Count => {
                streak.count += 1;
                streak.last_absent_date = Some(current);
            }
        }
    }

    streak
}

struct LedgerWindow {
    floor: NaiveDate,
    days: BTreeMap<NaiveDate, DayMark>,
    calendar: HolidayCalendar,
}

async fn load_window(
    store: &dyn Store,
    policy: &EscalationPolicy,
    student_id: Uuid,
    as_of: NaiveDate,
    to: NaiveDate,
) -> EngineResult<Option<LedgerWindow>> {
    let Some(first_record) = store.first_record_date(student_id).await? else {
        return Ok(None);
    };
    if first_record > as_of {
        return Ok(None);
    }

    let lookback = as_of
        .checked_sub_signed(Duration::days(MAX_LOOKBACK_DAYS))
        .unwrap_or(NaiveDate::MIN);
    let floor = first_record.max(lookback);
    let records = store.records_between(student_id, floor, to).await?;
    let calendar = HolidayCalendar::load(store, policy, floor, to).await?;

    let mut by_date: HashMap<NaiveDate, Vec<&AttendanceRecord>> = HashMap::new();
    for record in &records {
        by_date.entry(record.date).or_default().push(record);
    }
    let days = by_date
        .into_iter()
        .map(|(date, records)| (date, summarize_day(records)))
        .collect();

    Ok(Some(LedgerWindow {
        floor,
        days,
        calendar,
    }))
}

/// The streak of absences ending at `as_of`.
pub async fn consecutive_absence_streak(
    store: &dyn Store,
    policy: &EscalationPolicy,
    student_id: Uuid,
    as_of: NaiveDate,
) -> EngineResult<Streak> {
    let Some(window) = load_window(store, policy, student_id, as_of, as_of).await? else {
        return Ok(Streak::default());
    };
    Ok(compute_streak(
        as_of,
        window.floor,
        &window.days,
        &window.calendar,
        policy.missing_marks,
    ))
}

/// The whole run of absences `as_of` belongs to, including absences
/// already marked after it.
pub async fn absence_run(
    store: &dyn Store,
    policy: &EscalationPolicy,
    student_id: Uuid,
    as_of: NaiveDate,
) -> EngineResult<Streak> {
    let horizon = as_of
        .checked_add_signed(Duration::days(MAX_LOOKBACK_DAYS))
        .unwrap_or(NaiveDate::MAX);
    let ceiling = match store.last_record_date(student_id).await? {
        Some(last) => last.clamp(as_of, horizon),
        None => as_of,
    };
    let Some(window) = load_window(store, policy, student_id, as_of, ceiling).await? else {
        return Ok(Streak::default());
    };

    let streak = compute_streak(
        as_of,
        window.floor,
        &window.days,
        &window.calendar,
        policy.missing_marks,
    );
    Ok(extend_run(
        streak,
        as_of,
        ceiling,
        &window.days,
        &window.calendar,
        policy.missing_marks,
    ))
}

/// Upserts a mark after checking the student may be marked.
pub async fn record_mark(store: &dyn Store, mark: &AttendanceMark) -> EngineResult<UpsertOutcome> {
    let student = store
        .get_student(mark.student_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("student {}", mark.student_id)))?;

    if !student.status.is_enrolled() {
        return Err(EngineError::Validation(format!(
            "student {} is {} and cannot be marked",
            student.id, student.status
        )));
    }

    let outcome = store.upsert_record(mark).await?;
    if outcome.changed {
        tracing::debug!(
            student_id = %mark.student_id,
            date = %mark.date,
            status = mark.status.as_str(),
            version = outcome.record.version,
            "attendance recorded"
        );
    }
    Ok(outcome)
}

/// Month view keyed by date. With several course marks on one day the
/// summarizing status is shown.
pub async fn month_calendar(
    store: &dyn Store,
    student_id: Uuid,
    year: i32,
    month: u32,
) -> EngineResult<BTreeMap<NaiveDate, AttendanceRecord>> {
    if store.get_student(student_id).await?.is_none() {
        return Err(EngineError::NotFound(format!("student {student_id}")));
    }
    let (first, last) = calendar::month_bounds(year, month)?;
    let records = store.records_between(student_id, first, last).await?;

    let mut view: BTreeMap<NaiveDate, AttendanceRecord> = BTreeMap::new();
    for record in records {
        match view.get(&record.date) {
            Some(existing) if status_rank(existing.status) >= status_rank(record.status) => {}
            _ => {
                view.insert(record.date, record);
            }
        }
    }
    Ok(view)
}

fn status_rank(status: AttendanceStatus) -> u8 {
    match status {
        AttendanceStatus::Present => 3,
        AttendanceStatus::Absent => 2,
        AttendanceStatus::Holiday => 1,
        AttendanceStatus::Pending => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};
    use std::collections::HashSet;

    use crate::models::{Holiday, HolidayType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(day: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            course_id: None,
            date: day,
            status,
            reason: None,
            version: 1,
            marked_at: Utc::now(),
        }
    }

    fn no_weekend() -> HolidayCalendar {
        HolidayCalendar::new(HashSet::new(), Vec::new())
    }

    fn days(marks: &[(NaiveDate, DayMark)]) -> BTreeMap<NaiveDate, DayMark> {
        marks.iter().copied().collect()
    }

    #[test]
    fn present_in_any_course_wins() {
        let day = date(2024, 1, 1);
        let absent = record(day, AttendanceStatus::Absent);
        let present = record(day, AttendanceStatus::Present);
        assert_eq!(summarize_day([&absent, &present]), DayMark::Present);
        assert_eq!(summarize_day([&absent]), DayMark::Absent);
        assert_eq!(
            summarize_day([&record(day, AttendanceStatus::Pending)]),
            DayMark::Unmarked
        );
        assert_eq!(
            summarize_day([&record(day, AttendanceStatus::Holiday)]),
            DayMark::Excused
        );
    }

    #[test]
    fn counts_back_to_first_present() {
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Present),
            (date(2024, 1, 2), DayMark::Absent),
            (date(2024, 1, 3), DayMark::Absent),
        ]);
        let streak = compute_streak(
            date(2024, 1, 3),
            date(2024, 1, 1),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        assert_eq!(streak.count, 2);
        assert_eq!(streak.start_date, Some(date(2024, 1, 2)));
        assert_eq!(streak.last_absent_date, Some(date(2024, 1, 3)));
    }

    #[test]
    fn holidays_neither_break_nor_count() {
        let holiday = Holiday {
            id: Uuid::new_v4(),
            date: date(2024, 1, 2),
            name: "Founders Day".to_string(),
            holiday_type: HolidayType::Adhoc,
        };
        let calendar = HolidayCalendar::new(HashSet::new(), vec![holiday]);
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Absent),
            (date(2024, 1, 3), DayMark::Absent),
        ]);
        let streak = compute_streak(
            date(2024, 1, 3),
            date(2024, 1, 1),
            &marks,
            &calendar,
            MissingMarkPolicy::Break,
        );
        assert_eq!(streak.count, 2);
        assert_eq!(streak.start_date, Some(date(2024, 1, 1)));
    }

    #[test]
    fn weekends_are_skipped() {
        let weekend: HashSet<Weekday> = [Weekday::Sat, Weekday::Sun].into_iter().collect();
        let calendar = HolidayCalendar::new(weekend, Vec::new());
        // Friday 2024-01-05 and Monday 2024-01-08
        let marks = days(&[
            (date(2024, 1, 5), DayMark::Absent),
            (date(2024, 1, 8), DayMark::Absent),
        ]);
        let streak = compute_streak(
            date(2024, 1, 8),
            date(2024, 1, 5),
            &marks,
            &calendar,
            MissingMarkPolicy::Break,
        );
        assert_eq!(streak.count, 2);
    }

    #[test]
    fn missing_mark_policy_controls_unmarked_days() {
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Absent),
            (date(2024, 1, 3), DayMark::Absent),
        ]);
        let run = |policy| {
            compute_streak(date(2024, 1, 3), date(2024, 1, 1), &marks, &no_weekend(), policy).count
        };
        assert_eq!(run(MissingMarkPolicy::Break), 1);
        assert_eq!(run(MissingMarkPolicy::Skip), 2);
        assert_eq!(run(MissingMarkPolicy::Absent), 3);
    }

    #[test]
    fn run_extends_through_later_absences() {
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Absent),
            (date(2024, 1, 2), DayMark::Absent),
            (date(2024, 1, 3), DayMark::Absent),
            (date(2024, 1, 4), DayMark::Present),
            (date(2024, 1, 5), DayMark::Absent),
        ]);
        let streak = compute_streak(
            date(2024, 1, 1),
            date(2024, 1, 1),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        let run = extend_run(
            streak,
            date(2024, 1, 1),
            date(2024, 1, 5),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        assert_eq!(run.count, 3);
        assert_eq!(run.start_date, Some(date(2024, 1, 1)));
        assert_eq!(run.last_absent_date, Some(date(2024, 1, 3)));
    }

    #[test]
    fn run_is_not_extended_from_a_present_day() {
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Present),
            (date(2024, 1, 2), DayMark::Absent),
        ]);
        let streak = compute_streak(
            date(2024, 1, 1),
            date(2024, 1, 1),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        let run = extend_run(
            streak,
            date(2024, 1, 1),
            date(2024, 1, 2),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        assert_eq!(run, Streak::default());
    }

    #[test]
    fn walk_stops_at_the_calendar_edge() {
        let marks = days(&[(NaiveDate::MIN, DayMark::Absent), (NaiveDate::MAX, DayMark::Absent)]);
        let low = compute_streak(
            NaiveDate::MIN,
            NaiveDate::MIN,
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Break,
        );
        assert_eq!(low.count, 1);
        let high = extend_run(
            Streak {
                count: 1,
                start_date: Some(NaiveDate::MAX),
                last_absent_date: Some(NaiveDate::MAX),
            },
            NaiveDate::MAX,
            NaiveDate::MAX,
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Absent,
        );
        assert_eq!(high.count, 1);
    }

    #[test]
    fn present_today_resets_streak() {
        let marks = days(&[
            (date(2024, 1, 1), DayMark::Absent),
            (date(2024, 1, 2), DayMark::Absent),
            (date(2024, 1, 3), DayMark::Present),
        ]);
        let streak = compute_streak(
            date(2024, 1, 3),
            date(2024, 1, 1),
            &marks,
            &no_weekend(),
            MissingMarkPolicy::Absent,
        );
        assert_eq!(streak, Streak::default());
    }
}
