//! Working-day resolution over the weekend rule and persisted holidays.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{Holiday, HolidayType, ResolvedHoliday, MAX_YEAR, MIN_YEAR};
use crate::settings::EscalationPolicy;
use crate::store::Store;

const MAX_RANGE_DAYS: i64 = 366;

/// Holidays indexed by date plus the weekend rule, for O(1) lookups.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    weekend_days: HashSet<Weekday>,
    holidays: HashMap<NaiveDate, Holiday>,
}

impl HolidayCalendar {
    pub fn new(weekend_days: HashSet<Weekday>, holidays: Vec<Holiday>) -> Self {
        let holidays = holidays
            .into_iter()
            .map(|holiday| (holiday.date, holiday))
            .collect();
        Self {
            weekend_days,
            holidays,
        }
    }

    /// Loads the holidays in `from..=to` and the policy's weekend rule.
    pub async fn load(
        store: &dyn Store,
        policy: &EscalationPolicy,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Self> {
        let holidays = store.holidays_between(from, to).await?;
        Ok(Self::new(policy.weekend_days.clone(), holidays))
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        self.weekend_days.contains(&date.weekday())
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !self.is_weekend(date) && !self.holidays.contains_key(&date)
    }

    /// Every holiday in `from..=to`, one entry per date. A persisted holiday
    /// shadows the weekend rule on the same date.
    pub fn resolve_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<ResolvedHoliday> {
        let mut resolved = Vec::new();
        let mut day = from;
        while day <= to {
            if let Some(holiday) = self.holidays.get(&day) {
                resolved.push(ResolvedHoliday {
                    id: Some(holiday.id),
                    date: day,
                    name: holiday.name.clone(),
                    holiday_type: holiday.holiday_type,
                });
            } else if self.is_weekend(day) {
                resolved.push(ResolvedHoliday {
                    id: None,
                    date: day,
                    name: format!("Weekend ({})", weekday_name(day.weekday())),
                    holiday_type: HolidayType::Weekend,
                });
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        resolved
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> EngineResult<(NaiveDate, NaiveDate)> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EngineError::Validation(format!(
            "year {year} is outside {MIN_YEAR}..={MAX_YEAR}"
        )));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::Validation(format!("invalid month {year}-{month}")))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| EngineError::Validation(format!("invalid month {year}-{month}")))?;
    Ok((first, next - Duration::days(1)))
}

/// Expands an inclusive date range into one holiday row per date.
pub fn expand_range(start: NaiveDate, end: NaiveDate, name: &str) -> EngineResult<Vec<Holiday>> {
    if end < start {
        return Err(EngineError::Validation(format!(
            "holiday range ends ({end}) before it starts ({start})"
        )));
    }
    if (end - start).num_days() >= MAX_RANGE_DAYS {
        return Err(EngineError::Validation(format!(
            "holiday range may span at most {MAX_RANGE_DAYS} days"
        )));
    }

    let mut holidays = Vec::new();
    let mut day = start;
    while day <= end {
        holidays.push(Holiday {
            id: Uuid::new_v4(),
            date: day,
            name: name.to_string(),
            holiday_type: HolidayType::Range,
        });
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    Ok(holidays)
}

fn validate_name(name: &str) -> EngineResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("holiday name is required".to_string()));
    }
    Ok(name.to_string())
}

pub async fn add_holiday(store: &dyn Store, date: NaiveDate, name: &str) -> EngineResult<Holiday> {
    let holiday = Holiday {
        id: Uuid::new_v4(),
        date,
        name: validate_name(name)?,
        holiday_type: HolidayType::Adhoc,
    };
    let mut stored = store.upsert_holidays(std::slice::from_ref(&holiday)).await?;
    tracing::info!(%date, name = %holiday.name, "holiday added");
    stored
        .pop()
        .ok_or_else(|| EngineError::NotFound(format!("holiday on {date}")))
}

pub async fn add_holiday_range(
    store: &dyn Store,
    start: NaiveDate,
    end: NaiveDate,
    name: &str,
) -> EngineResult<Vec<Holiday>> {
    let name = validate_name(name)?;
    let holidays = expand_range(start, end, &name)?;
    let stored = store.upsert_holidays(&holidays).await?;
    tracing::info!(%start, %end, days = stored.len(), name = %name, "holiday range added");
    Ok(stored)
}

pub async fn remove_holiday(store: &dyn Store, id: Uuid) -> EngineResult<()> {
    if store.delete_holiday(id).await? {
        tracing::info!(%id, "holiday removed");
        Ok(())
    } else {
        Err(EngineError::NotFound(format!("holiday {id}")))
    }
}

pub async fn resolve_month(
    store: &dyn Store,
    year: i32,
    month: u32,
) -> EngineResult<Vec<ResolvedHoliday>> {
    let (first, last) = month_bounds(year, month)?;
    let policy = EscalationPolicy::load(store).await?;
    let calendar = HolidayCalendar::load(store, &policy, first, last).await?;
    Ok(calendar.resolve_between(first, last))
}

pub async fn is_working_day(store: &dyn Store, date: NaiveDate) -> EngineResult<bool> {
    let policy = EscalationPolicy::load(store).await?;
    let calendar = HolidayCalendar::load(store, &policy, date, date).await?;
    Ok(calendar.is_working_day(date))
}
