//! Institute settings and the escalation policy derived from them.
//!
//! Settings are plain key/value rows. Every evaluation loads a fresh
//! [`EscalationPolicy`] so a changed threshold applies to the next mark
//! without a restart.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Weekday;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::models::InstituteSetting;
use crate::store::Store;

pub const WEEKEND_DAYS: &str = "weekend_days";
pub const ONE_DAY_THRESHOLD: &str = "escalation_1_day_threshold";
pub const THREE_DAY_THRESHOLD: &str = "escalation_3_day_threshold";
pub const SEVEN_DAY_THRESHOLD: &str = "escalation_7_day_threshold";
pub const MISSING_MARK_POLICY: &str = "missing_mark_policy";

/// How a working day with no attendance record affects a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMarkPolicy {
    /// Counts as an absence.
    Absent,
    /// Ignored, like a non-working day.
    Skip,
    /// Ends the streak.
    Break,
}

impl MissingMarkPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingMarkPolicy::Absent => "absent",
            MissingMarkPolicy::Skip => "skip",
            MissingMarkPolicy::Break => "break",
        }
    }
}

impl FromStr for MissingMarkPolicy {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absent" => Ok(MissingMarkPolicy::Absent),
            "skip" => Ok(MissingMarkPolicy::Skip),
            "break" => Ok(MissingMarkPolicy::Break),
            other => Err(EngineError::Config(format!(
                "unknown missing mark policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub one_day: u32,
    pub three_day: u32,
    pub seven_day: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            one_day: 1,
            three_day: 3,
            seven_day: 7,
        }
    }
}

/// Snapshot of every setting an evaluation depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub weekend_days: HashSet<Weekday>,
    pub thresholds: Thresholds,
    pub missing_marks: MissingMarkPolicy,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            weekend_days: default_weekend(),
            thresholds: Thresholds::default(),
            missing_marks: MissingMarkPolicy::Break,
        }
    }
}

impl EscalationPolicy {
    /// Reads the current settings. Malformed values degrade per key and are logged.
    pub async fn load(store: &dyn Store) -> EngineResult<Self> {
        let mut policy = EscalationPolicy::default();

        if let Some(raw) = store.get_setting(WEEKEND_DAYS).await? {
            policy.weekend_days = match parse_weekend_days(&raw) {
                Ok(days) => days,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        value = %raw,
                        "weekend_days unusable, applying no weekend"
                    );
                    HashSet::new()
                }
            };
        }

        let one_day = store.get_setting(ONE_DAY_THRESHOLD).await?;
        let three_day = store.get_setting(THREE_DAY_THRESHOLD).await?;
        let seven_day = store.get_setting(SEVEN_DAY_THRESHOLD).await?;
        policy.thresholds = match parse_thresholds(
            one_day.as_deref(),
            three_day.as_deref(),
            seven_day.as_deref(),
        ) {
            Ok(thresholds) => thresholds,
            Err(err) => {
                tracing::warn!(error = %err, "escalation thresholds unusable, applying defaults");
                Thresholds::default()
            }
        };

        if let Some(raw) = store.get_setting(MISSING_MARK_POLICY).await? {
            policy.missing_marks = raw.parse().unwrap_or_else(|err: EngineError| {
                tracing::warn!(error = %err, "missing_mark_policy unusable, applying break");
                MissingMarkPolicy::Break
            });
        }

        Ok(policy)
    }
}

pub fn default_weekend() -> HashSet<Weekday> {
    [Weekday::Fri, Weekday::Sat].into_iter().collect()
}

/// Accepts a JSON array of weekday names or a comma separated list.
pub fn parse_weekend_days(raw: &str) -> EngineResult<HashSet<Weekday>> {
    let tokens: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(values) => values,
        Err(_) => raw
            .split(',')
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect(),
    };

    tokens
        .iter()
        .map(|token| {
            token
                .trim()
                .parse::<Weekday>()
                .map_err(|_| EngineError::Config(format!("unknown weekday '{token}'")))
        })
        .collect()
}

fn parse_threshold(name: &str, raw: Option<&str>, fallback: u32) -> EngineResult<u32> {
    let Some(raw) = raw else {
        return Ok(fallback);
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(EngineError::Config(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
    }
}

pub fn parse_thresholds(
    one_day: Option<&str>,
    three_day: Option<&str>,
    seven_day: Option<&str>,
) -> EngineResult<Thresholds> {
    let defaults = Thresholds::default();
    let thresholds = Thresholds {
        one_day: parse_threshold(ONE_DAY_THRESHOLD, one_day, defaults.one_day)?,
        three_day: parse_threshold(THREE_DAY_THRESHOLD, three_day, defaults.three_day)?,
        seven_day: parse_threshold(SEVEN_DAY_THRESHOLD, seven_day, defaults.seven_day)?,
    };

    if thresholds.one_day > thresholds.three_day || thresholds.three_day > thresholds.seven_day {
        return Err(EngineError::Config(format!(
            "thresholds must be non-decreasing, got {}/{}/{}",
            thresholds.one_day, thresholds.three_day, thresholds.seven_day
        )));
    }

    Ok(thresholds)
}

/// Validates a value before it is written. Unlike [`EscalationPolicy::load`]
/// nothing degrades here: a bad value is rejected.
pub async fn validate_setting(store: &dyn Store, name: &str, value: &str) -> EngineResult<()> {
    let invalid = |err: EngineError| EngineError::Validation(err.to_string());

    match name {
        WEEKEND_DAYS => {
            let days = parse_weekend_days(value).map_err(invalid)?;
            if days.len() == 7 {
                return Err(EngineError::Validation(
                    "weekend_days cannot cover the whole week".to_string(),
                ));
            }
        }
        ONE_DAY_THRESHOLD | THREE_DAY_THRESHOLD | SEVEN_DAY_THRESHOLD => {
            let mut current = [
                store.get_setting(ONE_DAY_THRESHOLD).await?,
                store.get_setting(THREE_DAY_THRESHOLD).await?,
                store.get_setting(SEVEN_DAY_THRESHOLD).await?,
            ];
            let slot = match name {
                ONE_DAY_THRESHOLD => 0,
                THREE_DAY_THRESHOLD => 1,
                _ => 2,
            };
            current[slot] = Some(value.to_string());
            parse_thresholds(
                current[0].as_deref(),
                current[1].as_deref(),
                current[2].as_deref(),
            )
            .map_err(invalid)?;
        }
        MISSING_MARK_POLICY => {
            value.parse::<MissingMarkPolicy>().map_err(invalid)?;
        }
        other => {
            return Err(EngineError::Validation(format!("unknown setting '{other}'")));
        }
    }

    Ok(())
}

pub async fn get(store: &dyn Store, name: &str) -> EngineResult<InstituteSetting> {
    store
        .setting(name)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("setting {name}")))
}

pub async fn set(store: &dyn Store, name: &str, value: &str) -> EngineResult<InstituteSetting> {
    validate_setting(store, name, value).await?;
    let setting = store.put_setting(name, value.trim()).await?;
    tracing::info!(setting = name, value = %setting.setting_value, "institute setting updated");
    Ok(setting)
}

pub async fn list(store: &dyn Store) -> EngineResult<Vec<InstituteSetting>> {
    store.list_settings().await
}

/// Default rows written by `seed` and the in-memory store.
pub fn default_settings() -> Vec<(&'static str, String)> {
    vec![
        (WEEKEND_DAYS, r#"["Friday","Saturday"]"#.to_string()),
        (ONE_DAY_THRESHOLD, "1".to_string()),
        (THREE_DAY_THRESHOLD, "3".to_string()),
        (SEVEN_DAY_THRESHOLD, "7".to_string()),
        (MISSING_MARK_POLICY, MissingMarkPolicy::Break.as_str().to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn weekend_days_accept_json_and_csv() {
        let json = parse_weekend_days(r#"["Friday","saturday"]"#).unwrap();
        let csv = parse_weekend_days("Fri, Sat").unwrap();
        assert_eq!(json, csv);
        assert!(json.contains(&Weekday::Fri));
        assert!(parse_weekend_days("[]").unwrap().is_empty());
    }

    #[test]
    fn unknown_weekday_is_a_config_error() {
        let err = parse_weekend_days("Friday,Funday").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn thresholds_must_be_ordered_and_positive() {
        assert!(parse_thresholds(Some("1"), Some("3"), Some("7")).is_ok());
        assert!(parse_thresholds(Some("0"), None, None).is_err());
        assert!(parse_thresholds(Some("4"), Some("3"), None).is_err());
        assert!(parse_thresholds(None, Some("abc"), None).is_err());
        assert_eq!(parse_thresholds(None, None, None).unwrap(), Thresholds::default());
    }

    #[tokio::test]
    async fn malformed_stored_values_degrade() {
        let store = MemoryStore::new();
        store.put_setting(WEEKEND_DAYS, "Friday,Someday").await.unwrap();
        store.put_setting(SEVEN_DAY_THRESHOLD, "2").await.unwrap();
        store.put_setting(MISSING_MARK_POLICY, "maybe").await.unwrap();

        let policy = EscalationPolicy::load(&store).await.unwrap();
        assert!(policy.weekend_days.is_empty());
        assert_eq!(policy.thresholds, Thresholds::default());
        assert_eq!(policy.missing_marks, MissingMarkPolicy::Break);
    }

    #[tokio::test]
    async fn set_rejects_invalid_values_and_keeps_previous() {
        let store = MemoryStore::new();
        let err = set(&store, THREE_DAY_THRESHOLD, "9").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(get(&store, THREE_DAY_THRESHOLD).await.unwrap().setting_value, "3");

        let err = set(&store, "favourite_colour", "blue").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn threshold_change_applies_to_next_load() {
        let store = MemoryStore::new();
        set(&store, THREE_DAY_THRESHOLD, "2").await.unwrap();
        let policy = EscalationPolicy::load(&store).await.unwrap();
        assert_eq!(policy.thresholds.three_day, 2);
    }
}
