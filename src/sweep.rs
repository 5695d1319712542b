//! Periodic re-evaluation of every enrolled student.
//!
//! Escalation driven only by marks misses students nobody marked. The sweep
//! evaluates each active student as of a closed day; with
//! `missing_mark_policy = absent` that turns silent absences into streaks.

use std::time::Duration;

use chrono::{Duration as DateDuration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::models::StudentStatus;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub as_of: Option<NaiveDate>,
    pub evaluated: usize,
    pub events_emitted: usize,
    pub reports_opened: usize,
    pub suspended: usize,
    pub busy: Vec<Uuid>,
}

/// The last closed day.
pub fn default_sweep_date() -> NaiveDate {
    Utc::now().date_naive() - DateDuration::days(1)
}

pub async fn run_once(engine: &Engine, as_of: NaiveDate) -> EngineResult<SweepSummary> {
    let students = engine.store().list_students().await?;
    let mut summary = SweepSummary {
        as_of: Some(as_of),
        ..SweepSummary::default()
    };

    for student in students
        .into_iter()
        .filter(|student| student.status == StudentStatus::Active)
    {
        match engine.evaluate(student.id, as_of).await {
            Ok(outcome) => {
                summary.evaluated += 1;
                summary.events_emitted += outcome.events.len();
                summary.reports_opened += outcome.reports.len();
                if outcome.suspended {
                    summary.suspended += 1;
                }
            }
            Err(EngineError::Busy(id)) => summary.busy.push(id),
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        %as_of,
        evaluated = summary.evaluated,
        events = summary.events_emitted,
        suspended = summary.suspended,
        busy = summary.busy.len(),
        "attendance sweep finished"
    );
    Ok(summary)
}

/// Runs the sweep for the last closed day on every tick.
pub fn spawn(engine: Engine, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = run_once(&engine, default_sweep_date()).await {
                tracing::error!(error = %err, "attendance sweep failed");
            }
        }
    })
}
