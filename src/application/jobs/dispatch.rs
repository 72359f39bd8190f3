//! Cron-triggered dispatch job.
//!
//! One cron schedule per configured wall-clock time, all in the configured
//! timezone, each firing the shared dispatch coordinator. A tick that lands
//! while the coordinator is stopped is skipped, not an error.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::{Data, Error as ApalisError};
use apalis_cron::Schedule;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::application::dispatch::{CoordinatorError, DispatchCoordinator};
use crate::config::DispatchTime;

/// Marker job produced by the cron stream at each scheduled time.
/// Must implement `From` of the stream's tick timestamp for apalis-cron.
#[derive(Default, Debug, Clone)]
pub struct ScheduledDispatch;

impl From<DateTime<Utc>> for ScheduledDispatch {
    fn from(_: DateTime<Utc>) -> Self {
        Self
    }
}

impl From<DateTime<Tz>> for ScheduledDispatch {
    fn from(_: DateTime<Tz>) -> Self {
        Self
    }
}

/// Context for the dispatch job workers.
#[derive(Clone)]
pub struct DispatchJobContext {
    pub coordinator: Arc<DispatchCoordinator>,
}

/// Process one scheduled tick: run a dispatch and log the outcome. Worker
/// errors are not surfaced to apalis; a failed dispatch is recorded on the
/// coordinator and retried at the next scheduled time.
pub async fn process_scheduled_dispatch(
    _job: ScheduledDispatch,
    ctx: Data<DispatchJobContext>,
) -> Result<(), ApalisError> {
    match ctx.coordinator.dispatch_now().await {
        Ok(report) => {
            info!(
                target = "application::jobs::process_scheduled_dispatch",
                delivered = report.delivered(),
                batch_size = report.batch_size,
                "scheduled dispatch finished"
            );
        }
        Err(CoordinatorError::NotRunning) => {
            debug!(
                target = "application::jobs::process_scheduled_dispatch",
                "scheduled dispatch skipped: coordinator stopped"
            );
        }
        Err(err) => {
            warn!(
                target = "application::jobs::process_scheduled_dispatch",
                error = %err,
                "scheduled dispatch failed"
            );
        }
    }
    Ok(())
}

/// A registered dispatch schedule and its next occurrence.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub id: String,
    pub next_run_at: Option<DateTime<Tz>>,
}

/// The set of cron schedules driving dispatch, one per configured time.
#[derive(Debug, Clone)]
pub struct DispatchScheduler {
    timezone: Tz,
    entries: Vec<(String, Schedule)>,
}

impl DispatchScheduler {
    pub fn from_times(times: &[DispatchTime], timezone: Tz) -> Self {
        let entries = times
            .iter()
            .map(|time| {
                let id = format!("dispatch-{:02}{:02}", time.hour, time.minute);
                let expr = format!("0 {} {} * * *", time.minute, time.hour);
                let schedule =
                    Schedule::from_str(&expr).expect("dispatch time produces a valid cron expr");
                (id, schedule)
            })
            .collect();
        Self { timezone, entries }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn entries(&self) -> &[(String, Schedule)] {
        &self.entries
    }

    /// Registered jobs with their next run time in the scheduler timezone.
    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.entries
            .iter()
            .map(|(id, schedule)| ScheduledJob {
                id: id.clone(),
                next_run_at: schedule.upcoming(self.timezone).next(),
            })
            .collect()
    }
}
