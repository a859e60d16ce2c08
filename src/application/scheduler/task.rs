//! Scheduled task metadata and daily timing

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, TimeZone};
use futures::future::BoxFuture;
use serde::Serialize;

use crate::application::errors::{BotError, InvalidScheduleError};

/// Body of a scheduled task, invoked once per firing
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BotError>> + Send + Sync>;

/// Box an async closure into a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BotError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Interval,
    Daily,
    Once,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Interval => "interval",
            TaskKind::Daily => "daily",
            TaskKind::Once => "once",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Cancelled,
    Done,
}

/// Snapshot row returned by `TaskScheduler::get_tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
}

/// Check a daily `hour:minute` pair.
pub fn validate_daily(hour: u32, minute: u32) -> Result<NaiveTime, InvalidScheduleError> {
    if hour > 23 || minute > 59 {
        return Err(InvalidScheduleError { hour, minute });
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(InvalidScheduleError { hour, minute })
}

/// Next occurrence of `at` strictly after `now`: today if it is still ahead,
/// otherwise tomorrow.
///
/// Local times skipped by a DST jump resolve to one hour later.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut day = today;
    loop {
        let naive = day.and_time(at);
        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest());

        if let Some(candidate) = candidate {
            if candidate > *now {
                return candidate;
            }
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => return now.clone(),
        }
    }
}
