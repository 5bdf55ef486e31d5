//! Job triggers and next-run computation.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Cron expression (5 fields, or 6-7 with seconds/years), evaluated in
    /// `tz` when set, UTC otherwise.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    /// Fixed period, measured from the previous firing.
    Interval { every_secs: u64 },
    /// Once, at an instant.
    At { at: DateTime<Utc> },
}

impl Trigger {
    pub fn cron(expr: impl Into<String>, tz: Option<String>) -> Self {
        Trigger::Cron {
            expr: expr.into(),
            tz,
        }
    }

    pub fn every(secs: u64) -> Self {
        Trigger::Interval { every_secs: secs }
    }

    pub fn at(at: DateTime<Utc>) -> Self {
        Trigger::At { at }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Trigger::At { .. })
    }

    /// Check the trigger is well-formed.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match self {
            Trigger::Cron { expr, tz } => {
                parse_cron(expr)?;
                parse_tz(tz.as_deref())?;
                Ok(())
            }
            Trigger::Interval { every_secs: 0 } => Err(SchedulerError::InvalidTrigger(
                "interval must be at least 1 second".to_string(),
            )),
            Trigger::Interval { .. } | Trigger::At { .. } => Ok(()),
        }
    }

    /// First instant strictly after `after` at which the trigger fires.
    ///
    /// `None` means it never fires again (a one-shot whose time has passed,
    /// or a cron expression with no future match).
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        match self {
            Trigger::Cron { expr, tz } => {
                let schedule = parse_cron(expr)?;
                let tz = parse_tz(tz.as_deref())?;
                let local = tz.from_utc_datetime(&after.naive_utc());
                Ok(schedule.after(&local).next().map(|t| t.with_timezone(&Utc)))
            }
            Trigger::Interval { every_secs } => {
                let secs = i64::try_from(*every_secs).map_err(|_| {
                    SchedulerError::InvalidTrigger(format!("interval {} is too large", every_secs))
                })?;
                Ok(after.checked_add_signed(chrono::Duration::seconds(secs)))
            }
            Trigger::At { at } => Ok((*at > after).then_some(*at)),
        }
    }

    /// Next run for a freshly added job.
    ///
    /// A one-shot keeps its timestamp even when it already passed, so it
    /// fires on the next tick instead of being silently dropped.
    pub fn first_run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        match self {
            Trigger::At { at } => Ok(Some(*at)),
            _ => self.next_after(now),
        }
    }

    /// Short human-readable form for listings.
    pub fn describe(&self) -> String {
        match self {
            Trigger::Cron { expr, tz: Some(tz) } => format!("cron '{}' ({})", expr, tz),
            Trigger::Cron { expr, tz: None } => format!("cron '{}'", expr),
            Trigger::Interval { every_secs } => format!("every {}s", every_secs),
            Trigger::At { at } => format!("at {}", at.to_rfc3339()),
        }
    }
}

/// Parse a one-shot timestamp: RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS`
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SchedulerError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            SchedulerError::InvalidTrigger(format!(
                "expected an ISO timestamp like 2026-02-12T10:30:00, got '{}'",
                raw
            ))
        })
}

/// Parse a cron expression, accepting the common 5-field form by implying
/// a leading seconds field of `0`.
fn parse_cron(expr: &str) -> Result<cron::Schedule, SchedulerError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| SchedulerError::InvalidTrigger(format!("invalid cron expression '{}': {}", expr, e)))
}

fn parse_tz(tz: Option<&str>) -> Result<Tz, SchedulerError> {
    match tz {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| SchedulerError::InvalidTrigger(format!("unknown timezone '{}'", name))),
    }
}
