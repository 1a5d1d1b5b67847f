//! Cron schedules with timezone-aware next-fire computation.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors from schedule parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("invalid timezone: {timezone}")]
    InvalidTimezone { timezone: String },
}

/// A cron expression plus the timezone it is evaluated in.
///
/// Accepts the classic 5-field form (minute first, seconds fixed at 0,
/// day-of-week `0`/`7` = Sunday) and the 6/7-field form with a leading
/// seconds field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    pub expression: String,
    pub timezone: Option<String>,
}

impl CronSchedule {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Parse the expression and timezone.
    pub fn compile(&self) -> Result<CompiledSchedule, ScheduleError> {
        let normalized = normalize(&self.expression).map_err(|reason| {
            ScheduleError::InvalidCronExpression {
                expression: self.expression.clone(),
                reason,
            }
        })?;

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            ScheduleError::InvalidCronExpression {
                expression: self.expression.clone(),
                reason: e.to_string(),
            }
        })?;

        let timezone = match self.timezone.as_deref().map(str::trim) {
            None | Some("") => Tz::UTC,
            Some(name) => name.parse::<Tz>().map_err(|_| ScheduleError::InvalidTimezone {
                timezone: name.to_owned(),
            })?,
        };

        Ok(CompiledSchedule { schedule, timezone })
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.compile().map(|_| ())
    }
}

/// A parsed, ready-to-evaluate schedule.
#[derive(Debug, Clone)]
pub struct CompiledSchedule {
    schedule: cron::Schedule,
    timezone: Tz,
}

impl CompiledSchedule {
    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Rewrite a 5-field expression into the seconds-first form.
fn normalize(expression: &str) -> Result<String, String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            day_names(fields[4])
        )),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(format!("expected 5, 6 or 7 fields, got {n}")),
    }
}

/// Replace numeric days (0-7, Sunday = 0 or 7) with names. Step values after
/// `/` stay numeric. A range ending on 7 is spelled out as a list, since the
/// parser only accepts ranges that run forward within the week.
fn day_names(field: &str) -> String {
    field.split(',').map(day_item).collect::<Vec<_>>().join(",")
}

fn day_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let suffix = step.map(|s| format!("/{s}")).unwrap_or_default();

    let Some((start, end)) = range.split_once('-') else {
        return format!("{}{suffix}", day_name(range));
    };

    let every = match step {
        None => Some(1),
        Some(s) => s.parse::<usize>().ok().filter(|&n| n > 0),
    };
    if let (Ok(first), "7", Some(every)) = (start.parse::<usize>(), end, every) {
        if first <= 7 {
            let mut days: Vec<&str> = Vec::new();
            for name in (first..=7).step_by(every).map(|d| DAY_NAMES[d]) {
                if !days.contains(&name) {
                    days.push(name);
                }
            }
            return days.join(",");
        }
    }
    format!("{}-{}{suffix}", day_name(start), day_name(end))
}

fn day_name(token: &str) -> String {
    match token.parse::<usize>() {
        Ok(n) if n < DAY_NAMES.len() => DAY_NAMES[n].to_owned(),
        _ => token.to_owned(),
    }
}
