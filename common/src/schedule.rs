// Daily trigger derivation
//
// The scheduler fires once per calendar day at a configured wall-clock time.
// FireTime is the typed trigger value; the cron string is a derived, read-only
// projection of it, both for the timer itself and for operator display.

use crate::errors::ConfigurationError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// The wall-clock time of the daily reminder run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireTime {
    hour: u8,
    minute: u8,
}

impl FireTime {
    /// Build a fire time, rejecting out-of-range values
    pub fn new(hour: i32, minute: i32) -> Result<Self, ConfigurationError> {
        if !(0..=23).contains(&hour) {
            return Err(ConfigurationError::InvalidHour(hour));
        }
        if !(0..=59).contains(&minute) {
            return Err(ConfigurationError::InvalidMinute(minute));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Derive the 6-field cron expression: second minute hour dom month dow
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }

    /// Parse the derived expression into a cron schedule
    pub fn to_cron_schedule(&self) -> Result<CronSchedule, ConfigurationError> {
        let expression = self.cron_expression();
        CronSchedule::from_str(&expression).map_err(|e| {
            ConfigurationError::InvalidCronExpression {
                expression,
                reason: e.to_string(),
            }
        })
    }

    /// Next occurrence strictly after `after`, evaluated in `timezone`
    pub fn next_occurrence(
        &self,
        after: DateTime<Utc>,
        timezone: Tz,
    ) -> Result<DateTime<Utc>, ConfigurationError> {
        let schedule = self.to_cron_schedule()?;
        let reference = after.with_timezone(&timezone);

        let next = schedule.after(&reference).next().ok_or_else(|| {
            ConfigurationError::InvalidCronExpression {
                expression: self.cron_expression(),
                reason: "no upcoming occurrence".to_string(),
            }
        })?;

        Ok(next.with_timezone(&Utc))
    }
}

impl std::fmt::Display for FireTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Default timezone for the daily trigger
pub fn default_timezone() -> Tz {
    chrono_tz::America::La_Paz
}
