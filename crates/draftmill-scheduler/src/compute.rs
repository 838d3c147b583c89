use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};

/// When a job fires.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum ScheduleSpec {
    #[serde(rename = "cron")]
    Cron {
        expr: String,
        #[serde(default = "default_tz")]
        tz: String,
    },
    #[serde(rename = "every")]
    Every { interval_ms: u64 },
}

impl ScheduleSpec {
    pub fn every_minutes(minutes: u64) -> Self {
        Self::Every {
            interval_ms: minutes * 60_000,
        }
    }
}

fn default_tz() -> String {
    "UTC".to_string()
}

pub fn next_fire_ms(spec: &ScheduleSpec, now_ms: i64) -> Result<i64> {
    match spec {
        ScheduleSpec::Cron { expr, tz } => {
            let tz: Tz = tz.parse().map_err(|_| anyhow!("invalid timezone: {tz}"))?;
            let cron = CronSchedule::from_str(&normalize_cron_expr(expr))?;
            let now_dt = tz
                .timestamp_millis_opt(now_ms)
                .single()
                .ok_or_else(|| anyhow!("invalid timestamp: {now_ms}"))?;
            cron.after(&now_dt)
                .next()
                .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
                .ok_or_else(|| anyhow!("cron expression never fires: {expr}"))
        }
        ScheduleSpec::Every { interval_ms } => {
            let interval = *interval_ms as i64;
            if interval <= 0 {
                return Err(anyhow!("interval_ms must be positive"));
            }
            Ok(now_ms + interval)
        }
    }
}

/// Accept the common 5-field form by prefixing a seconds field.
fn normalize_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Validate a spec without scheduling it (config-load check).
pub fn validate_spec(spec: &ScheduleSpec) -> Result<()> {
    next_fire_ms(spec, Utc::now().timestamp_millis()).map(|_| ())
}
