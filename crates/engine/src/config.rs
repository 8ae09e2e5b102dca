use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Accepted sliding-window lengths, in days.
pub const WINDOW_DAYS: RangeInclusive<i64> = 1..=36_500;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub gateway_url: String,
    pub session: String,
    pub page_size: usize,
    pub backfill_page_size: usize,
    pub page_delay: Duration,
    pub poll_interval: Duration,
    pub channel_delay: Duration,
    pub window: chrono::Duration,
    pub monitor_since: DateTime<Utc>,
    pub excluded_views: Option<i64>,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("CHANSYNC_DATABASE_URL"))
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let gateway_url = lookup("CHANSYNC_GATEWAY_URL")
            .ok_or(ConfigError::Missing("CHANSYNC_GATEWAY_URL"))?;
        let session = lookup("CHANSYNC_SESSION")
            .or_else(|| lookup("SESSION_STRING"))
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("CHANSYNC_SESSION"))?;

        let page_size = parse_in(&lookup, "CHANSYNC_PAGE_SIZE", 100, 1..=usize::MAX)?;
        let backfill_page_size =
            parse_in(&lookup, "CHANSYNC_BACKFILL_PAGE_SIZE", 200, 1..=usize::MAX)?;

        let page_delay = Duration::from_millis(parse_or(&lookup, "CHANSYNC_PAGE_DELAY_MS", 1000)?);
        let poll_interval =
            Duration::from_secs(parse_or(&lookup, "CHANSYNC_POLL_INTERVAL_SECS", 60)?);
        let channel_delay =
            Duration::from_secs(parse_or(&lookup, "CHANSYNC_CHANNEL_DELAY_SECS", 2)?);
        let window = chrono::Duration::days(parse_in(
            &lookup,
            "CHANSYNC_WINDOW_DAYS",
            7,
            WINDOW_DAYS,
        )?);

        let monitor_since = match lookup("CHANSYNC_MONITOR_SINCE") {
            Some(value) => parse_date(&value).ok_or(ConfigError::Invalid {
                name: "CHANSYNC_MONITOR_SINCE",
                value,
            })?,
            None => default_monitor_since(),
        };

        let excluded_views = match lookup("CHANSYNC_EXCLUDE_VIEWS") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "CHANSYNC_EXCLUDE_VIEWS",
                value,
            })?),
            None => Some(1),
        };

        let db_max_connections = parse_or(&lookup, "CHANSYNC_DB_MAX_CONNECTIONS", 5)?;
        let db_connect_timeout =
            Duration::from_secs(parse_or(&lookup, "CHANSYNC_DB_CONNECT_TIMEOUT_SECS", 60)?);

        Ok(Self {
            database_url,
            gateway_url,
            session,
            page_size,
            backfill_page_size,
            page_delay,
            poll_interval,
            channel_delay,
            window,
            monitor_since,
            excluded_views,
            db_max_connections,
            db_connect_timeout,
        })
    }
}

/// Floor used by the tail monitor when no explicit date is configured.
pub fn default_monitor_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse a `YYYY-MM-DD` date as midnight UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_in<F, T>(
    lookup: &F,
    name: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + ToString,
{
    let value = parse_or(lookup, name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}
