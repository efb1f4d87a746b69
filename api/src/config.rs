use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::net::SocketAddr;

use crate::period::{local_midnight, RangeResolver};

pub const DEFAULT_TIMEZONE: &str = "America/Toronto";
pub const DEFAULT_EARLIEST_DATA: &str = "2020-01-01";
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8000";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Zone that defines "today", "this week" and friends.
    pub timezone: Tz,
    /// Floor for the `all` period.
    pub earliest_data: DateTime<Utc>,
    pub provider_url: String,
    pub bind_addr: SocketAddr,
}

impl ReportConfig {
    /// Read configuration from the environment (after loading `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let raw_tz = get("REPORT_TIMEZONE", DEFAULT_TIMEZONE);
        let timezone: Tz = raw_tz
            .parse()
            .map_err(|e| anyhow!("invalid REPORT_TIMEZONE {:?}: {}", raw_tz, e))?;

        let raw_earliest = get("REPORT_EARLIEST_DATA", DEFAULT_EARLIEST_DATA);
        let earliest_data = parse_earliest(&raw_earliest, timezone)
            .with_context(|| format!("invalid REPORT_EARLIEST_DATA {:?}", raw_earliest))?;

        let provider_url = get("PLAY_PROVIDER_URL", DEFAULT_PROVIDER_URL)
            .trim_end_matches('/')
            .to_string();

        let raw_addr = get("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = raw_addr
            .parse()
            .with_context(|| format!("invalid BIND_ADDR {:?}", raw_addr))?;

        Ok(Self {
            timezone,
            earliest_data,
            provider_url,
            bind_addr,
        })
    }

    pub fn resolver(&self) -> RangeResolver {
        RangeResolver::new(self.timezone, self.earliest_data)
    }
}

/// A bare date means local midnight in `tz`; anything else must be RFC 3339.
fn parse_earliest(raw: &str, tz: Tz) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(local_midnight(tz, date));
    }
    let instant = DateTime::parse_from_rfc3339(raw)?;
    Ok(instant.with_timezone(&Utc))
}
