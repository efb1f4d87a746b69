use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ReportError, Result};

/// Named reporting period, as sent by the report UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeriodSelector {
    Today,
    Yesterday,
    Week,
    LastWeek,
    Month,
    LastMonth,
    Year,
    LastYear,
    All,
}

/// Calendar unit a selector is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Day,
    Week,
    Month,
    Year,
}

/// How a selector's window is laid out relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// From the start of the current unit up to `now`.
    InProgress(CalendarUnit),
    /// The whole unit immediately before the current one.
    Closed(CalendarUnit),
    /// From the earliest-data floor up to `now`.
    AllTime,
}

/// Shape of the comparable previous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonShape {
    /// Same elapsed time measured from the previous unit's start.
    ElapsedSoFar,
    /// The entire unit before the current window.
    FullPriorWindow,
    NoComparison,
}

impl PeriodSelector {
    pub const ALL: [PeriodSelector; 9] = [
        PeriodSelector::Today,
        PeriodSelector::Yesterday,
        PeriodSelector::Week,
        PeriodSelector::LastWeek,
        PeriodSelector::Month,
        PeriodSelector::LastMonth,
        PeriodSelector::Year,
        PeriodSelector::LastYear,
        PeriodSelector::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodSelector::Today => "today",
            PeriodSelector::Yesterday => "yesterday",
            PeriodSelector::Week => "week",
            PeriodSelector::LastWeek => "last-week",
            PeriodSelector::Month => "month",
            PeriodSelector::LastMonth => "last-month",
            PeriodSelector::Year => "year",
            PeriodSelector::LastYear => "last-year",
            PeriodSelector::All => "all",
        }
    }

    pub fn window(self) -> Window {
        match self {
            PeriodSelector::Today => Window::InProgress(CalendarUnit::Day),
            PeriodSelector::Yesterday => Window::Closed(CalendarUnit::Day),
            PeriodSelector::Week => Window::InProgress(CalendarUnit::Week),
            PeriodSelector::LastWeek => Window::Closed(CalendarUnit::Week),
            PeriodSelector::Month => Window::InProgress(CalendarUnit::Month),
            PeriodSelector::LastMonth => Window::Closed(CalendarUnit::Month),
            PeriodSelector::Year => Window::InProgress(CalendarUnit::Year),
            PeriodSelector::LastYear => Window::Closed(CalendarUnit::Year),
            PeriodSelector::All => Window::AllTime,
        }
    }

    pub fn comparison_shape(self) -> ComparisonShape {
        match self.window() {
            Window::InProgress(_) => ComparisonShape::ElapsedSoFar,
            Window::Closed(_) => ComparisonShape::FullPriorWindow,
            Window::AllTime => ComparisonShape::NoComparison,
        }
    }
}

impl FromStr for PeriodSelector {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        PeriodSelector::ALL
            .into_iter()
            .find(|selector| selector.as_str() == s)
            .ok_or_else(|| ReportError::InvalidSelector(s.to_string()))
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CalendarUnit {
    /// First day of the unit containing `date`. Weeks start on Monday.
    fn start_of(self, date: NaiveDate) -> NaiveDate {
        let days_back = match self {
            CalendarUnit::Day => 0,
            // Monday = 1 ... Sunday = 7, so Sunday closes the week that began six days earlier
            CalendarUnit::Week => date.weekday().number_from_monday() - 1,
            CalendarUnit::Month => date.day0(),
            CalendarUnit::Year => date.ordinal0(),
        };
        date - Duration::days(i64::from(days_back))
    }

    /// First day of the unit before the one starting at `unit_start`.
    fn previous_start(self, unit_start: NaiveDate) -> NaiveDate {
        self.start_of(unit_start - Duration::days(1))
    }
}

/// Half-open `[start, end)` interval of absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "range start {} after end {}", start, end);
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// `(start, end)` formatted for the provider query string.
    pub fn query_bounds(&self) -> (String, String) {
        (
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.query_bounds();
        write!(f, "[{}, {})", start, end)
    }
}

/// Parse a caller-supplied reference instant.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ReportError::InvalidInstant(raw.to_string()))
}

/// Resolves period selectors into absolute ranges using local calendar rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeResolver {
    tz: Tz,
    earliest_data: DateTime<Utc>,
}

impl RangeResolver {
    pub fn new(tz: Tz, earliest_data: DateTime<Utc>) -> Self {
        Self { tz, earliest_data }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn earliest_data(&self) -> DateTime<Utc> {
        self.earliest_data
    }

    pub fn resolve_current(&self, selector: PeriodSelector, now: DateTime<Utc>) -> DateRange {
        let today = self.local_date(now);
        match selector.window() {
            Window::InProgress(unit) => {
                DateRange::new(self.local_midnight(unit.start_of(today)), now)
            }
            Window::Closed(unit) => {
                let end = unit.start_of(today);
                let start = unit.previous_start(end);
                DateRange::new(self.local_midnight(start), self.local_midnight(end))
            }
            Window::AllTime => DateRange::new(self.earliest_data.min(now), now),
        }
    }

    /// The comparable range before the current one, or `None` when the selector has no
    /// meaningful prior window.
    pub fn resolve_previous(
        &self,
        selector: PeriodSelector,
        now: DateTime<Utc>,
    ) -> Option<DateRange> {
        let today = self.local_date(now);
        match selector.window() {
            Window::InProgress(unit) => {
                let current_start = unit.start_of(today);
                let elapsed = now - self.local_midnight(current_start);
                let start = self.local_midnight(unit.previous_start(current_start));
                Some(DateRange::new(start, start + elapsed))
            }
            Window::Closed(unit) => {
                let end = unit.previous_start(unit.start_of(today));
                let start = unit.previous_start(end);
                Some(DateRange::new(
                    self.local_midnight(start),
                    self.local_midnight(end),
                ))
            }
            Window::AllTime => None,
        }
    }

    /// Current and previous ranges computed from the same reference instant.
    pub fn resolve(
        &self,
        selector: PeriodSelector,
        now: DateTime<Utc>,
    ) -> (DateRange, Option<DateRange>) {
        let current = self.resolve_current(selector, now);
        let previous = self.resolve_previous(selector, now);
        tracing::debug!(
            "resolved {} at {}: current {}, previous {:?}",
            selector,
            now,
            current,
            previous.map(|range| range.to_string())
        );
        (current, previous)
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        local_midnight(self.tz, date)
    }
}

/// Instant of midnight on `date` in `tz`. A midnight skipped by a DST jump resolves to the
/// first valid local hour after it; a repeated one resolves to the earlier instant.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..24)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + Duration::hours(hour)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
