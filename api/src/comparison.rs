use lexicon::PlayEvent;
use serde::Serialize;

use crate::aggregate::{aggregate, parse_timestamp, Report};
use crate::period::{DateRange, PeriodSelector};

/// A period's report next to the report for its comparable previous range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub period: PeriodSelector,
    pub current_range: DateRange,
    pub previous_range: Option<DateRange>,
    pub current: Report,
    pub previous: Option<Report>,
    /// Royalty change against the previous range, in percent.
    pub royalty_change_pct: Option<f64>,
}

impl PeriodReport {
    /// `previous_events` is ignored when there is no previous range.
    pub fn build(
        period: PeriodSelector,
        current_range: DateRange,
        previous_range: Option<DateRange>,
        current_events: &[PlayEvent],
        previous_events: &[PlayEvent],
        filter: Option<&str>,
    ) -> Self {
        let current = aggregate(current_events, filter);
        let previous = previous_range.map(|_| aggregate(previous_events, filter));
        let royalty_change_pct = previous
            .as_ref()
            .and_then(|prev| percent_change(prev.total_royalties, current.total_royalties));

        Self {
            period,
            current_range,
            previous_range,
            current,
            previous,
            royalty_change_pct,
        }
    }
}

/// Percentage change from `previous` to `current`; `None` when there is no baseline.
pub fn percent_change(previous: u64, current: u64) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some((current as f64 - previous as f64) / previous as f64 * 100.0)
}

/// Split a mixed event dump into the events inside `current` and inside `previous`.
/// Events without a usable timestamp belong to neither window.
pub fn split_by_ranges(
    events: Vec<PlayEvent>,
    current: &DateRange,
    previous: Option<&DateRange>,
) -> (Vec<PlayEvent>, Vec<PlayEvent>) {
    let mut in_current = Vec::new();
    let mut in_previous = Vec::new();
    let mut unplaced = 0;

    for event in events {
        match event.timestamp.as_deref().and_then(parse_timestamp) {
            Some(at) if current.contains(at) => in_current.push(event),
            Some(at) if previous.is_some_and(|range| range.contains(at)) => {
                in_previous.push(event)
            }
            Some(_) => {}
            None => unplaced += 1,
        }
    }

    if unplaced > 0 {
        tracing::warn!("{} events had no usable timestamp and were left out", unplaced);
    }
    (in_current, in_previous)
}
