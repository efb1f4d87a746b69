use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lexicon::PlayEvent;
use serde::Serialize;
use std::fmt;

use crate::ordered::{serialize_values, OrderedMap};

/// Royalty paid per play, in whole monetary units.
pub const ROYALTY_PER_PLAY: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEntry {
    /// `None` is the "no channel" identity, distinct from every named channel.
    pub name: Option<String>,
    pub last_played: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackBreakdown {
    pub count: u64,
    #[serde(serialize_with = "serialize_values")]
    channels: OrderedMap<Option<String>, ChannelEntry>,
}

impl TrackBreakdown {
    /// Channels in the order they were first seen.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelEntry> {
        self.channels.values()
    }

    pub fn channel(&self, name: Option<&str>) -> Option<&ChannelEntry> {
        self.channels.get(&name.map(str::to_string))
    }

    fn record(&mut self, play: &Play<'_>) {
        self.count = self.count.saturating_add(play.plays);

        let channel = self
            .channels
            .get_or_insert_with(play.channel.map(str::to_string), || ChannelEntry {
                name: play.channel.map(str::to_string),
                last_played: None,
            });
        if let Some(at) = play.played_at {
            if channel.last_played.map_or(true, |last| at > last) {
                channel.last_played = Some(at);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistReport {
    pub artist: String,
    pub count: u64,
    pub royalties: u64,
    track_breakdown: OrderedMap<String, TrackBreakdown>,
}

impl ArtistReport {
    fn new(artist: &str) -> Self {
        Self {
            artist: artist.to_string(),
            count: 0,
            royalties: 0,
            track_breakdown: OrderedMap::new(),
        }
    }

    /// Tracks keyed by exact title, in first-seen order.
    pub fn tracks(&self) -> impl Iterator<Item = (&String, &TrackBreakdown)> {
        self.track_breakdown.iter()
    }

    pub fn track(&self, title: &str) -> Option<&TrackBreakdown> {
        self.track_breakdown.get(title)
    }

    fn record(&mut self, play: &Play<'_>) {
        self.track_breakdown
            .get_or_insert_with(play.title.to_string(), TrackBreakdown::default)
            .record(play);
        self.count = self.count.saturating_add(play.plays);
        self.royalties = self.count.saturating_mul(ROYALTY_PER_PLAY);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub artists: Vec<ArtistReport>,
    pub total_artists: usize,
    pub total_spins: u64,
    pub total_royalties: u64,
    /// Events dropped because they could not be placed in the report.
    pub skipped: usize,
}

impl Report {
    fn from_artists(artists: Vec<ArtistReport>, skipped: usize) -> Self {
        Self {
            total_artists: artists.len(),
            total_spins: saturating_sum(artists.iter().map(|a| a.count)),
            total_royalties: saturating_sum(artists.iter().map(|a| a.royalties)),
            artists,
            skipped,
        }
    }

    pub fn artist(&self, name: &str) -> Option<&ArtistReport> {
        self.artists.iter().find(|a| a.artist == name)
    }
}

/// Counts and royalties stop at `u64::MAX` instead of wrapping.
fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

#[derive(Debug)]
enum SkipReason {
    MissingArtist,
    MissingTitle,
    NegativePlays(i64),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingArtist => write!(f, "missing artist"),
            SkipReason::MissingTitle => write!(f, "missing title"),
            SkipReason::NegativePlays(n) => write!(f, "negative play count {}", n),
        }
    }
}

/// An event that passed validation.
struct Play<'a> {
    artist: &'a str,
    title: &'a str,
    channel: Option<&'a str>,
    played_at: Option<DateTime<Utc>>,
    plays: u64,
}

impl<'a> Play<'a> {
    fn from_event(event: &'a PlayEvent) -> Result<Self, SkipReason> {
        let artist = required(&event.artist).ok_or(SkipReason::MissingArtist)?;
        let title = required(&event.title).ok_or(SkipReason::MissingTitle)?;
        let plays = match event.plays {
            None => 1,
            Some(n) if n < 0 => return Err(SkipReason::NegativePlays(n)),
            Some(n) => n as u64,
        };

        Ok(Self {
            artist,
            title,
            channel: event.channel.as_deref(),
            played_at: event.timestamp.as_deref().and_then(parse_timestamp),
            plays,
        })
    }
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

/// RFC 3339, or an ISO-8601 local timestamp without offset read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
        Err(_) => {
            tracing::debug!("ignoring unparseable play timestamp {:?}", raw);
            None
        }
    }
}

/// Fold play events into per-artist reports.
///
/// `filter` keeps only artists whose name contains it, ignoring case; a blank filter keeps
/// everyone. Artists, tracks and channels appear in first-seen order. Events missing an artist
/// or title are skipped and counted in [`Report::skipped`].
pub fn aggregate<'a, I>(events: I, filter: Option<&str>) -> Report
where
    I: IntoIterator<Item = &'a PlayEvent>,
{
    let needle = filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase);

    let mut artists: OrderedMap<String, ArtistReport> = OrderedMap::new();
    let mut skipped = 0;
    let mut seen = 0;

    for event in events {
        seen += 1;
        let play = match Play::from_event(event) {
            Ok(play) => play,
            Err(reason) => {
                skipped += 1;
                tracing::debug!("skipping malformed play event ({}): {:?}", reason, event);
                continue;
            }
        };

        if let Some(needle) = &needle {
            if !play.artist.to_lowercase().contains(needle.as_str()) {
                continue;
            }
        }

        artists
            .get_or_insert_with(play.artist.to_string(), || ArtistReport::new(play.artist))
            .record(&play);
    }

    let report = Report::from_artists(artists.into_values().collect(), skipped);
    tracing::debug!(
        "aggregated {} events into {} artists ({} spins, {} skipped)",
        seen,
        report.total_artists,
        report.total_spins,
        report.skipped
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn play(artist: &str, title: &str, channel: &str) -> PlayEvent {
        PlayEvent::new(artist, title).with_channel(channel)
    }

    fn sample_events() -> Vec<PlayEvent> {
        vec![
            play("Lady Gaga", "Poker Face", "Hits 1").with_timestamp("2024-01-01T10:00:00Z"),
            play("Adele", "Hello", "Pop2K").with_plays(2),
            play("Lady Gaga", "Just Dance", "Hits 1"),
            play("Nate Bargatze", "Tennessee Kid", "Laugh USA").with_plays(4),
            play("Lady Gaga", "Poker Face", "Venus").with_timestamp("2024-01-02T08:00:00Z"),
            play("Adele", "Hello", "Hits 1"),
        ]
    }

    #[test]
    fn test_same_track_and_channel_merge() {
        let events = vec![
            play("A", "T1", "C1")
                .with_plays(2)
                .with_timestamp("2024-01-01T10:00:00Z"),
            play("A", "T1", "C1")
                .with_plays(3)
                .with_timestamp("2024-01-01T12:00:00Z"),
        ];

        let report = aggregate(&events, None);
        let artist = report.artist("A").unwrap();
        assert_eq!(artist.count, 5);
        assert_eq!(artist.royalties, 100);

        let track = artist.track("T1").unwrap();
        assert_eq!(track.count, 5);
        let channels: Vec<_> = track.channels().collect();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name.as_deref(), Some("C1"));
        assert_eq!(channels[0].last_played, Some(at("2024-01-01T12:00:00Z")));
    }

    #[test]
    fn test_last_played_keeps_maximum() {
        let events = vec![
            play("A", "T1", "C1").with_timestamp("2024-01-01T12:00:00Z"),
            play("A", "T1", "C1").with_timestamp("2024-01-01T09:00:00Z"),
            play("A", "T1", "C1"),
        ];

        let report = aggregate(&events, None);
        let track = report.artist("A").unwrap().track("T1").unwrap();
        assert_eq!(track.count, 3);
        assert_eq!(
            track.channel(Some("C1")).unwrap().last_played,
            Some(at("2024-01-01T12:00:00Z"))
        );
    }

    #[test]
    fn test_missing_channel_is_its_own_entry() {
        let events = vec![
            play("A", "T1", "C1"),
            PlayEvent::new("A", "T1"),
            PlayEvent::new("A", "T1").with_timestamp("2024-05-01T00:00:00Z"),
        ];

        let report = aggregate(&events, None);
        let track = report.artist("A").unwrap().track("T1").unwrap();
        assert_eq!(track.count, 3);

        let names: Vec<_> = track.channels().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec![Some("C1".to_string()), None]);
        assert_eq!(
            track.channel(None).unwrap().last_played,
            Some(at("2024-05-01T00:00:00Z"))
        );
    }

    #[test]
    fn test_zero_plays_keeps_entries_without_counting() {
        let events = vec![play("A", "T1", "C1").with_plays(0)];

        let report = aggregate(&events, None);
        let artist = report.artist("A").unwrap();
        assert_eq!(artist.count, 0);
        assert_eq!(artist.royalties, 0);
        assert_eq!(artist.track("T1").unwrap().count, 0);
        assert!(artist.track("T1").unwrap().channel(Some("C1")).is_some());
        assert_eq!(report.total_artists, 1);
        assert_eq!(report.total_spins, 0);
    }

    #[test]
    fn test_first_seen_ordering() {
        let report = aggregate(&sample_events(), None);

        let artists: Vec<_> = report.artists.iter().map(|a| a.artist.as_str()).collect();
        assert_eq!(artists, vec!["Lady Gaga", "Adele", "Nate Bargatze"]);

        let gaga = report.artist("Lady Gaga").unwrap();
        let titles: Vec<_> = gaga.tracks().map(|(title, _)| title.as_str()).collect();
        assert_eq!(titles, vec!["Poker Face", "Just Dance"]);

        let channels: Vec<_> = gaga
            .track("Poker Face")
            .unwrap()
            .channels()
            .filter_map(|c| c.name.as_deref())
            .collect();
        assert_eq!(channels, vec!["Hits 1", "Venus"]);
    }

    #[test]
    fn test_totals() {
        let report = aggregate(&sample_events(), None);

        assert_eq!(report.total_artists, 3);
        assert_eq!(report.total_spins, 3 + 3 + 4);
        assert_eq!(report.total_royalties, 10 * ROYALTY_PER_PLAY);
        assert_eq!(report.artist("Adele").unwrap().count, 3);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let report = aggregate(&sample_events(), Some("lady"));
        assert!(report.artist("Lady Gaga").is_some());
        assert!(report.artist("Adele").is_none());
        assert_eq!(report.total_artists, 1);
        assert_eq!(report.total_spins, 3);
        assert_eq!(report.total_royalties, 60);

        let report = aggregate(&sample_events(), Some("GAGA"));
        assert_eq!(report.total_artists, 1);

        let report = aggregate(&sample_events(), Some("e"));
        let artists: Vec<_> = report.artists.iter().map(|a| a.artist.as_str()).collect();
        assert_eq!(artists, vec!["Adele", "Nate Bargatze"]);
    }

    #[test]
    fn test_blank_filter_keeps_everyone() {
        let all = aggregate(&sample_events(), None);
        assert_eq!(aggregate(&sample_events(), Some("")), all);
        assert_eq!(aggregate(&sample_events(), Some("   ")), all);
    }

    #[test]
    fn test_malformed_events_are_skipped_and_counted() {
        let events = vec![
            play("A", "T1", "C1"),
            PlayEvent {
                title: Some("No Artist".to_string()),
                ..Default::default()
            },
            PlayEvent {
                artist: Some("A".to_string()),
                ..Default::default()
            },
            PlayEvent::new("  ", "Blank Artist"),
            play("A", "T1", "C1").with_plays(-2),
            play("A", "T2", "C1"),
        ];

        let report = aggregate(&events, None);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.total_spins, 2);
        assert_eq!(report.artist("A").unwrap().tracks().count(), 2);
    }

    #[test]
    fn test_huge_play_counts_saturate() {
        let events = vec![
            PlayEvent::new("A", "T1").with_plays(i64::MAX),
            PlayEvent::new("A", "T1").with_plays(i64::MAX),
            PlayEvent::new("B", "T2").with_plays(i64::MAX),
            PlayEvent::new("C", "T3").with_plays(i64::MAX),
        ];

        let report = aggregate(&events, None);
        let a = report.artist("A").unwrap();
        assert_eq!(a.count, 2 * i64::MAX as u64);
        assert_eq!(a.track("T1").unwrap().count, 2 * i64::MAX as u64);
        assert_eq!(a.royalties, u64::MAX);

        let b = report.artist("B").unwrap();
        assert_eq!(b.count, i64::MAX as u64);
        assert_eq!(b.royalties, u64::MAX);

        assert_eq!(report.total_spins, u64::MAX);
        assert_eq!(report.total_royalties, u64::MAX);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_skip_reason_names_the_problem() {
        assert_eq!(SkipReason::MissingArtist.to_string(), "missing artist");
        assert_eq!(
            SkipReason::NegativePlays(-3).to_string(),
            "negative play count -3"
        );
    }

    #[test]
    fn test_empty_input() {
        let report = aggregate(&Vec::<PlayEvent>::new(), None);
        assert!(report.artists.is_empty());
        assert_eq!(report.total_artists, 0);
        assert_eq!(report.total_spins, 0);
        assert_eq!(report.total_royalties, 0);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_totals_are_order_independent() {
        let events = sample_events();
        let mut reversed = events.clone();
        reversed.reverse();

        let forward = aggregate(&events, None);
        let backward = aggregate(&reversed, None);
        for artist in &forward.artists {
            let other = backward.artist(&artist.artist).unwrap();
            assert_eq!(artist.count, other.count);
            assert_eq!(artist.royalties, other.royalties);
            for (title, track) in artist.tracks() {
                assert_eq!(track.count, other.track(title).unwrap().count);
            }
        }
        assert_eq!(forward.total_royalties, backward.total_royalties);
    }

    #[test]
    fn test_batches_merge_instead_of_overwrite() {
        let first = vec![
            play("A", "T1", "C1").with_timestamp("2024-01-01T10:00:00Z"),
            play("B", "T9", "C2"),
        ];
        let second = vec![
            play("A", "T1", "C1")
                .with_plays(4)
                .with_timestamp("2024-01-03T10:00:00Z"),
            play("A", "T1", "C3"),
        ];

        let combined: Vec<_> = first.iter().chain(second.iter()).cloned().collect();
        let report = aggregate(first.iter().chain(second.iter()), None);
        assert_eq!(report, aggregate(&combined, None));

        let a = report.artist("A").unwrap();
        assert_eq!(
            a.count,
            aggregate(&first, None).artist("A").unwrap().count
                + aggregate(&second, None).artist("A").unwrap().count
        );
        let track = a.track("T1").unwrap();
        assert_eq!(track.count, 6);
        assert_eq!(track.channels().count(), 2);
        assert_eq!(
            track.channel(Some("C1")).unwrap().last_played,
            Some(at("2024-01-03T10:00:00Z"))
        );
    }

    #[test]
    fn test_timestamp_formats() {
        let events = vec![
            play("A", "T1", "C1").with_timestamp("2024-01-01T10:00:00"),
            play("A", "T1", "C2").with_timestamp("not a date"),
            play("A", "T1", "C3").with_timestamp("2024-01-01T10:00:00.123456+02:00"),
        ];

        let report = aggregate(&events, None);
        let track = report.artist("A").unwrap().track("T1").unwrap();
        assert_eq!(track.count, 3);
        assert_eq!(
            track.channel(Some("C1")).unwrap().last_played,
            Some(at("2024-01-01T10:00:00Z"))
        );
        assert_eq!(track.channel(Some("C2")).unwrap().last_played, None);
        assert_eq!(
            track.channel(Some("C3")).unwrap().last_played,
            Some(at("2024-01-01T08:00:00.123456Z"))
        );
    }

    #[test]
    fn test_report_json_shape() {
        let events = vec![
            play("A", "T1", "C1")
                .with_plays(2)
                .with_timestamp("2024-01-01T10:00:00Z"),
            play("A", "T1", "C1")
                .with_plays(3)
                .with_timestamp("2024-01-01T12:00:00Z"),
        ];

        let json = serde_json::to_value(aggregate(&events, None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "artists": [{
                    "artist": "A",
                    "count": 5,
                    "royalties": 100,
                    "track_breakdown": {
                        "T1": {
                            "count": 5,
                            "channels": [
                                {"name": "C1", "last_played": "2024-01-01T12:00:00Z"}
                            ]
                        }
                    }
                }],
                "total_artists": 1,
                "total_spins": 5,
                "total_royalties": 100,
                "skipped": 0
            })
        );
    }
}
