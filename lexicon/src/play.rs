use serde::{Deserialize, Serialize};

/// A single radio play (or a batch of identical plays) of a track on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    /// ISO-8601 instant of the play.
    pub timestamp: Option<String>,
    /// Number of plays this record stands for; absent means one.
    pub plays: Option<i64>,
}

impl PlayEvent {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: Some(artist.into()),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_plays(mut self, plays: i64) -> Self {
        self.plays = Some(plays);
        self
    }
}

/// A track entry nested inside an artist group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPlay {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub timestamp: Option<String>,
    pub plays: Option<i64>,
}

/// Artist-grouped shape emitted by the provider's grouping pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistPlays {
    pub artist: Option<String>,
    /// Provider-side play count. Informational only; plays are recounted from `tracks`.
    pub count: Option<i64>,
    pub tracks: Vec<TrackPlay>,
}

/// One element of the provider's `data` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayRecord {
    Grouped(ArtistPlays),
    Flat(PlayEvent),
}

/// Top-level provider envelope: `{"data": [...]}` on success, `{"error": "..."}` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub data: Option<Vec<PlayRecord>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProviderResponse {
    /// An `error` field wins over any `data`. A response with neither is an empty batch.
    pub fn into_result(self) -> Result<Vec<PlayRecord>, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or_default()),
        }
    }
}

/// Flatten grouped and flat records into one event per play record, in input order.
pub fn flatten_records(records: Vec<PlayRecord>) -> Vec<PlayEvent> {
    let mut events = Vec::with_capacity(records.len());
    for record in records {
        match record {
            PlayRecord::Flat(event) => events.push(event),
            PlayRecord::Grouped(group) => {
                for track in group.tracks {
                    events.push(PlayEvent {
                        artist: group.artist.clone(),
                        title: track.title,
                        channel: track.channel,
                        timestamp: track.timestamp,
                        plays: track.plays,
                    });
                }
            }
        }
    }
    events
}
