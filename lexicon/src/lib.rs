//! Wire records exchanged with the play-event provider.
//!
//! Every field is optional on the wire. Records that are missing required fields still
//! deserialize so the aggregation layer can count and skip them instead of failing the
//! whole batch.

pub mod play;

pub use play::{flatten_records, ArtistPlays, PlayEvent, PlayRecord, ProviderResponse, TrackPlay};
