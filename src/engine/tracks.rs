//! Track Repository
//!
//! Ordered collection of recorded takes. Tracks are immutable once appended
//! except for their gain, and iteration always yields append order.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{MultitakeError, Result};
use crate::platform::RawAudio;

/// Lowest allowed track gain (silence)
pub const MIN_GAIN: f32 = 0.0;

/// Highest allowed track gain (unity)
pub const MAX_GAIN: f32 = 1.0;

/// Clamp a requested gain into [MIN_GAIN, MAX_GAIN]
///
/// NaN maps to silence rather than propagating into the mix.
#[inline]
pub fn clamp_gain(value: f32) -> f32 {
    if value.is_nan() {
        MIN_GAIN
    } else {
        value.clamp(MIN_GAIN, MAX_GAIN)
    }
}

/// Opaque track handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(Uuid);

impl TrackId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded take
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    id: TrackId,
    #[serde(skip)]
    source: RawAudio,
    gain: f32,
    order: u64,
    recorded_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    take_duration: Duration,
}

impl Track {
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// The raw bytes handed over by the capture facility
    pub fn source(&self) -> &RawAudio {
        &self.source
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Position assigned at append time; unique and increasing
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// How long the take was recording for
    pub fn take_duration(&self) -> Duration {
        self.take_duration
    }
}

/// Ordered, append-only (plus removal) store of tracks
///
/// Not designed for concurrent writers: the owning session mutates it from a
/// single control thread. Clone a snapshot with [`TrackRepository::list`] to
/// hand tracks to other tasks.
#[derive(Debug, Default)]
pub struct TrackRepository {
    tracks: Vec<Track>,
    next_order: u64,
}

impl TrackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a take with unity gain and return its id
    pub fn append(&mut self, source: RawAudio) -> TrackId {
        self.append_take(source, Duration::ZERO)
    }

    /// Append a take, recording how long it was captured for
    pub fn append_take(&mut self, source: RawAudio, take_duration: Duration) -> TrackId {
        let track = Track {
            id: TrackId::new(),
            source,
            gain: MAX_GAIN,
            order: self.next_order,
            recorded_at: Utc::now(),
            take_duration,
        };
        // Orders are never reused, even after removals or a clear.
        self.next_order += 1;

        let id = track.id;
        debug!(track = %id, order = track.order, bytes = track.source.len(), "track appended");
        self.tracks.push(track);
        id
    }

    /// Remove a track
    ///
    /// # Errors
    /// * `NotFound` - if no track has this id
    pub fn remove(&mut self, id: TrackId) -> Result<Track> {
        let index = self.index_of(id)?;
        let track = self.tracks.remove(index);
        debug!(track = %id, "track removed");
        Ok(track)
    }

    /// Set a track's gain, clamped to [0.0, 1.0]; returns the stored value
    ///
    /// # Errors
    /// * `NotFound` - if no track has this id
    pub fn set_gain(&mut self, id: TrackId, value: f32) -> Result<f32> {
        let index = self.index_of(id)?;
        let gain = clamp_gain(value);
        self.tracks[index].gain = gain;
        debug!(track = %id, requested = value, gain, "gain changed");
        Ok(gain)
    }

    /// Look up a track by id
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Snapshot of all tracks in append order
    pub fn list(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    /// Borrowing iterator in append order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Most recently appended track still present
    pub fn last(&self) -> Option<&Track> {
        self.tracks.last()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop every track
    pub fn clear(&mut self) {
        debug!(count = self.tracks.len(), "repository cleared");
        self.tracks.clear();
    }

    fn index_of(&self, id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| MultitakeError::NotFound { id: id.to_string() })
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
