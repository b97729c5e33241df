//! Platform collaborators
//!
//! The engine never touches audio hardware or codecs directly. Capture,
//! decoding and playback are reached through the traits below, bundled into
//! a [`Platform`] and injected when a session is built. Every call is a
//! single-outcome async operation with no timeout of its own; wrap calls in
//! `tokio::time::timeout` if bounded latency matters.

pub mod mock;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::engine::buffer::DecodedBuffer;
use crate::error::Result;

/// Opaque encoded audio as produced by a capture facility
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct RawAudio(Arc<[u8]>);

impl RawAudio {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawAudio {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for RawAudio {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl AsRef<[u8]> for RawAudio {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for RawAudio {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawAudio({} bytes)", self.0.len())
    }
}

/// Microphone capture producing one blob per take
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Begin capturing a take
    async fn start(&self) -> Result<()>;

    /// Finish the take and hand over its encoded bytes
    async fn stop(&self) -> Result<RawAudio>;

    /// Discard the take in progress
    async fn abort(&self) -> Result<()>;
}

/// Codec turning a captured blob into planar float PCM
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, raw: &RawAudio) -> Result<DecodedBuffer>;
}

/// Audio output able to prepare a take for playback
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Prepare `raw` for playback at linear `gain`; the handle starts idle
    async fn load(&self, raw: &RawAudio, gain: f32) -> Result<Arc<dyn PlaybackHandle>>;
}

/// How a playback handle finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Played through to the end at the given instant
    Finished(Instant),
    /// Halted by `stop()` (or never started) at the given instant
    Stopped(Instant),
}

/// One prepared playback voice
#[async_trait]
pub trait PlaybackHandle: Send + Sync {
    /// Nominal playback length
    fn duration(&self) -> Duration;

    /// Start output; resolves with the instant audio actually began
    async fn start(&self) -> Result<Instant>;

    /// Resolves once playback has ended, either naturally or via `stop()`
    async fn ended(&self) -> PlaybackEnd;

    /// Halt immediately. Must be idempotent and safe before `start()`.
    fn stop(&self);
}

/// The set of collaborators a session runs against
#[derive(Clone)]
pub struct Platform {
    pub capture: Arc<dyn CaptureDevice>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub playback: Arc<dyn PlaybackDevice>,
}

impl Platform {
    pub fn new(
        capture: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn AudioDecoder>,
        playback: Arc<dyn PlaybackDevice>,
    ) -> Self {
        Self {
            capture,
            decoder,
            playback,
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
