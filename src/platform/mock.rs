//! In-memory collaborator implementations
//!
//! These stand in for a microphone, codec and audio output so the session,
//! mixdown and synchronizer can run without hardware. Takes are encoded as
//! 32-bit float WAV so decoding is lossless.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{AudioDecoder, CaptureDevice, PlaybackDevice, PlaybackEnd, PlaybackHandle, RawAudio};
use crate::engine::buffer::{AudioBuffer, DecodedBuffer};
use crate::engine::io::WavDecoder;
use crate::error::{MultitakeError, Result};

/// Encode a buffer as a 32-bit float WAV blob
pub fn float_wav(buffer: &AudioBuffer) -> Result<RawAudio> {
    let spec = hound::WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for sample in buffer.to_interleaved() {
        writer.write_sample(sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    Ok(RawAudio::from(cursor.into_inner()))
}

fn wav_error(e: hound::Error) -> MultitakeError {
    MultitakeError::WavFormat {
        reason: format!("Failed to encode take: {}", e),
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Capture device that hands out pre-queued takes
#[derive(Default)]
pub struct MockCapture {
    takes: Mutex<VecDeque<RawAudio>>,
    fail_start: Mutex<bool>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    aborts: AtomicUsize,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes returned by the next `stop()`
    pub fn push_take(&self, take: RawAudio) {
        self.takes.lock().push_back(take);
    }

    /// Make subsequent `start()` calls fail
    pub fn set_fail_start(&self, fail: bool) {
        *self.fail_start.lock() = fail;
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for MockCapture {
    async fn start(&self) -> Result<()> {
        if *self.fail_start.lock() {
            return Err(MultitakeError::Capture {
                reason: "microphone unavailable".to_string(),
            });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<RawAudio> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.takes
            .lock()
            .pop_front()
            .ok_or_else(|| MultitakeError::Capture {
                reason: "no take queued".to_string(),
            })
    }

    async fn abort(&self) -> Result<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// WAV decoder with artificial latency and call counting
#[derive(Default)]
pub struct MockDecoder {
    latency: Duration,
    calls: AtomicUsize,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDecoder for MockDecoder {
    async fn decode(&self, raw: &RawAudio) -> Result<DecodedBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        WavDecoder::new().decode_bytes(raw)
    }
}

// ============================================================================
// Playback
// ============================================================================

/// Playback device producing timer-driven handles
///
/// Handle duration is the decoded take length; `lag` is added to every
/// handle's real end time to simulate drift.
#[derive(Default)]
pub struct MockPlayback {
    lag: Duration,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lag(lag: Duration) -> Self {
        Self {
            lag,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Every handle loaded so far, in load order
    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().clone()
    }
}

#[async_trait]
impl PlaybackDevice for MockPlayback {
    async fn load(&self, raw: &RawAudio, gain: f32) -> Result<Arc<dyn PlaybackHandle>> {
        let buffer = WavDecoder::new()
            .decode_bytes(raw)
            .map_err(|e| MultitakeError::Playback {
                reason: e.to_string(),
            })?;
        let handle = Arc::new(MockHandle::new(
            Duration::from_secs_f64(buffer.duration_secs()),
            gain,
            self.lag,
        ));
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

/// A playback voice that "plays" by sleeping for its duration
pub struct MockHandle {
    duration: Duration,
    gain: f32,
    lag: Duration,
    start_delay: Duration,
    started_at: Mutex<Option<Instant>>,
    stopped: watch::Sender<bool>,
}

impl MockHandle {
    pub fn new(duration: Duration, gain: f32, lag: Duration) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            duration,
            gain,
            lag,
            start_delay: Duration::ZERO,
            started_at: Mutex::new(None),
            stopped,
        }
    }

    /// Make `start()` take this long to open the output
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn started_at(&self) -> Option<Instant> {
        *self.started_at.lock()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

#[async_trait]
impl PlaybackHandle for MockHandle {
    fn duration(&self) -> Duration {
        self.duration
    }

    async fn start(&self) -> Result<Instant> {
        if self.is_stopped() {
            return Err(MultitakeError::Playback {
                reason: "handle already stopped".to_string(),
            });
        }
        if !self.start_delay.is_zero() {
            let mut stopped = self.stopped.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(self.start_delay) => {}
                _ = stopped.wait_for(|s| *s) => {
                    return Err(MultitakeError::Playback {
                        reason: "stopped before output opened".to_string(),
                    });
                }
            }
        }
        let now = Instant::now();
        *self.started_at.lock() = Some(now);
        Ok(now)
    }

    async fn ended(&self) -> PlaybackEnd {
        let mut stopped = self.stopped.subscribe();
        if *stopped.borrow() {
            return PlaybackEnd::Stopped(Instant::now());
        }

        let Some(started) = self.started_at() else {
            let _ = stopped.wait_for(|s| *s).await;
            return PlaybackEnd::Stopped(Instant::now());
        };

        let deadline = tokio::time::Instant::from_std(started + self.duration + self.lag);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => PlaybackEnd::Finished(Instant::now()),
            _ = stopped.wait_for(|s| *s) => PlaybackEnd::Stopped(Instant::now()),
        }
    }

    fn stop(&self) {
        self.stopped.send_replace(true);
    }
}
