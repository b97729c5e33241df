//! Mixdown Engine
//!
//! Offline, one-shot combination of decoded takes into a single buffer.
//! Decoding fans out to the platform decoder (one request per track, joined
//! before mixing). Mixing and serialization are synchronous and run on a
//! blocking worker.

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::engine::buffer::{calculate_peak, linear_to_db, DecodedBuffer, MixBuffer};
use crate::engine::tracks::Track;
use crate::engine::wav;
use crate::error::{MultitakeError, Result};
use crate::platform::{AudioDecoder, RawAudio};

/// Sum `(buffer, gain)` pairs into one buffer
///
/// The first track fixes the channel count and sample rate. The output is as
/// long as the longest track; shorter tracks contribute silence past their
/// end. Accumulation runs in track order and the result is not clamped.
///
/// # Errors
/// * `EmptyMix` - if `tracks` is empty
/// * `ChannelMismatch` - if any track's channel count differs from the first
/// * `InvalidBuffer` - if the first track has no channels
pub fn mixdown(tracks: &[(DecodedBuffer, f32)]) -> Result<MixBuffer> {
    let Some((first, _)) = tracks.first() else {
        return Err(MultitakeError::EmptyMix);
    };

    let channels = first.channels();
    if channels == 0 {
        return Err(MultitakeError::InvalidBuffer {
            reason: "first track has no channels".to_string(),
        });
    }

    for (index, (buffer, _)) in tracks.iter().enumerate().skip(1) {
        if buffer.channels() != channels {
            return Err(MultitakeError::ChannelMismatch {
                track: index,
                expected: channels,
                found: buffer.channels(),
            });
        }
        if buffer.sample_rate != first.sample_rate {
            // No resampling: the take plays at the mix rate.
            warn!(
                track = index,
                expected = first.sample_rate,
                found = buffer.sample_rate,
                "sample rate differs from first track"
            );
        }
    }

    let length = tracks.iter().map(|(b, _)| b.len()).max().unwrap_or(0);
    let mut mix = MixBuffer::new(channels, length, first.sample_rate);

    for (buffer, gain) in tracks {
        for (out, input) in mix.samples.iter_mut().zip(&buffer.samples) {
            for (acc, &sample) in out.iter_mut().zip(input) {
                *acc += sample * gain;
            }
        }
    }

    debug!(
        tracks = tracks.len(),
        channels,
        frames = length,
        peak_db = linear_to_db(calculate_peak(&mix)),
        "mixdown complete"
    );
    Ok(mix)
}

/// Decode every source concurrently, preserving order
///
/// Fails fast: the first decode error aborts the join and is returned as
/// `DecodeError` tagged with the source's position.
pub async fn decode_all(decoder: &dyn AudioDecoder, sources: &[RawAudio]) -> Result<Vec<DecodedBuffer>> {
    try_join_all(sources.iter().enumerate().map(|(index, raw)| async move {
        decoder
            .decode(raw)
            .await
            .map_err(|e| MultitakeError::decode(index, e))
    }))
    .await
}

/// Decode and mix a snapshot of tracks using their current gains
pub async fn mix_tracks(decoder: &dyn AudioDecoder, tracks: &[Track]) -> Result<MixBuffer> {
    let inputs = decode_inputs(decoder, tracks).await?;
    tokio::task::spawn_blocking(move || mixdown(&inputs)).await?
}

/// Decode, mix and serialize a snapshot of tracks to canonical WAV bytes
pub async fn render(decoder: &dyn AudioDecoder, tracks: &[Track]) -> Result<Vec<u8>> {
    let mix = mix_tracks(decoder, tracks).await?;
    let bytes = tokio::task::spawn_blocking(move || wav::serialize(&mix)).await??;

    info!(tracks = tracks.len(), bytes = bytes.len(), "mix rendered");
    Ok(bytes)
}

async fn decode_inputs(decoder: &dyn AudioDecoder, tracks: &[Track]) -> Result<Vec<(DecodedBuffer, f32)>> {
    if tracks.is_empty() {
        return Err(MultitakeError::EmptyMix);
    }

    let sources: Vec<RawAudio> = tracks.iter().map(|t| t.source().clone()).collect();
    let buffers = decode_all(decoder, &sources).await?;
    Ok(buffers
        .into_iter()
        .zip(tracks.iter().map(|t| t.gain()))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
