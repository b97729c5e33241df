//! Canonical PCM WAV serialization
//!
//! Produces the classic 44-byte-header, 16-bit little-endian PCM layout:
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  file size - 8
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  16 (fmt chunk size)
//!     20     2  1 (PCM)
//!     22     2  channel count
//!     24     4  sample rate
//!     28     4  byte rate = sample rate * channels * 2
//!     32     2  block align = channels * 2
//!     34     2  16 (bits per sample)
//!     36     4  "data"
//!     40     4  frames * channels * 2
//!     44     .  interleaved samples
//! ```
//!
//! No I/O happens here; callers decide where the bytes go.

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::buffer::{count_clipped, MixBuffer};
use crate::error::{MultitakeError, Result};

/// Size of the canonical header in bytes
pub const HEADER_LEN: usize = 44;

/// Output sample width
pub const BITS_PER_SAMPLE: u16 = 16;

const BYTES_PER_SAMPLE: usize = (BITS_PER_SAMPLE / 8) as usize;
const PCM_FORMAT: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Quantize one float sample to 16-bit PCM
///
/// The sample is clamped to [-1.0, 1.0], then negative values scale by
/// 32768 and non-negative values by 32767. The product is truncated toward
/// zero. NaN encodes as 0.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a mix buffer as a canonical 16-bit PCM WAV file
///
/// # Errors
/// * `EmptyBuffer` - if the buffer has no frames
/// * `InvalidBuffer` - if the channel count or data size does not fit the
///   header fields
pub fn serialize(buffer: &MixBuffer) -> Result<Vec<u8>> {
    if buffer.is_empty() {
        return Err(MultitakeError::EmptyBuffer);
    }

    let channels = u16::try_from(buffer.channels()).map_err(|_| MultitakeError::InvalidBuffer {
        reason: format!("{} channels exceed the WAV channel field", buffer.channels()),
    })?;
    let frames = buffer.len();

    let data_len = frames
        .checked_mul(buffer.channels() * BYTES_PER_SAMPLE)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| n.checked_add(HEADER_LEN as u32 - 8).is_some())
        .ok_or_else(|| MultitakeError::InvalidBuffer {
            reason: format!("{} frames exceed the 4 GiB WAV size limit", frames),
        })?;
    let block_align = channels
        .checked_mul(BYTES_PER_SAMPLE as u16)
        .ok_or_else(|| MultitakeError::InvalidBuffer {
            reason: format!("{} channels overflow the block align field", channels),
        })?;
    let byte_rate = buffer
        .sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| MultitakeError::InvalidBuffer {
            reason: format!("sample rate {} overflows the byte rate field", buffer.sample_rate),
        })?;

    let clipped = count_clipped(buffer);
    if clipped > 0 {
        warn!(clipped, "mix exceeds full scale, samples will clip");
    }

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(data_len + HEADER_LEN as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        for channel in &buffer.samples {
            out.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
        }
    }

    debug!(
        channels,
        frames,
        sample_rate = buffer.sample_rate,
        bytes = out.len(),
        "wav serialized"
    );
    Ok(out)
}

/// Header fields of a canonical WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub frames: u32,
}

impl WavInfo {
    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Parse and validate the header of a file produced by [`serialize`]
///
/// Only the canonical layout is accepted: a 16-byte PCM `fmt ` chunk directly
/// followed by `data`, 16 bits per sample, sizes consistent with the length.
///
/// # Errors
/// * `WavFormat` - describing the first field that does not match
pub fn inspect(bytes: &[u8]) -> Result<WavInfo> {
    if bytes.len() < HEADER_LEN {
        return Err(format_error(format!(
            "{} bytes is shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    expect_tag(bytes, 0, b"RIFF")?;
    expect_tag(bytes, 8, b"WAVE")?;
    expect_tag(bytes, 12, b"fmt ")?;
    expect_tag(bytes, 36, b"data")?;

    let riff_len = read_u32(bytes, 4);
    if riff_len as usize != bytes.len() - 8 {
        return Err(format_error(format!(
            "RIFF size {} does not match file length {}",
            riff_len,
            bytes.len()
        )));
    }
    if read_u32(bytes, 16) != FMT_CHUNK_LEN {
        return Err(format_error("fmt chunk is not 16 bytes".to_string()));
    }
    if read_u16(bytes, 20) != PCM_FORMAT {
        return Err(format_error("audio format is not PCM".to_string()));
    }

    let channels = read_u16(bytes, 22);
    let sample_rate = read_u32(bytes, 24);
    let byte_rate = read_u32(bytes, 28);
    let block_align = read_u16(bytes, 32);
    let bits_per_sample = read_u16(bytes, 34);
    let data_len = read_u32(bytes, 40);

    if channels == 0 {
        return Err(format_error("channel count is zero".to_string()));
    }
    if bits_per_sample != BITS_PER_SAMPLE {
        return Err(format_error(format!(
            "{}-bit samples (only 16-bit supported)",
            bits_per_sample
        )));
    }
    if u32::from(block_align) != u32::from(channels) * BYTES_PER_SAMPLE as u32 {
        return Err(format_error(format!("block align {} is inconsistent", block_align)));
    }
    if u64::from(byte_rate) != u64::from(sample_rate) * u64::from(block_align) {
        return Err(format_error(format!("byte rate {} is inconsistent", byte_rate)));
    }
    if data_len as usize != bytes.len() - HEADER_LEN || data_len % u32::from(block_align) != 0 {
        return Err(format_error(format!(
            "data size {} does not match payload",
            data_len
        )));
    }

    Ok(WavInfo {
        channels,
        sample_rate,
        byte_rate,
        block_align,
        bits_per_sample,
        frames: data_len / u32::from(block_align),
    })
}

fn format_error(reason: String) -> MultitakeError {
    MultitakeError::WavFormat { reason }
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &[u8; 4]) -> Result<()> {
    if &bytes[offset..offset + 4] != tag {
        return Err(format_error(format!(
            "expected {:?} at offset {}",
            String::from_utf8_lossy(tag),
            offset
        )));
    }
    Ok(())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// ============================================================================
// Tests
// ============================================================================
