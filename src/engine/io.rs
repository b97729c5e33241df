//! File-side audio I/O
//!
//! [`WavDecoder`] decodes WAV takes (int or float) into planar float
//! buffers at their native rate. The remaining helpers move takes in and
//! exported mixes out of the filesystem for the command line front end.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::engine::buffer::{AudioBuffer, DecodedBuffer};
use crate::engine::wav::{self, WavInfo};
use crate::error::{MultitakeError, Result};
use crate::platform::{AudioDecoder, RawAudio};

/// Decoder for takes stored as WAV
///
/// Accepts 8/16/24/32-bit integer and 32-bit float PCM with any channel
/// count. No resampling is done.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous decode, shared by the async trait impl
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedBuffer> {
        let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| MultitakeError::WavFormat {
            reason: format!("Failed to open WAV data: {}", e),
        })?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(MultitakeError::WavFormat {
                reason: "zero channels".to_string(),
            });
        }

        let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        let buffer = AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)?;
        debug!(
            channels,
            frames = buffer.len(),
            sample_rate = spec.sample_rate,
            "decoded wav take"
        );
        Ok(buffer)
    }
}

#[async_trait]
impl AudioDecoder for WavDecoder {
    async fn decode(&self, raw: &RawAudio) -> Result<DecodedBuffer> {
        self.decode_bytes(raw)
    }
}

/// Read a take from disk as opaque bytes
pub async fn load_take(path: &Path) -> Result<RawAudio> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MultitakeError::NotFound {
                id: path.display().to_string(),
            }
        } else {
            MultitakeError::Io(e)
        }
    })?;
    Ok(RawAudio::from(bytes))
}

/// Collect every `.wav` file under `dir`, sorted by path
pub fn collect_takes(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut takes = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            MultitakeError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        let is_wav = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_wav {
            takes.push(entry.into_path());
        }
    }
    takes.sort();
    Ok(takes)
}

/// What was written by [`write_export`]
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
    pub info: WavInfo,
}

/// Write serialized mix bytes to `path`
pub async fn write_export(path: &Path, bytes: &[u8]) -> Result<ExportSummary> {
    let info = wav::inspect(bytes)?;
    tokio::fs::write(path, bytes).await?;

    let summary = ExportSummary {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        sha256: sha256_hex(bytes),
        info,
    };
    info!(
        path = %summary.path.display(),
        bytes = summary.bytes,
        frames = info.frames,
        "mix exported"
    );
    Ok(summary)
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let failed = |e: hound::Error| MultitakeError::WavFormat {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(failed),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(failed),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(failed),
            // 24-bit stored as i32 in hound
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(failed),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(failed),
            _ => Err(MultitakeError::WavFormat {
                reason: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
