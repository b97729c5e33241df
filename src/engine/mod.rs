//! Audio Engine Module
//!
//! Session-side audio handling:
//! - Audio buffers and level helpers
//! - Track repository
//! - Mixdown and WAV serialization
//! - Synchronized playback
//! - Recording session state machine

pub mod buffer;
pub mod io;
pub mod mixdown;
pub mod playback;
pub mod session;
pub mod tracks;
pub mod wav;

pub use buffer::{AudioBuffer, DecodedBuffer, MixBuffer};
pub use io::{collect_takes, load_take, write_export, ExportSummary, WavDecoder};
pub use mixdown::{mixdown, render};
pub use playback::{PlaybackOutcome, PlaybackReport, PlaybackSynchronizer};
pub use session::{Session, SessionCommand, SessionState};
pub use tracks::{Track, TrackId, TrackRepository};
pub use wav::{inspect, serialize, WavInfo};
