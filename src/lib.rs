//! Multitake - Multi-Take Audio Session Engine
//!
//! Multitake records successive takes from a capture device, plays them
//! back together in sync, and renders a single 16-bit PCM WAV mixdown.
//!
//! # Architecture
//!
//! - `engine::session`: the Idle / Recording / Stopped state machine driving
//!   capture and owning the track list
//! - `engine::tracks`: ordered takes with per-track gain
//! - `engine::mixdown` + `engine::wav`: gain-weighted sum and canonical WAV
//!   encoding
//! - `engine::playback`: start-together playback with drift reporting
//! - `platform`: capture, decode and playback collaborators injected as
//!   trait objects

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform;

pub use config::SessionConfig;
pub use error::{MultitakeError, Result};
